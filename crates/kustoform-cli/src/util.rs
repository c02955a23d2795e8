//! Shared helpers for CLI commands

/// Leading characters of a manifest id, for display
#[must_use]
pub fn short_id(id: &str, width: usize) -> &str {
    id.get(..width).unwrap_or(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_id() {
        let id = "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08";
        assert_eq!(short_id(id, 12), "9f86d081884c");
        assert_eq!(short_id("abc", 12), "abc");
        assert_eq!(short_id("", 12), "");
    }
}
