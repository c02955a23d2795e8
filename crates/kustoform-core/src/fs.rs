//! Filesystem abstraction used while building
//!
//! - `DiskFs`: the real disk
//! - `MemoryFs`: in-memory files, used for the generated descriptor and in tests
//! - `OverlayFs`: serves `<workdir>/kustomization.yaml` from memory and
//!   delegates every other path to the disk

use std::collections::{BTreeSet, HashMap};
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::error::{CoreError, Result};

/// Name of the descriptor file served from memory by `OverlayFs`
pub const KUSTOMIZATION: &str = "kustomization.yaml";

/// Filesystem operations needed to stage and run a build
pub trait FileSystem: Send + Sync {
    /// Read the contents of a file
    fn read_file(&self, path: &Path) -> Result<Vec<u8>>;

    /// Create or replace a file
    fn write_file(&self, path: &Path, content: &[u8]) -> Result<()>;

    /// Check if a file or directory exists
    fn exists(&self, path: &Path) -> bool;

    /// Check if a path is a directory
    fn is_dir(&self, path: &Path) -> bool;

    /// List the entry names of a directory, sorted
    fn read_dir(&self, path: &Path) -> Result<Vec<String>>;

    /// List the paths matching a glob pattern, sorted
    fn glob(&self, pattern: &str) -> Result<Vec<PathBuf>>;

    fn create_dir_all(&self, path: &Path) -> Result<()>;

    fn remove_all(&self, path: &Path) -> Result<()>;

    /// Split a path into its absolute, cleaned directory and file name.
    ///
    /// A directory yields an empty file name.
    fn clean_abs(&self, path: &Path) -> Result<(PathBuf, String)>;

    /// Read a file as UTF-8
    fn read_string(&self, path: &Path) -> Result<String> {
        let bytes = self.read_file(path)?;
        String::from_utf8(bytes).map_err(|e| CoreError::FileAccess {
            path: path.display().to_string(),
            message: format!("file is not valid UTF-8: {}", e),
        })
    }
}

/// Lexically clean `path`, resolving it against `base` when relative.
///
/// `.` and `..` components are folded without touching the disk; `..` never
/// climbs above the root.
pub fn clean_path(base: &Path, path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };

    let mut cleaned = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::Prefix(p) => cleaned.push(p.as_os_str()),
            Component::RootDir => cleaned.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if cleaned.file_name().is_some() {
                    cleaned.pop();
                }
            }
            Component::Normal(name) => cleaned.push(name),
        }
    }
    cleaned
}

fn split_file(path: &Path) -> (PathBuf, String) {
    let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let file = path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    (dir, file)
}

fn access_error(path: &Path, e: std::io::Error) -> CoreError {
    if e.kind() == std::io::ErrorKind::NotFound {
        CoreError::NotFound {
            path: path.display().to_string(),
        }
    } else {
        CoreError::FileAccess {
            path: path.display().to_string(),
            message: e.to_string(),
        }
    }
}

/// The real disk
#[derive(Debug, Clone, Copy, Default)]
pub struct DiskFs;

impl DiskFs {
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for DiskFs {
    fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        std::fs::read(path).map_err(|e| access_error(path, e))
    }

    fn write_file(&self, path: &Path, content: &[u8]) -> Result<()> {
        std::fs::write(path, content).map_err(|e| access_error(path, e))
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(path).map_err(|e| access_error(path, e))? {
            let entry = entry.map_err(|e| access_error(path, e))?;
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        names.sort();
        Ok(names)
    }

    fn glob(&self, pattern: &str) -> Result<Vec<PathBuf>> {
        let paths = glob::glob(pattern).map_err(|e| CoreError::GlobPattern {
            message: format!("invalid glob pattern '{}': {}", pattern, e),
        })?;

        let mut matches: Vec<PathBuf> = paths.filter_map(|p| p.ok()).collect();
        matches.sort();
        Ok(matches)
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        std::fs::create_dir_all(path).map_err(|e| access_error(path, e))
    }

    fn remove_all(&self, path: &Path) -> Result<()> {
        let result = if path.is_dir() {
            std::fs::remove_dir_all(path)
        } else {
            std::fs::remove_file(path)
        };

        match result {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(access_error(path, e)),
        }
    }

    fn clean_abs(&self, path: &Path) -> Result<(PathBuf, String)> {
        let absolute = path.canonicalize().map_err(|e| access_error(path, e))?;
        if absolute.is_dir() {
            Ok((absolute, String::new()))
        } else {
            Ok(split_file(&absolute))
        }
    }
}

/// In-memory filesystem rooted at `/`
///
/// Relative paths are resolved against the root. Clones share their contents.
#[derive(Debug, Clone, Default)]
pub struct MemoryFs {
    files: Arc<RwLock<HashMap<PathBuf, Vec<u8>>>>,
    dirs: Arc<RwLock<BTreeSet<PathBuf>>>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a text file
    pub fn with_text_file(self, path: &str, content: &str) -> Self {
        let path = self.key(Path::new(path));
        if let Ok(mut files) = self.files.write() {
            files.insert(path, content.as_bytes().to_vec());
        }
        self
    }

    fn key(&self, path: &Path) -> PathBuf {
        clean_path(Path::new("/"), path)
    }

    fn lock_error(path: &Path) -> CoreError {
        CoreError::FileAccess {
            path: path.display().to_string(),
            message: "memory filesystem lock poisoned".to_string(),
        }
    }

    fn has_children(&self, dir: &Path) -> bool {
        let Ok(files) = self.files.read() else {
            return false;
        };
        files.keys().any(|p| p != dir && p.starts_with(dir))
    }
}

impl FileSystem for MemoryFs {
    fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        let key = self.key(path);
        let files = self.files.read().map_err(|_| Self::lock_error(path))?;
        files.get(&key).cloned().ok_or_else(|| CoreError::NotFound {
            path: path.display().to_string(),
        })
    }

    fn write_file(&self, path: &Path, content: &[u8]) -> Result<()> {
        let key = self.key(path);
        let mut files = self.files.write().map_err(|_| Self::lock_error(path))?;
        files.insert(key, content.to_vec());
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        let key = self.key(path);
        let in_files = self
            .files
            .read()
            .map(|files| files.contains_key(&key))
            .unwrap_or(false);
        in_files || self.is_dir(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        let key = self.key(path);
        if key == Path::new("/") {
            return true;
        }
        let explicit = self
            .dirs
            .read()
            .map(|dirs| dirs.contains(&key))
            .unwrap_or(false);
        explicit || self.has_children(&key)
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<String>> {
        let key = self.key(path);
        if !self.is_dir(&key) {
            return Err(CoreError::NotFound {
                path: path.display().to_string(),
            });
        }

        let files = self.files.read().map_err(|_| Self::lock_error(path))?;
        let dirs = self.dirs.read().map_err(|_| Self::lock_error(path))?;

        let names: BTreeSet<String> = files
            .keys()
            .chain(dirs.iter())
            .filter_map(|p| p.strip_prefix(&key).ok())
            .filter_map(|rest| rest.components().next())
            .map(|c| c.as_os_str().to_string_lossy().to_string())
            .collect();

        Ok(names.into_iter().collect())
    }

    fn glob(&self, pattern: &str) -> Result<Vec<PathBuf>> {
        let full = self.key(Path::new(pattern));
        let glob_pattern =
            glob::Pattern::new(&full.to_string_lossy()).map_err(|e| CoreError::GlobPattern {
                message: format!("invalid glob pattern '{}': {}", pattern, e),
            })?;

        let files = self.files.read().map_err(|_| CoreError::GlobPattern {
            message: "memory filesystem lock poisoned".to_string(),
        })?;

        let mut matches: Vec<PathBuf> = files
            .keys()
            .filter(|p| glob_pattern.matches_path(p))
            .cloned()
            .collect();
        matches.sort();
        Ok(matches)
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        let key = self.key(path);
        let mut dirs = self.dirs.write().map_err(|_| Self::lock_error(path))?;
        for ancestor in key.ancestors() {
            if ancestor != Path::new("/") {
                dirs.insert(ancestor.to_path_buf());
            }
        }
        Ok(())
    }

    fn remove_all(&self, path: &Path) -> Result<()> {
        let key = self.key(path);
        self.files
            .write()
            .map_err(|_| Self::lock_error(path))?
            .retain(|p, _| !p.starts_with(&key));
        self.dirs
            .write()
            .map_err(|_| Self::lock_error(path))?
            .retain(|p| !p.starts_with(&key));
        Ok(())
    }

    fn clean_abs(&self, path: &Path) -> Result<(PathBuf, String)> {
        let key = self.key(path);
        if self.is_dir(&key) {
            return Ok((key, String::new()));
        }
        if !self.exists(&key) {
            return Err(CoreError::NotFound {
                path: path.display().to_string(),
            });
        }
        Ok(split_file(&key))
    }
}

/// Disk filesystem with one synthetic file held in memory
///
/// `<workdir>/kustomization.yaml` is read from and written to memory, even
/// when a file of that name exists on disk. All other paths go to the disk,
/// relative ones resolved against the working directory.
#[derive(Debug, Clone)]
pub struct OverlayFs {
    memory: MemoryFs,
    disk: DiskFs,
    workdir: PathBuf,
    kustomization_path: PathBuf,
}

impl OverlayFs {
    /// Overlay on top of the process working directory
    pub fn new() -> Result<Self> {
        let cwd = std::env::current_dir()?;
        Self::with_workdir(cwd)
    }

    /// Overlay on top of `workdir`
    pub fn with_workdir(workdir: impl AsRef<Path>) -> Result<Self> {
        let workdir = workdir.as_ref();
        let workdir = workdir
            .canonicalize()
            .map_err(|e| CoreError::FileAccess {
                path: workdir.display().to_string(),
                message: format!("failed to resolve working directory: {}", e),
            })?;

        Ok(Self {
            memory: MemoryFs::new(),
            disk: DiskFs::new(),
            kustomization_path: workdir.join(KUSTOMIZATION),
            workdir,
        })
    }

    /// The directory relative paths are resolved against
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Absolute path of the synthetic descriptor
    pub fn kustomization_path(&self) -> &Path {
        &self.kustomization_path
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        clean_path(&self.workdir, path)
    }

    fn is_synthetic(&self, path: &Path) -> bool {
        self.resolve(path) == self.kustomization_path
    }
}

impl FileSystem for OverlayFs {
    fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        if self.is_synthetic(path) {
            return self.memory.read_file(&self.kustomization_path);
        }
        self.disk.read_file(&self.resolve(path))
    }

    fn write_file(&self, path: &Path, content: &[u8]) -> Result<()> {
        if self.is_synthetic(path) {
            return self.memory.write_file(&self.kustomization_path, content);
        }
        self.disk.write_file(&self.resolve(path), content)
    }

    fn exists(&self, path: &Path) -> bool {
        if self.is_synthetic(path) {
            return self.memory.exists(&self.kustomization_path);
        }
        self.disk.exists(&self.resolve(path))
    }

    fn is_dir(&self, path: &Path) -> bool {
        if self.is_synthetic(path) {
            return false;
        }
        self.disk.is_dir(&self.resolve(path))
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<String>> {
        let dir = self.resolve(path);
        let mut names = self.disk.read_dir(&dir)?;
        if dir == self.workdir
            && self.memory.exists(&self.kustomization_path)
            && !names.iter().any(|n| n == KUSTOMIZATION)
        {
            names.push(KUSTOMIZATION.to_string());
            names.sort();
        }
        Ok(names)
    }

    fn glob(&self, pattern: &str) -> Result<Vec<PathBuf>> {
        let full = self.resolve(Path::new(pattern));
        let mut matches = self.disk.glob(&full.to_string_lossy())?;

        let glob_pattern =
            glob::Pattern::new(&full.to_string_lossy()).map_err(|e| CoreError::GlobPattern {
                message: format!("invalid glob pattern '{}': {}", pattern, e),
            })?;
        if glob_pattern.matches_path(&self.kustomization_path)
            && self.memory.exists(&self.kustomization_path)
            && !matches.contains(&self.kustomization_path)
        {
            matches.push(self.kustomization_path.clone());
            matches.sort();
        }
        Ok(matches)
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        self.disk.create_dir_all(&self.resolve(path))
    }

    fn remove_all(&self, path: &Path) -> Result<()> {
        if self.is_synthetic(path) {
            return self.memory.remove_all(&self.kustomization_path);
        }
        self.disk.remove_all(&self.resolve(path))
    }

    fn clean_abs(&self, path: &Path) -> Result<(PathBuf, String)> {
        if self.is_synthetic(path) {
            return Ok((self.workdir.clone(), KUSTOMIZATION.to_string()));
        }
        self.disk.clean_abs(&self.resolve(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn workdir() -> (TempDir, OverlayFs) {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("base")).unwrap();
        std::fs::write(temp.path().join("base/deployment.yaml"), "kind: Deployment\n").unwrap();
        let fs = OverlayFs::with_workdir(temp.path()).unwrap();
        (temp, fs)
    }

    #[test]
    fn test_clean_path() {
        assert_eq!(
            clean_path(Path::new("/work"), Path::new("./a/../b/c.yaml")),
            PathBuf::from("/work/b/c.yaml")
        );
        assert_eq!(
            clean_path(Path::new("/work"), Path::new("/etc/../../x")),
            PathBuf::from("/x")
        );
    }

    #[test]
    fn test_overlay_write_bare_name_goes_to_memory() {
        let (temp, fs) = workdir();

        fs.write_file(Path::new(KUSTOMIZATION), b"resources: []\n")
            .unwrap();

        assert!(!temp.path().join(KUSTOMIZATION).exists());
        assert!(fs.exists(Path::new(KUSTOMIZATION)));
        assert_eq!(
            fs.read_string(fs.kustomization_path()).unwrap(),
            "resources: []\n"
        );
    }

    #[test]
    fn test_overlay_shadows_disk_descriptor() {
        let (temp, fs) = workdir();
        std::fs::write(temp.path().join(KUSTOMIZATION), "from: disk\n").unwrap();

        assert!(!fs.exists(Path::new(KUSTOMIZATION)));
        assert!(fs.read_file(Path::new("./kustomization.yaml")).is_err());

        fs.write_file(fs.kustomization_path(), b"from: memory\n")
            .unwrap();
        assert_eq!(
            fs.read_string(Path::new(KUSTOMIZATION)).unwrap(),
            "from: memory\n"
        );
        assert_eq!(
            std::fs::read_to_string(temp.path().join(KUSTOMIZATION)).unwrap(),
            "from: disk\n"
        );
    }

    #[test]
    fn test_overlay_delegates_other_paths_to_disk() {
        let (temp, fs) = workdir();

        assert!(fs.is_dir(Path::new("base")));
        assert_eq!(
            fs.read_string(Path::new("base/deployment.yaml")).unwrap(),
            "kind: Deployment\n"
        );

        fs.write_file(Path::new("base/service.yaml"), b"kind: Service\n")
            .unwrap();
        assert!(temp.path().join("base/service.yaml").exists());
        assert!(!fs.exists(Path::new("base/missing.yaml")));
    }

    #[test]
    fn test_overlay_nested_descriptor_is_not_synthetic() {
        let (_temp, fs) = workdir();
        fs.write_file(Path::new("base/kustomization.yaml"), b"resources: []\n")
            .unwrap();

        assert!(!fs.exists(Path::new(KUSTOMIZATION)));
        assert!(fs.exists(Path::new("base/kustomization.yaml")));
    }

    #[test]
    fn test_overlay_clean_abs() {
        let (_temp, fs) = workdir();

        let (dir, file) = fs.clean_abs(Path::new(KUSTOMIZATION)).unwrap();
        assert_eq!(dir, fs.workdir());
        assert_eq!(file, KUSTOMIZATION);

        let (dir, file) = fs.clean_abs(Path::new("base")).unwrap();
        assert_eq!(dir, fs.workdir().join("base"));
        assert!(file.is_empty());

        let (dir, file) = fs.clean_abs(Path::new("base/deployment.yaml")).unwrap();
        assert_eq!(dir, fs.workdir().join("base"));
        assert_eq!(file, "deployment.yaml");
    }

    #[test]
    fn test_overlay_read_dir_and_glob_include_descriptor() {
        let (_temp, fs) = workdir();
        fs.write_file(Path::new(KUSTOMIZATION), b"{}\n").unwrap();

        assert_eq!(
            fs.read_dir(Path::new(".")).unwrap(),
            vec!["base".to_string(), KUSTOMIZATION.to_string()]
        );

        let matches = fs.glob("*.yaml").unwrap();
        assert_eq!(matches, vec![fs.kustomization_path().to_path_buf()]);

        fs.remove_all(Path::new(KUSTOMIZATION)).unwrap();
        assert!(!fs.exists(Path::new(KUSTOMIZATION)));
    }

    #[test]
    fn test_memory_fs() {
        let fs = MemoryFs::new()
            .with_text_file("app/deployment.yaml", "kind: Deployment")
            .with_text_file("app/service.yaml", "kind: Service");

        assert!(fs.is_dir(Path::new("/app")));
        assert!(fs.exists(Path::new("app/service.yaml")));
        assert_eq!(
            fs.read_dir(Path::new("app")).unwrap(),
            vec!["deployment.yaml", "service.yaml"]
        );
        assert_eq!(fs.glob("app/d*.yaml").unwrap().len(), 1);

        fs.create_dir_all(Path::new("empty/nested")).unwrap();
        assert!(fs.is_dir(Path::new("empty")));

        fs.remove_all(Path::new("app")).unwrap();
        assert!(!fs.exists(Path::new("app/service.yaml")));
        assert!(matches!(
            fs.read_file(Path::new("app/service.yaml")),
            Err(CoreError::NotFound { .. })
        ));
    }
}
