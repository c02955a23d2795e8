//! Exit codes
//!
//! One code per failure class.

/// The configuration block or settings are invalid
pub const VALIDATION_ERROR: i32 = 2;

/// `kustomize build` failed or produced unusable output
pub const BUILD_ERROR: i32 = 3;

/// The Kubernetes API rejected or could not serve a request
pub const CLUSTER_ERROR: i32 = 4;

/// File not found, permission denied, etc.
pub const IO_ERROR: i32 = 5;

/// Managed state could not be read or written
pub const STATE_ERROR: i32 = 6;
