//! Access to procfs and cgroup control files
//!
//! Every read the resolver and sampler make goes through [`ControlFs`] so
//! they can be exercised against an in-memory tree in tests.

use std::path::Path;

use shedder_core::{ShedError, ShedResult};

/// Read-only view of the control filesystems
pub trait ControlFs: Send + Sync {
    /// Read a whole file as UTF-8
    fn read_to_string(&self, path: &Path) -> ShedResult<String>;

    /// True if `path` exists and is a directory
    fn is_dir(&self, path: &Path) -> bool;

    /// True if `path` exists
    fn exists(&self, path: &Path) -> bool;

    /// Read a file and return its content with surrounding whitespace removed
    fn read_trimmed(&self, path: &Path) -> ShedResult<String> {
        Ok(self.read_to_string(path)?.trim().to_string())
    }
}

/// The real filesystem
#[derive(Debug, Default, Clone, Copy)]
pub struct HostFs;

impl ControlFs for HostFs {
    fn read_to_string(&self, path: &Path) -> ShedResult<String> {
        std::fs::read_to_string(path).map_err(|e| ShedError::io(path, &e))
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

impl<F: ControlFs + ?Sized> ControlFs for &F {
    fn read_to_string(&self, path: &Path) -> ShedResult<String> {
        (**self).read_to_string(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        (**self).is_dir(path)
    }

    fn exists(&self, path: &Path) -> bool {
        (**self).exists(path)
    }
}

impl<F: ControlFs + ?Sized> ControlFs for std::sync::Arc<F> {
    fn read_to_string(&self, path: &Path) -> ShedResult<String> {
        (**self).read_to_string(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        (**self).is_dir(path)
    }

    fn exists(&self, path: &Path) -> bool {
        (**self).exists(path)
    }
}
