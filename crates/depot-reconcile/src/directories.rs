use std::path::{Path, PathBuf};

/// Resolves logical work directories to physical paths.
pub trait ApplicationDirectories: Send + Sync {
    /// Physical location of the work directory `name`. Does not create it.
    fn work_directory(&self, name: &Path) -> PathBuf;
}

/// Work directories laid out under one base directory.
#[derive(Clone, Debug)]
pub struct FixedApplicationDirectories {
    base: PathBuf,
}

impl FixedApplicationDirectories {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }
}

impl ApplicationDirectories for FixedApplicationDirectories {
    fn work_directory(&self, name: &Path) -> PathBuf {
        self.base.join(name)
    }
}
