use crate::error::Error;
use crate::error::Result;
use std::path::Path;
use std::path::PathBuf;

/// the on-disk intermediate directory: raw dumps from live runs,
/// deduplicated crash archives, per-testcase input files, and a reserved
/// results area
pub struct Workspace {
    root: PathBuf,
}

impl From<PathBuf> for Workspace {
    fn from(root: PathBuf) -> Self {
        Self { root }
    }
}

impl Workspace {
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dumps(&self) -> PathBuf {
        self.root.join("dumps")
    }

    pub fn crashes(&self) -> PathBuf {
        self.root.join("crashes")
    }

    pub fn results(&self) -> PathBuf {
        self.root.join("results")
    }

    /// per-testcase input files land at the workspace root
    pub fn inputs(&self) -> PathBuf {
        self.root.clone()
    }

    /// create the layout, optionally wiping a previous run first. this is
    /// initialization: failures here are fatal.
    pub fn bootstrap(&self, clear: bool) -> Result<()> {
        if clear && self.root.is_dir() {
            std::fs::remove_dir_all(&self.root).map_err(|source| Error::Workspace {
                path: self.root.clone(),
                source,
            })?;
        }
        for directory in [self.dumps(), self.crashes(), self.results()] {
            std::fs::create_dir_all(&directory).map_err(|source| Error::Workspace {
                path: directory.clone(),
                source,
            })?;
        }
        Ok(())
    }
}
