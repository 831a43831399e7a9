//! Ephemeral extraction directories.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, warn};

use crate::error::{IoResultExt, Result};

/// A uniquely named directory removed on drop.
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    /// Create `<root>/deskpatch-<purpose>-<timestamp>-<pid>`.
    pub fn create(root: &Path, purpose: &str) -> Result<Self> {
        let name = format!(
            "deskpatch-{}-{}-{}",
            purpose,
            Utc::now().format("%Y%m%d%H%M%S%f"),
            std::process::id()
        );
        let path = root.join(name);
        fs::create_dir_all(&path).at(&path)?;
        debug!("Created scratch directory {}", path.display());
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.path) {
            warn!(
                "Failed to remove scratch directory {}: {}",
                self.path.display(),
                e
            );
        }
    }
}
