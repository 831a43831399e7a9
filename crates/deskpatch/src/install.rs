//! Installation discovery.

use std::fs;
use std::path::{Path, PathBuf};

use semver::Version;
use tracing::debug;

use crate::error::{Error, Result};

/// Launcher executable name inside an app directory.
#[cfg(target_os = "windows")]
pub const EXECUTABLE_NAME: &str = "claude.exe";
#[cfg(not(target_os = "windows"))]
pub const EXECUTABLE_NAME: &str = "claude";

pub const RESOURCES_DIR: &str = "resources";
pub const ARCHIVE_NAME: &str = "app.asar";
const VERSION_DIR_PREFIX: &str = "app-";

/// A resolved installation. Resolved fresh for every operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Installation {
    pub version: String,
    pub app_dir: PathBuf,
    pub resources_dir: PathBuf,
    pub archive_path: PathBuf,
    pub executable_path: PathBuf,
    /// Every version found next to this one, newest first.
    pub all_versions: Vec<String>,
}

impl Installation {
    /// Build the standard layout rooted at `app_dir`.
    pub fn from_app_dir(app_dir: impl Into<PathBuf>, version: impl Into<String>) -> Self {
        let app_dir = app_dir.into();
        let version = version.into();
        let resources_dir = app_dir.join(RESOURCES_DIR);
        Self {
            archive_path: resources_dir.join(ARCHIVE_NAME),
            executable_path: app_dir.join(EXECUTABLE_NAME),
            resources_dir,
            all_versions: vec![version.clone()],
            version,
            app_dir,
        }
    }

    fn is_complete(&self) -> bool {
        self.archive_path.is_file() && self.executable_path.is_file()
    }
}

/// Source of the installation to operate on.
pub trait InstallLocator {
    fn locate(&self) -> Result<Installation>;
}

/// Finds an installation under a base directory.
///
/// The base is either an app directory itself, or a Squirrel-style root with
/// one `app-<version>` directory per installed version.
#[derive(Debug, Clone)]
pub struct DirectoryLocator {
    base: PathBuf,
}

impl DirectoryLocator {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    fn versioned_dirs(&self) -> Result<Vec<(Version, PathBuf)>> {
        let entries = match fs::read_dir(&self.base) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::io(&self.base, e)),
        };

        let mut dirs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::io(&self.base, e))?;
            let name = entry.file_name();
            let Some(raw) = name.to_str().and_then(|n| n.strip_prefix(VERSION_DIR_PREFIX)) else {
                continue;
            };
            match Version::parse(raw) {
                Ok(version) if entry.path().is_dir() => dirs.push((version, entry.path())),
                Ok(_) => {}
                Err(e) => debug!("Skipping {}: {}", entry.path().display(), e),
            }
        }

        dirs.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(dirs)
    }
}

impl InstallLocator for DirectoryLocator {
    fn locate(&self) -> Result<Installation> {
        let direct = Installation::from_app_dir(&self.base, "unknown");
        if direct.is_complete() {
            debug!("Using app directory {}", self.base.display());
            return Ok(direct);
        }

        let dirs = self.versioned_dirs()?;
        let all_versions: Vec<String> = dirs.iter().map(|(v, _)| v.to_string()).collect();

        for (version, path) in &dirs {
            let install = Installation::from_app_dir(path, version.to_string());
            if install.is_complete() {
                debug!(
                    "Found version {} at {} ({} versions installed)",
                    version,
                    path.display(),
                    all_versions.len()
                );
                return Ok(Installation {
                    all_versions,
                    ..install
                });
            }
            debug!("Skipping incomplete install at {}", path.display());
        }

        Err(Error::NotInstalled(format!(
            "no {}/{} with {} under {}",
            RESOURCES_DIR,
            ARCHIVE_NAME,
            EXECUTABLE_NAME,
            self.base.display()
        )))
    }
}
