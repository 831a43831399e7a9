//! Side-car record saying "this installation is patched".
//!
//! The file's existence is what counts. A body that no longer parses still
//! means patched; the content is only diagnostic.

use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Error, IoResultExt, Result};
use crate::hash::HashValue;
use crate::install::Installation;

pub const MARKER_FILE_NAME: &str = ".deskpatch.json";
pub const TOOL_NAME: &str = "deskpatch";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerHashes {
    pub original: HashValue,
    pub patched: HashValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Marker {
    pub tool: String,
    pub version: String,
    pub patched_at: DateTime<Utc>,
    pub claude_version: String,
    pub hashes: MarkerHashes,
}

impl Marker {
    pub fn new(app_version: &str, hash_before: HashValue, hash_after: HashValue) -> Self {
        Self {
            tool: TOOL_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            patched_at: Utc::now(),
            claude_version: app_version.to_string(),
            hashes: MarkerHashes {
                original: hash_before,
                patched: hash_after,
            },
        }
    }
}

/// What was found at the marker path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkerStatus {
    Absent,
    Present(Marker),
    /// The file exists but its body could not be decoded.
    Unreadable(String),
}

impl MarkerStatus {
    pub fn is_patched(&self) -> bool {
        !matches!(self, MarkerStatus::Absent)
    }

    pub fn marker(&self) -> Option<&Marker> {
        match self {
            MarkerStatus::Present(marker) => Some(marker),
            _ => None,
        }
    }
}

pub fn marker_path(install: &Installation) -> PathBuf {
    install.resources_dir.join(MARKER_FILE_NAME)
}

pub fn write(install: &Installation, hash_before: &HashValue, hash_after: &HashValue) -> Result<Marker> {
    let marker = Marker::new(&install.version, hash_before.clone(), hash_after.clone());
    let path = marker_path(install);
    let content = serde_json::to_string_pretty(&marker)?;
    fs::write(&path, content).at(&path)?;
    info!("Wrote marker {}", path.display());
    Ok(marker)
}

pub fn read(install: &Installation) -> MarkerStatus {
    let path = marker_path(install);
    let content = match fs::read(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return MarkerStatus::Absent,
        Err(e) => {
            warn!("Marker {} exists but is unreadable: {}", path.display(), e);
            return MarkerStatus::Unreadable(e.to_string());
        }
    };

    match serde_json::from_slice::<Marker>(&content) {
        Ok(marker) => MarkerStatus::Present(marker),
        Err(e) => {
            warn!("Marker {} is corrupt: {}", path.display(), e);
            MarkerStatus::Unreadable(e.to_string())
        }
    }
}

/// Delete the marker. Returns whether one was there.
pub fn remove(install: &Installation) -> Result<bool> {
    let path = marker_path(install);
    match fs::remove_file(&path) {
        Ok(()) => {
            info!("Removed marker {}", path.display());
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Error::io(path, e)),
    }
}
