use std::path::PathBuf;

use crate::backup::{BackupOutcome, RestoreOutcome};
use crate::hash::HashValue;
use crate::install::Installation;
use crate::marker::MarkerStatus;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchReport {
    pub version: String,
    pub archive: PathBuf,
    pub executable: PathBuf,
    pub hash_before: HashValue,
    pub hash_after: HashValue,
    pub backup: BackupOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnpatchReport {
    pub version: String,
    pub restored: RestoreOutcome,
}

/// Read-only view of an installation.
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub installation: Installation,
    pub marker: MarkerStatus,
    pub backups_present: bool,
    pub running: bool,
    /// Whether the live archive contains the injected code; `None` if that
    /// could not be determined.
    pub code_patched: Option<bool>,
    /// Whether the embedded hash matches the archive header; `None` if either
    /// could not be read.
    pub integrity_ok: Option<bool>,
    pub warnings: Vec<String>,
}

impl StatusReport {
    pub fn is_patched(&self) -> bool {
        self.marker.is_patched()
    }
}
