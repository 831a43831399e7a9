//! Byte-faithful backups of the archive and executable.
//!
//! Backups live next to the originals as `<file>.bak`. Both exist or neither
//! does; an existing pair is the true original and is never overwritten.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{Error, IoResultExt, Result};
use crate::install::Installation;
use crate::marker;

const BACKUP_SUFFIX: &str = "bak";

/// Result of [`create`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupOutcome {
    Created,
    /// A complete pair already existed and was left alone.
    Skipped,
}

/// Result of [`restore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreOutcome {
    pub archive: PathBuf,
    pub executable: PathBuf,
    pub marker_removed: bool,
}

pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(BACKUP_SUFFIX);
    PathBuf::from(name)
}

/// True only if both backup files are present.
pub fn exists(install: &Installation) -> bool {
    backup_path(&install.archive_path).is_file() && backup_path(&install.executable_path).is_file()
}

pub fn create(install: &Installation) -> Result<BackupOutcome> {
    if exists(install) {
        info!("Backups already present, keeping them");
        return Ok(BackupOutcome::Skipped);
    }

    let archive_bak = backup_path(&install.archive_path);
    let exe_bak = backup_path(&install.executable_path);
    for stray in [&archive_bak, &exe_bak] {
        if stray.exists() {
            warn!("Replacing unpaired backup {}", stray.display());
        }
    }

    copy(&install.archive_path, &archive_bak)?;
    if let Err(e) = copy(&install.executable_path, &exe_bak) {
        if let Err(cleanup) = remove_if_exists(&archive_bak) {
            warn!(
                "Failed to remove partial backup {}: {}",
                archive_bak.display(),
                cleanup
            );
        }
        return Err(e);
    }

    info!(
        "Backed up {} and {}",
        install.archive_path.display(),
        install.executable_path.display()
    );
    Ok(BackupOutcome::Created)
}

/// Copy both backups over the live files, then delete the marker and the
/// backups.
///
/// A failed copy stops here without retrying; the error names the live file
/// that still has to come from its backup, and the backups are kept. Once
/// both copies succeed the restore has succeeded; cleanup failures are only
/// logged.
pub fn restore(install: &Installation) -> Result<RestoreOutcome> {
    let pairs = [
        (backup_path(&install.archive_path), &install.archive_path),
        (backup_path(&install.executable_path), &install.executable_path),
    ];

    for (backup, _) in &pairs {
        if !backup.is_file() {
            return Err(Error::MissingBackup {
                path: backup.clone(),
            });
        }
    }

    for (backup, live) in &pairs {
        fs::copy(backup, live).map_err(|source| Error::RestoreIncomplete {
            pending: (*live).clone(),
            backup: backup.clone(),
            source,
        })?;
        info!("Restored {}", live.display());
    }

    let marker_removed = match marker::remove(install) {
        Ok(removed) => removed,
        Err(e) => {
            warn!("Files restored but the marker could not be removed: {}", e);
            false
        }
    };
    for (backup, _) in &pairs {
        if let Err(e) = remove_if_exists(backup) {
            warn!("Files restored but {} could not be removed: {}", backup.display(), e);
        }
    }

    Ok(RestoreOutcome {
        archive: install.archive_path.clone(),
        executable: install.executable_path.clone(),
        marker_removed,
    })
}

/// Delete both backups without touching the live files.
pub(crate) fn discard(install: &Installation) -> Result<()> {
    remove_if_exists(&backup_path(&install.archive_path))?;
    remove_if_exists(&backup_path(&install.executable_path))?;
    info!("Discarded backups");
    Ok(())
}

fn copy(from: &Path, to: &Path) -> Result<()> {
    fs::copy(from, to).at(to)?;
    Ok(())
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::io(path, e)),
    }
}
