//! Patch transaction engine.
//!
//! `patch` runs the forward transaction:
//!
//! locate → preflight → read/verify hash → backup → extract → inject →
//! repack → rehash & patch executable → mark
//!
//! Errors before the backup leave no trace. From the backup on, a
//! [`RestoreGuard`](guard::RestoreGuard) unwinds every failure so the archive
//! and the executable never end up with mismatched hashes.

mod guard;
mod report;
mod state;

use std::fs::{self, OpenOptions};
use std::path::Path;

use tracing::{debug, info, warn};

use crate::asar::{ArchiveTranscoder, AsarTranscoder};
use crate::backup;
use crate::config::PatcherConfig;
use crate::error::{Error, IoResultExt, Result};
use crate::hash::HashValue;
use crate::install::{InstallLocator, Installation};
use crate::integrity;
use crate::marker::{self, MarkerStatus};
use crate::payload::{Payload, ScriptPayload};
use crate::process::{ProcessProbe, SystemProcessProbe};
use crate::scratch::ScratchDir;

use guard::RestoreGuard;
pub use report::{PatchReport, StatusReport, UnpatchReport};
pub use state::TransactionState;
use state::Transaction;

pub struct Patcher {
    locator: Box<dyn InstallLocator>,
    probe: Box<dyn ProcessProbe>,
    transcoder: Box<dyn ArchiveTranscoder>,
    payload: Box<dyn Payload>,
    config: PatcherConfig,
}

impl Patcher {
    /// Patcher with the system process probe, the asar transcoder and the
    /// built-in payload.
    pub fn new(locator: impl InstallLocator + 'static, config: PatcherConfig) -> Self {
        Self {
            locator: Box::new(locator),
            probe: Box::new(SystemProcessProbe::new(config.process_names.clone())),
            transcoder: Box::new(AsarTranscoder),
            payload: Box::new(ScriptPayload::default()),
            config,
        }
    }

    pub fn with_probe(mut self, probe: impl ProcessProbe + 'static) -> Self {
        self.probe = Box::new(probe);
        self
    }

    pub fn with_transcoder(mut self, transcoder: impl ArchiveTranscoder + 'static) -> Self {
        self.transcoder = Box::new(transcoder);
        self
    }

    pub fn with_payload(mut self, payload: impl Payload + 'static) -> Self {
        self.payload = Box::new(payload);
        self
    }

    pub fn patch(&self) -> Result<PatchReport> {
        let mut tx = Transaction::new();
        let result = self.run_patch(&mut tx);
        if let Err(e) = &result {
            warn!("Patch stopped at step '{}': {}", tx.state(), e);
        }
        result
    }

    fn run_patch(&self, tx: &mut Transaction) -> Result<PatchReport> {
        let install = self.locator.locate()?;
        tx.advance(TransactionState::Located);
        info!("Patching version {} at {}", install.version, install.app_dir.display());

        self.check_not_running()?;
        probe_writable(&install.archive_path)?;
        probe_writable(&install.executable_path)?;
        if marker::read(&install).is_patched() {
            return Err(Error::AlreadyPatched {
                marker: marker::marker_path(&install),
            });
        }
        tx.advance(TransactionState::Preflighted);

        let hash_before = integrity::find_embedded_hash(&install.executable_path)?;
        tx.advance(TransactionState::HashRead);

        let actual = integrity::header_hash(&install.archive_path)?;
        if actual != hash_before {
            return Err(Error::IntegrityMismatch {
                embedded: hash_before,
                actual,
            });
        }
        tx.advance(TransactionState::HashVerified);

        // Repacking only rewrites the archive body.
        let target = self.config.target_rel_path();
        if self
            .transcoder
            .is_stored_unpacked(&install.archive_path, &target)?
        {
            return Err(Error::StructureChanged {
                path: target,
                reason: "is stored outside the archive",
            });
        }

        let original_size = fs::metadata(&install.archive_path)
            .at(&install.archive_path)?
            .len();
        let backup_outcome = backup::create(&install)?;
        tx.advance(TransactionState::BackedUp);

        let mut guard = RestoreGuard::arm(&install, backup_outcome);
        match self.apply(&install, &hash_before, original_size, &mut guard, tx) {
            Ok(hash_after) => {
                guard.commit();
                tx.advance(TransactionState::Done);
                info!("Patched: {} -> {}", hash_before, hash_after);
                Ok(PatchReport {
                    version: install.version.clone(),
                    archive: install.archive_path.clone(),
                    executable: install.executable_path.clone(),
                    hash_before,
                    hash_after,
                    backup: backup_outcome,
                })
            }
            Err(e) => {
                let err = guard.release(e);
                tx.advance(TransactionState::RolledBack);
                Err(err)
            }
        }
    }

    /// Steps that run under the restore guard. Returns the new header hash.
    fn apply(
        &self,
        install: &Installation,
        hash_before: &HashValue,
        original_size: u64,
        guard: &mut RestoreGuard<'_>,
        tx: &mut Transaction,
    ) -> Result<HashValue> {
        let scratch = ScratchDir::create(&self.config.scratch_root, "patch")?;
        self.transcoder
            .extract_all(&install.archive_path, scratch.path())?;
        tx.advance(TransactionState::Extracted);

        self.inject(scratch.path())?;
        tx.advance(TransactionState::Injected);

        guard.touch_live();
        self.transcoder
            .create_package(scratch.path(), &install.archive_path)?;
        self.check_repacked_size(&install.archive_path, original_size)?;
        tx.advance(TransactionState::Repacked);

        let hash_after = integrity::header_hash(&install.archive_path)?;
        integrity::rewrite_embedded_hash(&install.executable_path, hash_before, &hash_after)?;
        let embedded = integrity::find_embedded_hash(&install.executable_path)?;
        if embedded != hash_after {
            return Err(Error::IntegrityMismatch {
                embedded,
                actual: hash_after,
            });
        }
        tx.advance(TransactionState::RehashedHashPatched);

        marker::write(install, hash_before, &hash_after)?;
        tx.advance(TransactionState::Marked);

        drop(scratch);
        Ok(hash_after)
    }

    fn inject(&self, root: &Path) -> Result<()> {
        let rel = self.config.target_rel_path();
        let path = root.join(&rel);
        if !path.is_file() {
            return Err(Error::StructureChanged {
                path: rel,
                reason: "not found",
            });
        }

        let content = fs::read_to_string(&path).at(&path)?;
        if self.payload.is_patched(&content) {
            return Err(Error::AlreadyPatchedCode { path: rel });
        }

        let patched = inject_script(&content, &self.payload.script(), &self.config.trailing_comment);
        fs::write(&path, patched).at(&path)?;
        debug!("Injected payload into {}", rel.display());
        Ok(())
    }

    fn check_repacked_size(&self, archive: &Path, original_size: u64) -> Result<()> {
        let size = fs::metadata(archive).at(archive)?.len();
        let minimum = (original_size as f64 * self.config.min_repack_ratio) as u64;
        if size == 0 || size < minimum {
            return Err(Error::format(
                archive,
                format!("repacked archive is {size} bytes, expected at least {minimum}"),
            ));
        }
        debug!("Repacked archive: {} -> {} bytes", original_size, size);
        Ok(())
    }

    pub fn unpatch(&self) -> Result<UnpatchReport> {
        let install = self.locator.locate()?;
        info!("Unpatching version {} at {}", install.version, install.app_dir.display());
        self.check_not_running()?;

        if !backup::exists(&install) {
            return Err(match marker::read(&install) {
                MarkerStatus::Absent => Error::NotPatched {
                    app_dir: install.app_dir.clone(),
                },
                _ => Error::MarkerWithoutBackup {
                    marker: marker::marker_path(&install),
                },
            });
        }

        probe_writable(&install.archive_path)?;
        probe_writable(&install.executable_path)?;

        let restored = backup::restore(&install)?;
        info!("Unpatched version {}", install.version);
        Ok(UnpatchReport {
            version: install.version,
            restored,
        })
    }

    pub fn status(&self) -> Result<StatusReport> {
        let install = self.locator.locate()?;
        let marker = marker::read(&install);
        let backups_present = backup::exists(&install);
        let running = self.probe.is_running();
        let code_patched = self.code_patched(&install);
        let integrity_ok = integrity_matches(&install);

        let mut warnings = Vec::new();
        if let MarkerStatus::Unreadable(reason) = &marker {
            warnings.push(format!("Marker file is unreadable ({reason}); treating as patched"));
        }
        match code_patched {
            Some(true) if !marker.is_patched() => {
                warnings.push("Injected code is present but no marker was found".to_string())
            }
            Some(false) if marker.is_patched() => {
                warnings.push("Marker says patched but the injected code is missing".to_string())
            }
            _ => {}
        }
        if marker.is_patched() && !backups_present {
            warnings.push("Marker present but backups are missing".to_string());
        }
        if !marker.is_patched() && backups_present {
            warnings.push("Backups present without a marker".to_string());
        }
        if integrity_ok == Some(false) {
            warnings.push("Embedded hash does not match the archive header".to_string());
        }

        Ok(StatusReport {
            installation: install,
            marker,
            backups_present,
            running,
            code_patched,
            integrity_ok,
            warnings,
        })
    }

    /// Best effort: extract to a throwaway directory and look for the payload.
    fn code_patched(&self, install: &Installation) -> Option<bool> {
        let scratch = match ScratchDir::create(&self.config.scratch_root, "status") {
            Ok(scratch) => scratch,
            Err(e) => {
                warn!("Code check skipped: {}", e);
                return None;
            }
        };
        if let Err(e) = self
            .transcoder
            .extract_all(&install.archive_path, scratch.path())
        {
            warn!("Code check skipped: {}", e);
            return None;
        }

        let path = scratch.path().join(self.config.target_rel_path());
        match fs::read_to_string(&path) {
            Ok(content) => Some(self.payload.is_patched(&content)),
            Err(e) => {
                warn!("Code check skipped, cannot read {}: {}", path.display(), e);
                None
            }
        }
    }

    fn check_not_running(&self) -> Result<()> {
        if self.probe.is_running() {
            return Err(Error::Running(self.config.process_names.join(" / ")));
        }
        Ok(())
    }
}

/// Insert `script` before the last `trailing_comment`, or append it.
pub fn inject_script(content: &str, script: &str, trailing_comment: &str) -> String {
    let mut out = String::with_capacity(content.len() + script.len() + 1);
    match content.rfind(trailing_comment).filter(|_| !trailing_comment.is_empty()) {
        Some(pos) => {
            out.push_str(&content[..pos]);
            out.push_str(script);
            out.push('\n');
            out.push_str(&content[pos..]);
        }
        None => {
            out.push_str(content);
            out.push_str(script);
        }
    }
    out
}

/// Open for read-write without modifying, to detect locked files.
fn probe_writable(path: &Path) -> Result<()> {
    match OpenOptions::new().read(true).write(true).open(path) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::io(path, e)),
        Err(source) => Err(Error::Locked {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn integrity_matches(install: &Installation) -> Option<bool> {
    let embedded = integrity::find_embedded_hash(&install.executable_path)
        .map_err(|e| debug!("Cannot read embedded hash: {}", e))
        .ok()?;
    let actual = integrity::header_hash(&install.archive_path)
        .map_err(|e| debug!("Cannot hash archive header: {}", e))
        .ok()?;
    Some(embedded == actual)
}

#[cfg(test)]
mod tests;
