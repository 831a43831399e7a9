//! Rollback on any non-success exit once backups exist.

use tracing::{error, info, warn};

use crate::backup::{self, BackupOutcome};
use crate::error::Error;
use crate::install::Installation;

/// Holds the "backups exist" guarantee for the rest of a patch transaction.
///
/// Before the live archive is touched, unwinding only discards backups this
/// transaction created. After [`RestoreGuard::touch_live`], unwinding restores
/// both live files from backup. Dropping an armed guard (a panic) unwinds too.
pub(crate) struct RestoreGuard<'a> {
    install: &'a Installation,
    created_backups: bool,
    live_touched: bool,
    armed: bool,
}

impl<'a> RestoreGuard<'a> {
    pub fn arm(install: &'a Installation, outcome: BackupOutcome) -> Self {
        Self {
            install,
            created_backups: outcome == BackupOutcome::Created,
            live_touched: false,
            armed: true,
        }
    }

    /// Called right before the first write to a live file.
    pub fn touch_live(&mut self) {
        self.live_touched = true;
    }

    /// Success: keep everything as is.
    pub fn commit(mut self) {
        self.armed = false;
    }

    /// Failure: unwind and return the error to report.
    pub fn release(mut self, cause: Error) -> Error {
        self.armed = false;
        self.unwind(cause)
    }

    fn unwind(&self, cause: Error) -> Error {
        if !self.live_touched {
            if self.created_backups {
                if let Err(e) = backup::discard(self.install) {
                    warn!("Failed to discard backups: {}", e);
                }
            }
            return cause;
        }

        warn!("Patch failed after modifying files ({}), restoring backups", cause);
        match backup::restore(self.install) {
            Ok(_) => {
                info!("Original files restored");
                Error::RolledBack {
                    cause: Box::new(cause),
                }
            }
            Err(restore) => {
                error!("Automatic restore failed: {}", restore);
                Error::RollbackFailed {
                    cause: Box::new(cause),
                    restore: Box::new(restore),
                }
            }
        }
    }
}

impl Drop for RestoreGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.armed = false;
            let err = self.unwind(Error::Archive {
                operation: "patch",
                message: "transaction aborted".to_string(),
            });
            error!("Patch transaction aborted: {}", err);
        }
    }
}
