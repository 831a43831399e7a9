use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::hash::HashValue;

#[derive(Debug, Error)]
pub enum Error {
    #[error("No installation found: {0}")]
    NotInstalled(String),

    #[error("{0} is running")]
    Running(String),

    #[error("Cannot open {} for writing", path.display())]
    Locked {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Installation is already patched (marker: {})", marker.display())]
    AlreadyPatched { marker: PathBuf },

    #[error("{} already contains the injected code", path.display())]
    AlreadyPatchedCode { path: PathBuf },

    #[error("Integrity mismatch: executable embeds {embedded}, archive header hashes to {actual}")]
    IntegrityMismatch {
        embedded: HashValue,
        actual: HashValue,
    },

    #[error("Archive layout changed: {} {reason}", path.display())]
    StructureChanged { path: PathBuf, reason: &'static str },

    #[error("Backup missing: {}", path.display())]
    MissingBackup { path: PathBuf },

    #[error("Installation at {} is not patched", app_dir.display())]
    NotPatched { app_dir: PathBuf },

    #[error("Marker {} exists but no backups were found", marker.display())]
    MarkerWithoutBackup { marker: PathBuf },

    #[error("Hash {hash} occurs {count} times in {}", path.display())]
    AmbiguousMatch {
        path: PathBuf,
        hash: HashValue,
        count: usize,
    },

    #[error("{what} not found in {}", path.display())]
    NotFound { path: PathBuf, what: String },

    #[error("Invalid format in {}: {message}", path.display())]
    Format { path: PathBuf, message: String },

    #[error("I/O error on {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Archive {operation} failed: {message}")]
    Archive {
        operation: &'static str,
        message: String,
    },

    #[error("Restore incomplete: {} could not be restored from {}", pending.display(), backup.display())]
    RestoreIncomplete {
        pending: PathBuf,
        backup: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Patch failed, original files restored")]
    RolledBack {
        #[source]
        cause: Box<Error>,
    },

    #[error("{cause}; automatic restore also failed: {restore}")]
    RollbackFailed {
        cause: Box<Error>,
        restore: Box<Error>,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn format(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Error::Format {
            path: path.into(),
            message: message.into(),
        }
    }

    /// The error that started it all, looking through rollback wrappers.
    pub fn cause(&self) -> &Error {
        match self {
            Error::RolledBack { cause } | Error::RollbackFailed { cause, .. } => cause.cause(),
            other => other,
        }
    }

    /// Suggested remediation for the operator.
    pub fn hint(&self) -> &'static str {
        match self {
            Error::NotInstalled(_) => {
                "Install the desktop application, or pass --install-dir pointing at it."
            }
            Error::Running(_) => "Close the application (including the tray icon) and try again.",
            Error::Locked { .. } => {
                "Close the application, or run the command as administrator."
            }
            Error::AlreadyPatched { .. } | Error::AlreadyPatchedCode { .. } => {
                "Run `deskpatch unpatch` first, or `deskpatch status` to inspect."
            }
            Error::IntegrityMismatch { .. } => {
                "Another tool modified the files. Reinstall the application, then patch again."
            }
            Error::StructureChanged { .. } => {
                "This application version is not supported. Update deskpatch."
            }
            Error::NotPatched { .. } => "Nothing to undo. Run `deskpatch status` to inspect.",
            Error::MissingBackup { .. } | Error::MarkerWithoutBackup { .. } => {
                "Backups are gone. Reinstall the application to get the original files back."
            }
            Error::AmbiguousMatch { .. } | Error::NotFound { .. } | Error::Format { .. } => {
                "This application build is not supported. Reinstall it or update deskpatch."
            }
            Error::Io { .. } | Error::Json(_) => {
                "Check the path and permissions, or run the command as administrator."
            }
            Error::Archive { .. } => "Check free disk space and permissions, then try again.",
            Error::RestoreIncomplete { .. } | Error::RollbackFailed { .. } => {
                "Manual recovery needed: copy each .bak file over its original, or reinstall."
            }
            Error::RolledBack { cause } => cause.hint(),
        }
    }
}

/// Attach a path to bare `std::io` results.
pub(crate) trait IoResultExt<T> {
    fn at(self, path: &Path) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn at(self, path: &Path) -> Result<T> {
        self.map_err(|source| Error::io(path, source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_os_error_is_source_not_message() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = Error::io("app.asar", io_err);
        assert_eq!(err.to_string(), "I/O error on app.asar");
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "denied");
    }

    #[test]
    fn test_rollback_wrappers_keep_cause_and_hint() {
        let cause = Error::StructureChanged {
            path: PathBuf::from(".vite/build/index.js"),
            reason: "not found",
        };
        let hint = cause.hint();
        let wrapped = Error::RolledBack {
            cause: Box::new(cause),
        };
        assert!(matches!(wrapped.cause(), Error::StructureChanged { .. }));
        assert_eq!(wrapped.hint(), hint);
        assert!(wrapped.to_string().contains("original files restored"));
        let source = std::error::Error::source(&wrapped).unwrap();
        assert!(source.to_string().contains("index.js not found"));
    }

    #[test]
    fn test_rollback_failed_reports_both_errors() {
        let err = Error::RollbackFailed {
            cause: Box::new(Error::Archive {
                operation: "pack",
                message: "disk full".to_string(),
            }),
            restore: Box::new(Error::MissingBackup {
                path: PathBuf::from("claude.exe.bak"),
            }),
        };
        let text = err.to_string();
        assert!(text.contains("disk full"));
        assert!(text.contains("claude.exe.bak"));
        assert!(err.hint().contains("Manual recovery"));
    }
}
