pub mod patch;
pub mod status;
pub mod unpatch;

use std::path::PathBuf;

use anyhow::{Context, Result};
use deskpatch::{DirectoryLocator, Error, Patcher, ScriptPayload};
use tracing::debug;

use crate::cli::Cli;
use crate::config::{FileConfig, default_install_dir};

/// Command-line flags override the config file, which overrides defaults.
pub fn build_patcher(cli: &Cli, file_config: &FileConfig) -> Result<Patcher> {
    let base = install_dir(cli, file_config)
        .context("Failed to determine the install directory; pass --install-dir")?;
    let locator = DirectoryLocator::new(base);
    debug!("Install base: {}", locator.base().display());

    let mut patcher = Patcher::new(locator, file_config.patcher_config());

    if let Some(path) = cli.payload.as_ref().or(file_config.payload.as_ref()) {
        let payload = ScriptPayload::from_file(path)
            .with_context(|| format!("Failed to load payload {}", path.display()))?;
        patcher = patcher.with_payload(payload);
    }
    Ok(patcher)
}

fn install_dir(cli: &Cli, file_config: &FileConfig) -> Option<PathBuf> {
    cli.install_dir
        .clone()
        .or_else(|| file_config.install_dir.clone())
        .or_else(default_install_dir)
}

/// Follow-up command worth suggesting after `err`.
pub fn next_command(err: &Error) -> Option<&'static str> {
    match err.cause() {
        Error::AlreadyPatched { .. } | Error::AlreadyPatchedCode { .. } => {
            Some("deskpatch status")
        }
        Error::IntegrityMismatch { .. } => Some("deskpatch unpatch"),
        Error::RestoreIncomplete { .. } | Error::MissingBackup { .. } => Some("deskpatch status"),
        Error::NotPatched { .. } => Some("deskpatch patch"),
        _ => match err {
            Error::RollbackFailed { .. } => Some("deskpatch unpatch"),
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_flag_overrides_file_install_dir() {
        let cli = Cli::try_parse_from(["deskpatch", "status", "--install-dir", "/from/flag"]).unwrap();
        let file_config = FileConfig {
            install_dir: Some(PathBuf::from("/from/file")),
            ..Default::default()
        };
        assert_eq!(install_dir(&cli, &file_config), Some(PathBuf::from("/from/flag")));

        let cli = Cli::try_parse_from(["deskpatch", "status"]).unwrap();
        if cli.install_dir.is_none() {
            assert_eq!(install_dir(&cli, &file_config), Some(PathBuf::from("/from/file")));
        }
    }

    #[test]
    fn test_missing_payload_file_is_error() {
        let cli = Cli::try_parse_from([
            "deskpatch",
            "patch",
            "--install-dir",
            "/nowhere",
            "--payload",
            "/nowhere/payload.js",
        ])
        .unwrap();
        assert!(build_patcher(&cli, &FileConfig::default()).is_err());
    }

    #[test]
    fn test_next_command_suggestions() {
        let err = Error::NotPatched {
            app_dir: PathBuf::from("/app"),
        };
        assert_eq!(next_command(&err), Some("deskpatch patch"));

        let err = Error::RolledBack {
            cause: Box::new(Error::AlreadyPatchedCode {
                path: PathBuf::from("index.js"),
            }),
        };
        assert_eq!(next_command(&err), Some("deskpatch status"));

        assert_eq!(next_command(&Error::Running("claude".into())), None);
    }
}
