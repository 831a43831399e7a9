//! # deskpatch
//!
//! Patches an installed Electron desktop application while keeping its asar
//! integrity check satisfied, and restores the original files on demand.
//!
//! This crate provides:
//! - Archive header hashing and executable hash rewriting (`integrity`)
//! - Byte-faithful backups and restore (`backup`)
//! - The patch marker side-car file (`marker`)
//! - The patch / unpatch / status transactions (`patcher`)
//! - An asar extractor and packer (`asar`)
//!
//! ## Example
//!
//! ```ignore
//! use deskpatch::{DirectoryLocator, Patcher, PatcherConfig};
//!
//! let patcher = Patcher::new(DirectoryLocator::new(base_dir), PatcherConfig::default());
//! let report = patcher.patch()?;
//! println!("{} -> {}", report.hash_before, report.hash_after);
//! ```

pub mod asar;
pub mod backup;
pub mod config;
pub mod error;
pub mod hash;
pub mod install;
pub mod integrity;
pub mod marker;
pub mod patcher;
pub mod payload;
pub mod prelude;
pub mod process;
pub mod scratch;

#[cfg(test)]
pub(crate) mod testing;

pub use asar::{ArchiveTranscoder, AsarTranscoder};
pub use backup::{BackupOutcome, RestoreOutcome};
pub use config::{PatcherConfig, PatcherConfigBuilder};
pub use error::{Error, Result};
pub use hash::HashValue;
pub use install::{DirectoryLocator, InstallLocator, Installation};
pub use integrity::{find_embedded_hash, header_hash, rewrite_embedded_hash};
pub use marker::{Marker, MarkerStatus};
pub use patcher::{PatchReport, Patcher, StatusReport, TransactionState, UnpatchReport};
pub use payload::{PAYLOAD_MARKER, Payload, ScriptPayload};
pub use process::{ProcessProbe, SystemProcessProbe};
