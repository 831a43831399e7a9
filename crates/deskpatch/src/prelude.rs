//! Prelude module for convenient imports
//!
//! ```ignore
//! use deskpatch::prelude::*;
//! ```
//!
//! This brings the following into scope:
//!
//! - Orchestration: `Patcher`, `PatcherConfig`, reports
//! - Collaborators: `InstallLocator`, `ProcessProbe`, `ArchiveTranscoder`, `Payload`
//! - Error handling: `Error`, `Result`

pub use crate::asar::{ArchiveTranscoder, AsarTranscoder};
pub use crate::config::PatcherConfig;
pub use crate::error::{Error, Result};
pub use crate::hash::HashValue;
pub use crate::install::{DirectoryLocator, InstallLocator, Installation};
pub use crate::marker::MarkerStatus;
pub use crate::patcher::{PatchReport, Patcher, StatusReport, UnpatchReport};
pub use crate::payload::{Payload, ScriptPayload};
pub use crate::process::{ProcessProbe, SystemProcessProbe};
