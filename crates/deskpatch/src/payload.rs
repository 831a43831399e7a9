//! Text injected into the extracted archive.

use std::fs;
use std::path::Path;

use crate::error::{IoResultExt, Result};

/// Unique string that identifies injected code.
pub const PAYLOAD_MARKER: &str = "/* @deskpatch-injected */";

/// Source of the injected text.
pub trait Payload {
    /// Text to inject. Must contain [`Payload::marker`].
    fn script(&self) -> String;

    fn marker(&self) -> &str {
        PAYLOAD_MARKER
    }

    fn is_patched(&self, content: &str) -> bool {
        content.contains(self.marker())
    }
}

/// A script body wrapped with the marker.
#[derive(Debug, Clone)]
pub struct ScriptPayload {
    body: String,
}

impl ScriptPayload {
    pub fn new(body: impl Into<String>) -> Self {
        Self { body: body.into() }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let body = fs::read_to_string(path).at(path)?;
        Ok(Self::new(body))
    }
}

impl Default for ScriptPayload {
    fn default() -> Self {
        Self::new(include_str!("payload.js"))
    }
}

impl Payload for ScriptPayload {
    fn script(&self) -> String {
        format!("\n{}\n{}\n", PAYLOAD_MARKER, self.body.trim_end())
    }
}
