//! Optional TOML config file.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use deskpatch::PatcherConfig;
use serde::Deserialize;
use tracing::debug;

const APP_DIR_NAME: &str = "AnthropicClaude";

/// Every field is optional; command-line flags win over the file.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub install_dir: Option<PathBuf>,
    pub scratch_dir: Option<PathBuf>,
    pub payload: Option<PathBuf>,
    pub target_file: Option<String>,
    pub trailing_comment: Option<String>,
    pub process_names: Option<Vec<String>>,
    pub min_repack_ratio: Option<f64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// An explicit path must exist; the default path is optional.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match default_config_path() {
            Some(path) if path.is_file() => Self::load(&path),
            _ => {
                debug!("No config file, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn patcher_config(&self) -> PatcherConfig {
        let mut builder = PatcherConfig::builder();
        if let Some(dir) = &self.scratch_dir {
            builder = builder.scratch_root(dir);
        }
        if let Some(target) = &self.target_file {
            builder = builder.target_file(target);
        }
        if let Some(comment) = &self.trailing_comment {
            builder = builder.trailing_comment(comment);
        }
        if let Some(names) = &self.process_names {
            builder = builder.process_names(names.iter().cloned());
        }
        if let Some(ratio) = self.min_repack_ratio {
            builder = builder.min_repack_ratio(ratio);
        }
        builder.build()
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("deskpatch").join("config.toml"))
}

pub fn default_install_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|dir| dir.join(APP_DIR_NAME))
}
