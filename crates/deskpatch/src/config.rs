//! Patcher configuration.

use std::path::PathBuf;

/// File inside the archive that receives the payload.
pub const DEFAULT_TARGET_FILE: &str = ".vite/build/index.js";
/// The payload goes right before this trailing comment when present.
pub const DEFAULT_TRAILING_COMMENT: &str = "//# sourceMappingURL=";
pub const DEFAULT_PROCESS_NAMES: &[&str] = &["claude.exe", "claude"];
/// A repacked archive smaller than this fraction of the original is rejected.
pub const DEFAULT_MIN_REPACK_RATIO: f64 = 0.5;

#[derive(Debug, Clone)]
pub struct PatcherConfig {
    /// Where scratch extraction directories are created
    pub scratch_root: PathBuf,
    /// Target file, relative to the archive root, `/`-separated
    pub target_file: String,
    pub trailing_comment: String,
    /// Executable names of the host process
    pub process_names: Vec<String>,
    pub min_repack_ratio: f64,
}

impl Default for PatcherConfig {
    fn default() -> Self {
        Self {
            scratch_root: std::env::temp_dir(),
            target_file: DEFAULT_TARGET_FILE.to_string(),
            trailing_comment: DEFAULT_TRAILING_COMMENT.to_string(),
            process_names: DEFAULT_PROCESS_NAMES.iter().map(|s| s.to_string()).collect(),
            min_repack_ratio: DEFAULT_MIN_REPACK_RATIO,
        }
    }
}

impl PatcherConfig {
    /// Create a new configuration builder
    pub fn builder() -> PatcherConfigBuilder {
        PatcherConfigBuilder::default()
    }

    /// Target file as a platform path relative to the extraction root.
    pub fn target_rel_path(&self) -> PathBuf {
        self.target_file
            .split('/')
            .filter(|part| !part.is_empty())
            .collect()
    }
}

/// Builder for PatcherConfig
#[derive(Debug, Clone, Default)]
pub struct PatcherConfigBuilder {
    scratch_root: Option<PathBuf>,
    target_file: Option<String>,
    trailing_comment: Option<String>,
    process_names: Option<Vec<String>>,
    min_repack_ratio: Option<f64>,
}

impl PatcherConfigBuilder {
    pub fn scratch_root<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.scratch_root = Some(path.into());
        self
    }

    pub fn target_file<S: Into<String>>(mut self, path: S) -> Self {
        self.target_file = Some(path.into());
        self
    }

    pub fn trailing_comment<S: Into<String>>(mut self, comment: S) -> Self {
        self.trailing_comment = Some(comment.into());
        self
    }

    pub fn process_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.process_names = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn min_repack_ratio(mut self, ratio: f64) -> Self {
        self.min_repack_ratio = Some(ratio);
        self
    }

    /// Build the configuration
    pub fn build(self) -> PatcherConfig {
        let default = PatcherConfig::default();
        PatcherConfig {
            scratch_root: self.scratch_root.unwrap_or(default.scratch_root),
            target_file: self.target_file.unwrap_or(default.target_file),
            trailing_comment: self.trailing_comment.unwrap_or(default.trailing_comment),
            process_names: self.process_names.unwrap_or(default.process_names),
            min_repack_ratio: self
                .min_repack_ratio
                .map(|r| r.clamp(0.0, 1.0))
                .unwrap_or(default.min_repack_ratio),
        }
    }
}
