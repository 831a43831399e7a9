use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "deskpatch", version)]
#[command(about = "Patch the desktop app's bundled resources and keep its integrity check happy")]
pub struct Cli {
    /// Install root (contains app-<version> directories) or an app directory
    #[arg(long, global = true, env = "DESKPATCH_INSTALL_DIR")]
    pub install_dir: Option<PathBuf>,

    /// Config file (default: <config dir>/deskpatch/config.toml)
    #[arg(long, global = true, env = "DESKPATCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Script to inject instead of the built-in payload
    #[arg(long, global = true)]
    pub payload: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Inject the payload and update the executable's integrity hash
    Patch,
    /// Restore the original archive and executable from backup
    Unpatch,
    /// Show whether the installation is patched
    Status,
}
