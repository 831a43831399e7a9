//! Unpatch command.

use anyhow::Result;
use deskpatch::Patcher;
use owo_colors::OwoColorize;

pub fn run(patcher: &Patcher) -> Result<()> {
    let report = patcher.unpatch()?;

    println!("{} Claude {}", "Restored".green().bold(), report.version);
    println!();
    println!("  Archive:    {}", report.restored.archive.display());
    println!("  Executable: {}", report.restored.executable.display());
    if report.restored.marker_removed {
        println!("  Marker:     removed");
    }
    Ok(())
}
