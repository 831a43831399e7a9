//! Patch command.

use anyhow::Result;
use deskpatch::{BackupOutcome, Patcher};
use owo_colors::OwoColorize;

pub fn run(patcher: &Patcher) -> Result<()> {
    let report = patcher.patch()?;

    println!("{} Claude {}", "Patched".green().bold(), report.version);
    println!();
    println!("  Archive:    {}", report.archive.display());
    println!("  Executable: {}", report.executable.display());
    println!("  Hash:       {} -> {}", report.hash_before, report.hash_after);
    match report.backup {
        BackupOutcome::Created => println!("  Backups:    created"),
        BackupOutcome::Skipped => println!("  Backups:    kept existing"),
    }
    println!();
    println!("Run `deskpatch unpatch` to restore the original files.");
    Ok(())
}
