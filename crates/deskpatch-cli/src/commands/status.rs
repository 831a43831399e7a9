//! Status command.

use std::fmt::Write;

use anyhow::Result;
use deskpatch::{MarkerStatus, Patcher, StatusReport};
use owo_colors::OwoColorize;

pub fn run(patcher: &Patcher) -> Result<()> {
    let report = patcher.status()?;
    print!("{}", render(&report));
    Ok(())
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

fn tri(value: Option<bool>) -> &'static str {
    match value {
        Some(true) => "yes",
        Some(false) => "no",
        None => "unknown",
    }
}

pub fn render(report: &StatusReport) -> String {
    let install = &report.installation;
    let mut out = String::new();

    let state = if report.is_patched() {
        "patched".green().bold().to_string()
    } else {
        "not patched".yellow().bold().to_string()
    };
    let _ = writeln!(out, "Claude {}: {}", install.version, state);
    let _ = writeln!(out);
    let _ = writeln!(out, "  App directory:  {}", install.app_dir.display());
    let others: Vec<&str> = install
        .all_versions
        .iter()
        .map(String::as_str)
        .filter(|v| *v != install.version)
        .collect();
    if !others.is_empty() {
        let _ = writeln!(out, "  Other versions: {}", others.join(", "));
    }

    match &report.marker {
        MarkerStatus::Absent => {
            let _ = writeln!(out, "  Marker:         none");
        }
        MarkerStatus::Present(marker) => {
            let _ = writeln!(
                out,
                "  Marker:         {} {} at {}",
                marker.tool,
                marker.version,
                marker.patched_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
            let _ = writeln!(out, "  Original hash:  {}", marker.hashes.original);
            let _ = writeln!(out, "  Patched hash:   {}", marker.hashes.patched);
        }
        MarkerStatus::Unreadable(reason) => {
            let _ = writeln!(out, "  Marker:         unreadable ({reason})");
        }
    }

    let _ = writeln!(out, "  Backups:        {}", yes_no(report.backups_present));
    let _ = writeln!(out, "  Injected code:  {}", tri(report.code_patched));
    let _ = writeln!(out, "  Hashes match:   {}", tri(report.integrity_ok));
    let _ = writeln!(out, "  Running:        {}", yes_no(report.running));

    for warning in &report.warnings {
        let _ = writeln!(out, "{} {}", "warning:".yellow().bold(), warning);
    }
    out
}
