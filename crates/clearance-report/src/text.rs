use colored::Colorize;

use clearance_core::config::Config;
use clearance_core::scan::CatLicFile;
use clearance_core::types::Status;

/// Format the review list as the plain-text review artifact: one
/// `category: license: path` line per flagged, unmatched file.
pub fn format_review(entries: &[CatLicFile]) -> String {
    let mut out = String::new();
    for entry in entries {
        out.push_str(&format!(
            "{}: {}: {}\n",
            entry.category, entry.license, entry.path
        ));
    }
    out
}

fn status_label(status: Status) -> String {
    let label = status.to_string();
    match status {
        Status::Delivered => label.green().to_string(),
        Status::Stopped => label.red().to_string(),
        Status::Start => label.dimmed().to_string(),
        _ => label.yellow().to_string(),
    }
}

/// Format a per-project / per-subproject status overview for the terminal.
pub fn format_status(cfg: &Config) -> String {
    let mut out = String::new();

    out.push_str(&format!(
        "\n{} {}\n{}\n",
        "Pipeline status for".bold(),
        cfg.month.bold(),
        "=".repeat(40)
    ));

    if !cfg.ok {
        out.push_str(&format!(
            "{}\n",
            "Config document failed validation; see diagnostics above.".red()
        ));
    }

    for (name, prj) in &cfg.projects {
        let ok_marker = if prj.ok { "" } else { " (NOT OK)" };
        out.push_str(&format!(
            "\n{}{}: {}\n",
            name.bold(),
            ok_marker.red(),
            status_label(prj.status)
        ));
        for (sp_name, sp) in &prj.subprojects {
            out.push_str(&format!(
                "  {}: {}\n",
                sp_name,
                status_label(sp.status)
            ));
            if !sp.slm_pending_licenses.is_empty() {
                out.push_str(&format!(
                    "    {}: {}\n",
                    "licenses-pending".red(),
                    sp.slm_pending_licenses.join(", ")
                ));
            }
        }
    }

    out.push('\n');
    out
}
