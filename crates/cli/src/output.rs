//! Rendering of merge outcomes for the terminal.

use anyhow::{Context, Result};

use mergecommit_core::models::MergeOutcome;

/// Human-readable report: one line on success, a path list on conflict.
pub fn render_text(outcome: &MergeOutcome) -> String {
    match outcome {
        MergeOutcome::Merged(merged) => format!(
            "merge {} and {} into new commit: {}\n",
            merged.ours_ref, merged.theirs_ref, merged.commit
        ),
        MergeOutcome::Conflicted(report) => {
            let mut out = format!(
                "could not auto-merge {} and {} due to conflicts in {} path(s):\n",
                report.ours_ref,
                report.theirs_ref,
                report.paths.len()
            );
            for path in &report.paths {
                out.push_str(&format!("  {path}\n"));
            }
            out
        }
    }
}

/// Machine-readable report, tagged with `"status"`.
pub fn render_json(outcome: &MergeOutcome) -> Result<String> {
    let mut json =
        serde_json::to_string_pretty(outcome).context("failed to serialize merge outcome")?;
    json.push('\n');
    Ok(json)
}
