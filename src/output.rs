//! Rendering of check and inspect results.

use std::io;

use clap::ValueEnum;

use crate::checker::{CheckResults, InspectResults};
use crate::error::Result;

/// Output format for results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// One line per object
    #[default]
    Text,
    /// The full result map as JSON
    Json,
}

/// Render results as text, one line per object in key order.
///
/// Verbose output adds one indented line per level and one per reason.
pub fn render(results: &CheckResults, verbose: bool) -> String {
    let mut out = String::new();
    for (key, result) in results {
        out.push_str(&format!("{key}: {}\n", result.outcome));
        if !verbose {
            continue;
        }

        if let Some(level) = result.namespace_level {
            let version = result.namespace_version.as_deref().unwrap_or("latest");
            let verdict = if result.passes(level) {
                "admitted"
            } else {
                "denied"
            };
            out.push_str(&format!("    namespace enforces {level}:{version}, {verdict}\n"));
        }
        for (level, verdict) in &result.verdicts {
            let status = if verdict.allowed { "allowed" } else { "forbidden" };
            out.push_str(&format!("    {level}: {status}\n"));
            for reason in &verdict.reasons {
                out.push_str(&format!("      - {reason}\n"));
            }
        }
    }
    out
}

/// Write results to `out` in the chosen format
pub fn write(
    out: &mut impl io::Write,
    results: &CheckResults,
    format: OutputFormat,
    verbose: bool,
) -> Result<()> {
    match format {
        OutputFormat::Text => out.write_all(render(results, verbose).as_bytes())?,
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, results)?;
            writeln!(out)?;
        }
    }
    Ok(())
}

/// Render namespace summaries as text, one line per namespace.
pub fn render_namespaces(results: &InspectResults, verbose: bool) -> String {
    let mut out = String::new();
    for (namespace, summary) in results {
        out.push_str(&format!("{namespace}: {summary}\n"));
        if !verbose {
            continue;
        }

        out.push_str(&format!(
            "    objects: {} ({} exempt)\n",
            summary.objects, summary.exempt_objects
        ));
        if let (Some(level), Some(admits)) = (summary.enforce_level, summary.admits_current_workloads()) {
            let version = summary.enforce_version.as_deref().unwrap_or("latest");
            let verdict = if admits {
                "admits current workloads"
            } else {
                "would deny current workloads"
            };
            out.push_str(&format!("    namespace enforces {level}:{version}, {verdict}\n"));
        }
    }
    out
}

/// Write namespace summaries to `out` in the chosen format
pub fn write_namespaces(
    out: &mut impl io::Write,
    results: &InspectResults,
    format: OutputFormat,
    verbose: bool,
) -> Result<()> {
    match format {
        OutputFormat::Text => out.write_all(render_namespaces(results, verbose).as_bytes())?,
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, results)?;
            writeln!(out)?;
        }
    }
    Ok(())
}
