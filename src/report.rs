use crate::error::Error;
use crate::inject::InjectionReport;

/// One-line human summary plus one line per warning.
pub fn format_summary(report: &InjectionReport) -> String {
    let mut out = format!(
        "injected loadLibrary(\"{}\") into {} ({} variant, {} lines at line {})",
        report.library,
        report.path.display(),
        report.variant,
        report.inserted_lines,
        report.inserted_at + 1,
    );
    match report.locals {
        Some(change) => out.push_str(&format!(
            "; .locals {} -> {} on line {}",
            change.before,
            change.after,
            change.line + 1
        )),
        None => out.push_str("; .locals unchanged"),
    }
    out.push('\n');
    for warning in &report.warnings {
        out.push_str(&format!("warning: {warning}\n"));
    }
    out
}

/// Pretty-printed JSON form of the report.
pub fn format_json(report: &InjectionReport) -> Result<String, Error> {
    let mut json = serde_json::to_string_pretty(report)?;
    json.push('\n');
    Ok(json)
}
