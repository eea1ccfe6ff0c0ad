//! Report serialization: CSV result table, JSON report document and a
//! Markdown summary grouped by category.

use std::fmt::Write as _;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use time::OffsetDateTime;
use time::macros::format_description;

use crate::core::{CheckResult, CheckStatus, Report, Severity};
use crate::scoring::group_by_category;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportFormat {
    Json,
    Csv,
    Markdown,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
            Self::Markdown => "md",
        }
    }
}

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    id: &'a str,
    title: &'a str,
    category: &'a str,
    status: CheckStatus,
    severity: Severity,
    finding: &'a str,
    risk: &'a str,
}

impl<'a> From<&'a CheckResult> for CsvRow<'a> {
    fn from(r: &'a CheckResult) -> Self {
        Self {
            id: &r.id,
            title: &r.title,
            category: &r.category,
            status: r.status,
            severity: r.severity,
            finding: &r.finding,
            risk: &r.risk,
        }
    }
}

/// One row per result with header `id,title,category,status,severity,finding,risk`.
pub fn write_csv<W: Write>(results: &[CheckResult], writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    if results.is_empty() {
        wtr.write_record(["id", "title", "category", "status", "severity", "finding", "risk"])?;
    }
    for r in results {
        wtr.serialize(CsvRow::from(r))?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn csv_string(results: &[CheckResult]) -> Result<String> {
    let mut buf = Vec::new();
    write_csv(results, &mut buf)?;
    String::from_utf8(buf).context("CSV output is not valid UTF-8")
}

pub fn json_string(report: &Report) -> Result<String> {
    let mut s = serde_json::to_string_pretty(report)?;
    s.push('\n');
    Ok(s)
}

pub fn render(report: &Report, format: ExportFormat, include_evidence: bool) -> Result<String> {
    match format {
        ExportFormat::Json => json_string(report),
        ExportFormat::Csv => csv_string(&report.results),
        ExportFormat::Markdown => Ok(format_markdown(report, include_evidence)),
    }
}

/// `compliance_report_YYYYMMDD_HHMMSS.<ext>` in `dir`, stamped with `at`.
pub fn timestamped_path(dir: &Path, format: ExportFormat, at: OffsetDateTime) -> PathBuf {
    let stamp = at
        .format(format_description!("[year][month][day]_[hour][minute][second]"))
        .unwrap_or_else(|_| "unknown".to_string());
    dir.join(format!("compliance_report_{stamp}.{}", format.extension()))
}

pub fn write_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory: {}", parent.display()))?;
    }
    std::fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))
}

pub fn format_markdown(report: &Report, include_evidence: bool) -> String {
    let mut out = String::new();
    let s = &report.summary;

    let _ = writeln!(out, "# Compliance Report");
    let _ = writeln!(out);
    let _ = writeln!(out, "- Tool version: {}", report.tool_version);
    let _ = writeln!(out, "- Generated: {}", report.generated_at);
    let _ = writeln!(out, "- OS: {} {}", report.os.name, report.os.version);
    let _ = writeln!(out, "- Compliance score: {:.1}%", s.compliance_score);
    let _ = writeln!(
        out,
        "- Checks: {} total, {} passed, {} failed, {} warnings, {} errors, {} not applicable",
        s.total, s.passed, s.failed, s.warnings, s.errors, s.not_applicable
    );

    if report.results.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "_No checks were run._");
    }

    for group in group_by_category(&report.results) {
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "## {} ({}/{} passed)",
            group.category,
            group.passed(),
            group.results.len()
        );
        for r in group.results {
            let _ = writeln!(out);
            let _ = writeln!(out, "### [{}] {}", r.status, r.title);
            let _ = writeln!(out, "- id: `{}`", r.id);
            let _ = writeln!(out, "- severity: {}", r.severity);
            let _ = writeln!(out, "- finding: {}", r.finding);
            if !r.compliance_frameworks.is_empty() {
                let _ = writeln!(out, "- frameworks: {}", r.compliance_frameworks.join(", "));
            }
            if !r.risk.is_empty() {
                let _ = writeln!(out, "- risk: {}", r.risk);
            }
            if let Some(err) = &r.error {
                let _ = writeln!(out, "- error: `{err}`");
            }
            if r.status == CheckStatus::Fail && !r.remediation.trim().is_empty() {
                let _ = writeln!(out);
                let _ = writeln!(out, "#### Remediation");
                let _ = writeln!(out);
                let _ = writeln!(out, "{}", r.remediation.trim());
            }
            if include_evidence {
                if let Some(ev) = r.evidence.as_ref().filter(|e| !e.is_empty()) {
                    let _ = writeln!(out, "- evidence:");
                    for (key, value) in ev.iter() {
                        let _ = writeln!(out, "  - {key}: `{value}`");
                    }
                }
            }
        }
    }

    let _ = writeln!(out);
    out
}
