use anyhow::Error;
use std::io::{self, Write};
use unicode_width::UnicodeWidthChar;

use crate::core::{CheckResult, CheckStatus, ProbeDefinition, Severity};
use crate::scoring::{ScanStats, ScoreBand, group_by_category, score_band};

#[derive(Debug, Clone)]
pub struct UiConfig {
    pub color: bool,
    pub stdin_is_tty: bool,
    pub stdout_is_tty: bool,
    pub stderr_is_tty: bool,
    pub max_table_rows: usize,
    pub quiet: bool,
    pub verbose: bool,
}

pub fn eprintln_error(err: &Error) {
    let mut stderr = io::stderr().lock();
    let _ = writeln!(stderr, "error:");
    let _ = writeln!(stderr, "  {err}");

    let mut causes = err.chain().skip(1).peekable();
    if causes.peek().is_some() {
        let _ = writeln!(stderr, "caused by:");
        for cause in causes {
            let _ = writeln!(stderr, "  - {cause}");
        }
    }

    let _ = writeln!(stderr, "next:");
    let _ = writeln!(stderr, "  - re-run with `--verbose` for more detail");
    let _ = writeln!(
        stderr,
        "  - see `complianceguard --help` for available commands and options"
    );
}

pub fn print_scan(results: &[CheckResult], stats: &ScanStats, cfg: &UiConfig) {
    if cfg.quiet {
        return;
    }
    let mut out = io::stdout().lock();
    write_scan(&mut out, results, stats, cfg);
}

pub(crate) fn write_scan(
    out: &mut dyn Write,
    results: &[CheckResult],
    stats: &ScanStats,
    cfg: &UiConfig,
) {
    write_summary(out, stats, cfg.color);
    if results.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "No checks were run.");
        return;
    }

    let rows = cfg.max_table_rows.max(1);
    for group in group_by_category(results) {
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "{} ({}/{} passed)",
            group.category,
            group.passed(),
            group.results.len()
        );
        write_results_table(out, &group.results, rows, cfg.color);
        if group.results.len() > rows {
            let _ = writeln!(out, "  ... ({} more)", group.results.len() - rows);
        }
    }

    let failed: Vec<&CheckResult> = results
        .iter()
        .filter(|r| r.status == CheckStatus::Fail)
        .collect();
    if !failed.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Failed controls:");
        for r in failed {
            let _ = writeln!(
                out,
                "- {} [{}] {}",
                r.id,
                format_severity(r.severity, cfg.color),
                r.title
            );
            let _ = writeln!(out, "  risk: {}", r.risk);
            if let Some(first) = r.remediation.lines().map(str::trim).find(|l| !l.is_empty()) {
                let _ = writeln!(out, "  fix:  {}", truncate_middle(first, 160));
            }
        }
    }

    let faults = results.iter().filter(|r| r.is_fault()).count();
    if faults > 0 {
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "{faults} check(s) could not run; see `complianceguard check <key>` for details."
        );
    }
}

fn write_summary(out: &mut dyn Write, stats: &ScanStats, color: bool) {
    let _ = writeln!(
        out,
        "Compliance score: {}  ({} total, {} passed, {} failed, {} warnings, {} errors, {} n/a)",
        format_score(stats.compliance_score, color),
        stats.total,
        stats.passed,
        stats.failed,
        stats.warnings,
        stats.errors,
        stats.not_applicable
    );
}

fn write_results_table(out: &mut dyn Write, results: &[&CheckResult], rows: usize, color: bool) {
    let label_status = "STATUS";
    let label_severity = "SEVERITY";
    let label_id = "ID";
    let label_title = "TITLE";

    let status_w = results
        .iter()
        .take(rows)
        .map(|r| visible_width_ansi(&status_label(r.status)))
        .max()
        .unwrap_or(0)
        .max(visible_width_ansi(label_status));
    let severity_w = visible_width_ansi(label_severity);
    let id_w = results
        .iter()
        .take(rows)
        .map(|r| visible_width_ansi(&r.id))
        .max()
        .unwrap_or(0)
        .max(label_id.len());

    let _ = writeln!(
        out,
        "  {}  {}  {}  {}",
        pad_end_display(label_status, status_w),
        pad_end_display(label_severity, severity_w),
        pad_end_display(label_id, id_w),
        label_title
    );
    let _ = writeln!(
        out,
        "  {}  {}  {}  {}",
        "-".repeat(status_w),
        "-".repeat(severity_w),
        "-".repeat(id_w),
        "-".repeat(label_title.len())
    );
    for r in results.iter().take(rows) {
        let status = pad_end_ansi(&format_status(r.status, color), status_w);
        let severity = pad_end_ansi(&format_severity(r.severity, color), severity_w);
        let id = pad_end_display(&r.id, id_w);
        let _ = writeln!(out, "  {status}  {severity}  {id}  {}", r.title);
        let _ = writeln!(
            out,
            "  {}  {}",
            " ".repeat(status_w + severity_w + id_w + 4),
            truncate_middle(&r.finding, 120)
        );
    }
}

/// Full record for a single result, as printed by `check`.
pub fn print_result(result: &CheckResult, cfg: &UiConfig) {
    if cfg.quiet {
        return;
    }
    let mut out = io::stdout().lock();
    write_result(&mut out, result, cfg.color);
}

pub(crate) fn write_result(out: &mut dyn Write, r: &CheckResult, color: bool) {
    let _ = writeln!(out, "{} {}", format_status(r.status, color), r.title);
    let _ = writeln!(out, "  id:         {}", r.id);
    let _ = writeln!(out, "  category:   {}", r.category);
    let _ = writeln!(out, "  severity:   {}", format_severity(r.severity, color));
    if !r.compliance_frameworks.is_empty() {
        let _ = writeln!(out, "  frameworks: {}", r.compliance_frameworks.join(", "));
    }
    let _ = writeln!(out, "  checked at: {}", r.timestamp);
    let _ = writeln!(out, "  finding:    {}", r.finding);
    if !r.risk.is_empty() {
        let _ = writeln!(out, "  risk:       {}", r.risk);
    }
    if let Some(err) = &r.error {
        let _ = writeln!(out, "  error:      {err}");
    }
    if let Some(ev) = r.evidence.as_ref().filter(|e| !e.is_empty()) {
        let _ = writeln!(out, "  evidence:");
        for (key, value) in ev.iter() {
            let _ = writeln!(out, "    {key}: {value}");
        }
    }
    let remediation = r.remediation.trim();
    if r.status != CheckStatus::Pass && !remediation.is_empty() {
        let _ = writeln!(out, "  remediation:");
        for line in remediation.lines() {
            let _ = writeln!(out, "    {}", line.trim());
        }
    }
}

/// Registered probes for `list`.
pub fn print_probe_list(probes: &[(&str, &ProbeDefinition)], cfg: &UiConfig) {
    if cfg.quiet {
        return;
    }
    let key_w = probes
        .iter()
        .map(|(k, _)| visible_width_ansi(k))
        .max()
        .unwrap_or(0)
        .max(3);
    let id_w = probes
        .iter()
        .map(|(_, d)| visible_width_ansi(&d.id))
        .max()
        .unwrap_or(0)
        .max(2);
    let sev_w = "SEVERITY".len();

    let mut out = io::stdout().lock();
    let _ = writeln!(
        out,
        "{}  {}  {}  {}  TITLE",
        pad_end_display("KEY", key_w),
        pad_end_display("ID", id_w),
        pad_end_display("SEVERITY", sev_w),
        pad_end_display("CATEGORY", 16),
    );
    for (key, def) in probes {
        let _ = writeln!(
            out,
            "{}  {}  {}  {}  {}",
            pad_end_display(key, key_w),
            pad_end_display(&def.id, id_w),
            pad_end_ansi(&format_severity(def.severity, cfg.color), sev_w),
            pad_end_display(&def.category, 16),
            def.title
        );
        if cfg.verbose {
            let _ = writeln!(out, "    {}", def.description);
            if !def.compliance_frameworks.is_empty() {
                let _ = writeln!(out, "    frameworks: {}", def.compliance_frameworks.join(", "));
            }
        }
    }
}

pub fn status_icon(status: CheckStatus) -> &'static str {
    match status {
        CheckStatus::Pass => "✔",
        CheckStatus::Fail => "✘",
        CheckStatus::Warning => "!",
        CheckStatus::Error => "?",
        CheckStatus::NotApplicable => "-",
    }
}

fn status_label(status: CheckStatus) -> String {
    format!("{} {}", status_icon(status), status.as_str())
}

fn format_status(status: CheckStatus, color: bool) -> String {
    let s = status_label(status);
    if !color {
        return s;
    }
    let code = match status {
        CheckStatus::Pass => "32",
        CheckStatus::Fail => "31",
        CheckStatus::Warning => "33",
        CheckStatus::Error => "35",
        CheckStatus::NotApplicable => "90",
    };
    format!("\x1b[{code}m{s}\x1b[0m")
}

fn format_severity(severity: Severity, color: bool) -> String {
    let s = severity.as_str();
    if !color {
        return s.to_string();
    }
    let code = match severity {
        Severity::Critical => "1;31",
        Severity::High => "31",
        Severity::Medium => "33",
        Severity::Low => "36",
        Severity::Info => "90",
    };
    format!("\x1b[{code}m{s}\x1b[0m")
}

pub fn format_score(score: f64, color: bool) -> String {
    let s = format!("{score:.1}%");
    if !color {
        return s;
    }
    let code = match score_band(score) {
        ScoreBand::Good => "32",
        ScoreBand::Fair => "92",
        ScoreBand::Moderate => "33",
        ScoreBand::Poor => "91",
        ScoreBand::Critical => "31",
    };
    format!("\x1b[1;{code}m{s}\x1b[0m")
}

pub(crate) fn truncate_middle(s: &str, max_chars: usize) -> String {
    let len = s.chars().count();
    if len <= max_chars {
        return s.to_string();
    }

    let keep = max_chars.saturating_sub(3);
    let left = keep / 2;
    let right = keep.saturating_sub(left);

    let prefix: String = s.chars().take(left).collect();
    let suffix: String = s.chars().skip(len - right).collect();
    format!("{prefix}...{suffix}")
}

fn pad_end_ansi(s: &str, width: usize) -> String {
    let w = visible_width_ansi(s);
    if w >= width {
        return s.to_string();
    }
    format!("{s}{}", " ".repeat(width - w))
}

fn pad_end_display(s: &str, width: usize) -> String {
    pad_end_ansi(s, width)
}

pub(crate) fn visible_width_ansi(s: &str) -> usize {
    let mut width: usize = 0;
    let mut chars = s.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\x1b' && chars.peek() == Some(&'[') {
            let _ = chars.next();
            for ch2 in chars.by_ref() {
                if ch2 == 'm' {
                    break;
                }
            }
            continue;
        }
        width = width.saturating_add(UnicodeWidthChar::width(ch).unwrap_or(0));
    }
    width
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::NotApplicablePolicy;

    fn cfg() -> UiConfig {
        UiConfig {
            color: false,
            stdin_is_tty: false,
            stdout_is_tty: false,
            stderr_is_tty: false,
            max_table_rows: 20,
            quiet: false,
            verbose: false,
        }
    }

    fn result(id: &str, category: &str, status: CheckStatus) -> CheckResult {
        CheckResult {
            id: id.to_string(),
            title: format!("Title {id}"),
            description: String::new(),
            category: category.to_string(),
            severity: Severity::High,
            compliance_frameworks: vec![],
            status,
            finding: format!("finding {id}"),
            evidence: None,
            risk: if status == CheckStatus::Fail {
                "exposed".to_string()
            } else {
                String::new()
            },
            remediation: "Step one\nStep two".to_string(),
            timestamp: "2026-01-01T00:00:00Z".to_string(),
            error: None,
        }
    }

    fn render(results: &[CheckResult]) -> String {
        let stats = ScanStats::from_results(results, NotApplicablePolicy::Include);
        let mut buf = Vec::new();
        write_scan(&mut buf, results, &stats, &cfg());
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn ansi_sequences_have_no_width() {
        assert_eq!(visible_width_ansi("\x1b[31mFAIL\x1b[0m"), 4);
        assert_eq!(visible_width_ansi("日本 ok"), 7);
    }

    #[test]
    fn colored_score_follows_band() {
        assert_eq!(format_score(85.04, false), "85.0%");
        assert!(format_score(85.0, true).starts_with("\x1b[1;32m"));
        assert!(format_score(10.0, true).starts_with("\x1b[1;31m"));
    }

    #[test]
    fn scan_output_groups_by_category_and_lists_failures() {
        let text = render(&[
            result("A", "Network Security", CheckStatus::Pass),
            result("B", "Data Protection", CheckStatus::Fail),
            result("C", "Network Security", CheckStatus::Warning),
        ]);
        assert!(text.starts_with("Compliance score: 33.3%"), "{text}");
        let net = text.find("Network Security (1/2 passed)").expect("net");
        let data = text.find("Data Protection (0/1 passed)").expect("data");
        assert!(net < data);
        assert!(text.contains("Failed controls:\n- B [HIGH] Title B\n  risk: exposed\n  fix:  Step one\n"));
    }

    #[test]
    fn empty_scan_says_so() {
        let text = render(&[]);
        assert!(text.contains("Compliance score: 0.0%"));
        assert!(text.contains("No checks were run."));
    }

    #[test]
    fn result_detail_shows_error_and_remediation() {
        let mut r = result("X", "Access Control", CheckStatus::Error);
        r.error = Some("timed out after 10s: fdesetup".to_string());
        let mut buf = Vec::new();
        write_result(&mut buf, &r, false);
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("? ERROR Title X\n"));
        assert!(text.contains("  error:      timed out after 10s: fdesetup\n"));
        assert!(text.contains("  remediation:\n    Step one\n    Step two\n"));
    }

    #[test]
    fn only_intercepted_faults_are_reported_as_not_run() {
        let mut fault = result("F", "Data Protection", CheckStatus::Error);
        fault.error = Some("command not found".to_string());
        let verdict = result("V", "Data Protection", CheckStatus::Error);

        let text = render(&[fault, verdict.clone()]);
        assert!(text.contains("1 check(s) could not run;"), "{text}");

        let text = render(&[verdict]);
        assert!(text.contains("1 errors, 0 n/a)"), "{text}");
        assert!(!text.contains("could not run"), "{text}");
    }

    #[test]
    fn truncate_middle_keeps_both_ends() {
        assert_eq!(truncate_middle("abcdefghij", 7), "ab...ij");
        assert_eq!(truncate_middle("short", 10), "short");
    }
}
