use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};

use super::{ProbeContext, require_macos, truncate_chars};
use crate::core::{Evidence, ProbeDefinition, Severity};
use crate::platform;
use crate::probe::{Probe, ProbeOutcome};

const SOCKETFILTERFW: &str = "/usr/libexec/ApplicationFirewall/socketfilterfw";
const COMMAND_BUDGET: Duration = Duration::from_secs(10);

pub struct FirewallProbe {
    def: ProbeDefinition,
    timeout: Duration,
}

impl FirewallProbe {
    pub fn new(ctx: &ProbeContext) -> Self {
        let def = ProbeDefinition::new(
            "CIS-2.1.1",
            "Ensure Firewall Is Enabled",
            "The macOS Application Firewall protects against network-based attacks",
            "Network Security",
            Severity::High,
        )
        .with_frameworks(["CIS_macOS_14", "NIST_CSF_PR.AC-5", "ISO27001_A.13.1.1"])
        .with_remediation(
            "Open System Settings > Network > Firewall and turn the firewall on, or run \
             `sudo /usr/libexec/ApplicationFirewall/socketfilterfw --setglobalstate on`.",
        );
        Self {
            def,
            timeout: ctx.budget(COMMAND_BUDGET),
        }
    }
}

impl Probe for FirewallProbe {
    fn definition(&self) -> &ProbeDefinition {
        &self.def
    }

    fn check(&self) -> Result<ProbeOutcome> {
        if let Some(na) = require_macos() {
            return Ok(na);
        }
        let state = platform::run_command(SOCKETFILTERFW, &["--getglobalstate"], self.timeout)
            .context("could not query firewall state")?;
        if !firewall_enabled(&state.stdout) {
            return Ok(evaluate_firewall(&state.stdout, None));
        }
        // Stealth mode is informational; a failed query leaves it unknown.
        let stealth = platform::run_command(SOCKETFILTERFW, &["--getstealthmode"], self.timeout)
            .ok()
            .map(|out| stealth_enabled(&out.stdout));
        Ok(evaluate_firewall(&state.stdout, stealth))
    }
}

fn firewall_enabled(state: &str) -> bool {
    state.to_ascii_lowercase().contains("enabled")
}

fn stealth_enabled(output: &str) -> bool {
    let lower = output.to_ascii_lowercase();
    lower.contains("enabled") || lower.contains("mode is on")
}

pub(crate) fn evaluate_firewall(state: &str, stealth: Option<bool>) -> ProbeOutcome {
    if firewall_enabled(state) {
        let mut evidence = Evidence::new().with("firewall_enabled", true);
        if let Some(stealth) = stealth {
            evidence.insert("stealth_mode", stealth);
        }
        evidence.insert("output", state.trim());
        return ProbeOutcome::pass("Firewall is enabled").with_evidence(evidence);
    }

    ProbeOutcome::fail(
        "Firewall is DISABLED",
        "System is exposed to network-based attacks; unsolicited inbound connections are accepted",
    )
    .with_evidence(
        Evidence::new()
            .with("firewall_enabled", false)
            .with("output", state.trim()),
    )
}

pub struct SshProbe {
    def: ProbeDefinition,
    timeout: Duration,
    config_path: PathBuf,
}

impl SshProbe {
    pub fn new(ctx: &ProbeContext) -> Self {
        let def = ProbeDefinition::new(
            "CIS-4.2",
            "Ensure SSH Server Is Configured Securely",
            "Remote Login should be disabled when not needed, or hardened when required",
            "Network Security",
            Severity::High,
        )
        .with_frameworks(["CIS_macOS_14", "NIST_CSF_PR.AC-4", "ISO27001_A.13.1.1"])
        .with_remediation(
            "If SSH is not needed, turn off System Settings > General > Sharing > Remote \
             Login. Otherwise set `PermitRootLogin no`, `PasswordAuthentication no` and \
             `PermitEmptyPasswords no` in /etc/ssh/sshd_config and restart sshd.",
        );
        Self {
            def,
            timeout: ctx.budget(COMMAND_BUDGET),
            config_path: ctx.sshd_config_path.clone(),
        }
    }
}

impl Probe for SshProbe {
    fn definition(&self) -> &ProbeDefinition {
        &self.def
    }

    fn check(&self) -> Result<ProbeOutcome> {
        if let Some(na) = require_macos() {
            return Ok(na);
        }
        let output = platform::run_command("systemsetup", &["-getremotelogin"], self.timeout)
            .context("could not query Remote Login state")?;
        let text = output.combined();

        match parse_remote_login(&text) {
            RemoteLogin::NeedsAdmin => Ok(ProbeOutcome::warning(
                "Insufficient permissions to read Remote Login state (run with sudo)",
                "Unable to verify SSH exposure",
            )
            .with_evidence(Evidence::new().with("output", truncate_chars(text.trim(), 200)))),
            RemoteLogin::Off => Ok(ProbeOutcome::pass(
                "SSH Remote Login is disabled",
            )
            .with_evidence(
                Evidence::new()
                    .with("ssh_enabled", false)
                    .with("status", text.trim()),
            )),
            RemoteLogin::On => evaluate_sshd_config_file(&self.config_path),
            RemoteLogin::Unknown => Err(anyhow!(
                "unexpected systemsetup output: {}",
                truncate_chars(text.trim(), 120)
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RemoteLogin {
    On,
    Off,
    NeedsAdmin,
    Unknown,
}

pub(crate) fn parse_remote_login(output: &str) -> RemoteLogin {
    let lower = output.to_ascii_lowercase();
    if lower.contains("administrator access") {
        RemoteLogin::NeedsAdmin
    } else if lower.contains("remote login: on") {
        RemoteLogin::On
    } else if lower.contains("remote login: off") {
        RemoteLogin::Off
    } else {
        RemoteLogin::Unknown
    }
}

fn evaluate_sshd_config_file(path: &Path) -> Result<ProbeOutcome> {
    if !path.exists() {
        return Ok(ProbeOutcome::warning(
            "SSH is enabled but its configuration file was not found",
            "Unable to verify SSH security configuration",
        )
        .with_evidence(
            Evidence::new()
                .with("ssh_enabled", true)
                .with("config_path", path.display().to_string())
                .with("config_found", false),
        ));
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(evaluate_sshd_config(&content))
}

/// Value of the first occurrence of `keyword`, as sshd itself resolves it.
/// Comments are skipped and parsing stops at the first `Match` block.
pub(crate) fn sshd_option<'a>(config: &'a str, keyword: &str) -> Option<&'a str> {
    for line in config.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (key, value) = match line.split_once(|c: char| c.is_whitespace() || c == '=') {
            Some((k, v)) => (k, v.trim_start_matches(|c: char| c.is_whitespace() || c == '=')),
            None => (line, ""),
        };
        if key.eq_ignore_ascii_case("match") {
            return None;
        }
        if key.eq_ignore_ascii_case(keyword) {
            return value.split_whitespace().next();
        }
    }
    None
}

pub(crate) fn evaluate_sshd_config(config: &str) -> ProbeOutcome {
    const INSECURE: [(&str, &str); 3] = [
        ("PermitRootLogin", "Root login is permitted"),
        (
            "PasswordAuthentication",
            "Password authentication is enabled (keys recommended)",
        ),
        ("PermitEmptyPasswords", "Empty passwords are permitted"),
    ];

    let issues: Vec<&str> = INSECURE
        .iter()
        .filter(|(keyword, _)| {
            sshd_option(config, keyword).is_some_and(|v| v.eq_ignore_ascii_case("yes"))
        })
        .map(|(_, issue)| *issue)
        .collect();

    let evidence = Evidence::new()
        .with("ssh_enabled", true)
        .with("issues", issues.clone())
        .with("config_checked", true);

    if issues.is_empty() {
        return ProbeOutcome::pass("SSH is enabled with a secure configuration")
            .with_evidence(evidence);
    }
    ProbeOutcome::fail(
        format!("SSH is enabled with {} security issue(s)", issues.len()),
        "SSH configuration allows insecure practices that could lead to unauthorized access",
    )
    .with_evidence(evidence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CheckStatus;
    use serde_json::json;

    #[test]
    fn firewall_enabled_passes_with_stealth_evidence() {
        let outcome = evaluate_firewall("Firewall is enabled. (State = 1)\n", Some(true));
        assert_eq!(outcome.status, CheckStatus::Pass);
        let ev = outcome.evidence.unwrap();
        assert_eq!(ev.get("stealth_mode"), Some(&json!(true)));
        let keys: Vec<&str> = ev.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["firewall_enabled", "stealth_mode", "output"]);
    }

    #[test]
    fn firewall_disabled_fails() {
        let outcome = evaluate_firewall("Firewall is disabled. (State = 0)", None);
        assert_eq!(outcome.status, CheckStatus::Fail);
        assert!(!outcome.risk.is_empty());
        assert!(outcome.evidence.unwrap().get("stealth_mode").is_none());
    }

    #[test]
    fn stealth_mode_wording_variants() {
        assert!(stealth_enabled("Stealth mode enabled"));
        assert!(stealth_enabled("Firewall stealth mode is on"));
        assert!(!stealth_enabled("Firewall stealth mode is off"));
    }

    #[test]
    fn remote_login_states() {
        assert_eq!(parse_remote_login("Remote Login: On\n"), RemoteLogin::On);
        assert_eq!(parse_remote_login("Remote Login: Off\n"), RemoteLogin::Off);
        assert_eq!(
            parse_remote_login("You need administrator access to run this tool... exiting!"),
            RemoteLogin::NeedsAdmin
        );
        assert_eq!(parse_remote_login(""), RemoteLogin::Unknown);
    }

    #[test]
    fn sshd_option_honours_first_directive_and_comments() {
        let cfg = "# PermitRootLogin yes\n\
                   PermitRootLogin no\n\
                   PermitRootLogin yes\n\
                   passwordauthentication=yes\n\
                   Match User guest\n\
                   \tPermitEmptyPasswords yes\n";
        assert_eq!(sshd_option(cfg, "PermitRootLogin"), Some("no"));
        assert_eq!(sshd_option(cfg, "PasswordAuthentication"), Some("yes"));
        assert_eq!(sshd_option(cfg, "PermitEmptyPasswords"), None);
    }

    #[test]
    fn insecure_sshd_config_fails_with_issue_list() {
        let outcome = evaluate_sshd_config("PermitRootLogin yes\nPermitEmptyPasswords YES\n");
        assert_eq!(outcome.status, CheckStatus::Fail);
        assert_eq!(
            outcome.finding.as_deref(),
            Some("SSH is enabled with 2 security issue(s)")
        );
        let issues = outcome.evidence.unwrap().get("issues").cloned().unwrap();
        assert_eq!(
            issues,
            json!(["Root login is permitted", "Empty passwords are permitted"])
        );
    }

    #[test]
    fn hardened_or_default_sshd_config_passes() {
        let outcome = evaluate_sshd_config("#PermitRootLogin prohibit-password\nPasswordAuthentication no\n");
        assert_eq!(outcome.status, CheckStatus::Pass);
    }

    #[test]
    fn missing_sshd_config_is_a_warning() {
        let outcome =
            evaluate_sshd_config_file(Path::new("/nonexistent/complianceguard/sshd_config"))
                .expect("missing file is not a fault");
        assert_eq!(outcome.status, CheckStatus::Warning);
        assert_eq!(
            outcome.evidence.unwrap().get("config_found"),
            Some(&json!(false))
        );
    }
}
