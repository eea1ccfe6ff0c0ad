use std::time::Duration;

use anyhow::{Context, Result};

use super::{ProbeContext, require_macos, truncate_chars};
use crate::core::{Evidence, ProbeDefinition, Severity};
use crate::platform;
use crate::probe::{Probe, ProbeOutcome};

const UPDATES_BUDGET: Duration = Duration::from_secs(30);
const FDESETUP_BUDGET: Duration = Duration::from_secs(10);

pub struct SoftwareUpdatesProbe {
    def: ProbeDefinition,
    timeout: Duration,
}

impl SoftwareUpdatesProbe {
    pub fn new(ctx: &ProbeContext) -> Self {
        let def = ProbeDefinition::new(
            "CIS-1.1",
            "Ensure All Apple-Provided Software Is Current",
            "Software updates often contain security patches for known vulnerabilities",
            "System Updates",
            Severity::High,
        )
        .with_frameworks(["CIS_macOS_14", "NIST_CSF_PR.IP-12", "ISO27001_A.12.6.1"])
        .with_remediation(
            "Open System Settings > General > Software Update and install all available \
             updates, or run `sudo softwareupdate -ia --restart`. Enable automatic \
             installation of security responses.",
        );
        Self {
            def,
            timeout: ctx.budget(UPDATES_BUDGET),
        }
    }
}

impl Probe for SoftwareUpdatesProbe {
    fn definition(&self) -> &ProbeDefinition {
        &self.def
    }

    fn check(&self) -> Result<ProbeOutcome> {
        if let Some(na) = require_macos() {
            return Ok(na);
        }
        let output = platform::run_command("softwareupdate", &["-l"], self.timeout)
            .context("could not list software updates")?;
        // softwareupdate reports "No new software available." on stderr.
        Ok(evaluate_updates(&output.combined()))
    }
}

pub(crate) fn evaluate_updates(output: &str) -> ProbeOutcome {
    let lower = output.to_ascii_lowercase();
    if lower.contains("no new software available") || lower.contains("no updates available") {
        return ProbeOutcome::pass("System is up to date, no pending updates").with_evidence(
            Evidence::new()
                .with("updates_available", 0)
                .with("output", truncate_chars(output.trim(), 200)),
        );
    }

    let updates = parse_update_labels(output);
    if updates.is_empty() {
        return ProbeOutcome::warning(
            "Could not determine whether updates are pending",
            "Update status is unknown; known vulnerabilities may remain unpatched",
        )
        .with_evidence(Evidence::new().with("output", truncate_chars(output.trim(), 200)));
    }

    let has_security_updates = updates
        .iter()
        .any(|u| u.to_ascii_lowercase().contains("security"));
    let finding = if has_security_updates {
        format!("{} update(s) available, including security updates", updates.len())
    } else {
        format!("{} update(s) available", updates.len())
    };
    ProbeOutcome::fail(
        finding,
        "Outdated software may contain known vulnerabilities that attackers can exploit",
    )
    .with_evidence(
        Evidence::new()
            .with("updates_available", updates.len())
            .with("updates", updates.iter().take(5).cloned().collect::<Vec<_>>())
            .with("has_security_updates", has_security_updates),
    )
}

/// Update names from `softwareupdate -l`: `* Label: <name>` entries, or bare
/// `* <name>` lines on older releases.
pub(crate) fn parse_update_labels(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with('*') || line.starts_with("Label:"))
        .filter_map(|line| {
            let name = match line.split_once(':') {
                Some((_, rest)) => rest.trim(),
                None => line.trim_start_matches(['*', ' ']).trim(),
            };
            (!name.is_empty()).then(|| name.to_string())
        })
        .collect()
}

pub struct FileVaultProbe {
    def: ProbeDefinition,
    timeout: Duration,
}

impl FileVaultProbe {
    pub fn new(ctx: &ProbeContext) -> Self {
        let def = ProbeDefinition::new(
            "CIS-2.6.1",
            "Ensure FileVault Is Enabled",
            "FileVault provides full disk encryption to protect data at rest",
            "Data Protection",
            Severity::Critical,
        )
        .with_frameworks([
            "CIS_macOS_14",
            "NIST_CSF_PR.DS-1",
            "ISO27001_A.10.1.1",
            "PCI_DSS_3.4",
        ])
        .with_remediation(
            "Open System Settings > Privacy & Security > FileVault and click \"Turn On \
             FileVault\" (or run `sudo fdesetup enable`). Store the recovery key somewhere \
             safe and restart to begin encryption.",
        );
        Self {
            def,
            timeout: ctx.budget(FDESETUP_BUDGET),
        }
    }
}

impl Probe for FileVaultProbe {
    fn definition(&self) -> &ProbeDefinition {
        &self.def
    }

    fn check(&self) -> Result<ProbeOutcome> {
        if let Some(na) = require_macos() {
            return Ok(na);
        }
        let output = platform::run_command("fdesetup", &["status"], self.timeout)
            .context("could not query FileVault status")?;
        Ok(evaluate_filevault(output.stdout.trim()))
    }
}

pub(crate) fn evaluate_filevault(status: &str) -> ProbeOutcome {
    if status.contains("FileVault is On") {
        ProbeOutcome::pass("FileVault disk encryption is enabled").with_evidence(
            Evidence::new()
                .with("filevault_enabled", true)
                .with("status", status),
        )
    } else if status.contains("FileVault is Off") {
        ProbeOutcome::fail(
            "FileVault disk encryption is DISABLED",
            "Data at rest is not encrypted. If the device is lost or stolen, all data is accessible.",
        )
        .with_evidence(
            Evidence::new()
                .with("filevault_enabled", false)
                .with("status", status),
        )
    } else if status.contains("Encryption in progress") {
        ProbeOutcome::warning(
            "FileVault encryption is in progress",
            "Encryption is being applied but is not yet complete",
        )
        .with_evidence(
            Evidence::new()
                .with("filevault_enabled", true)
                .with("encryption_in_progress", true)
                .with("status", status),
        )
    } else {
        ProbeOutcome::warning(
            "FileVault status unclear",
            "Unable to determine disk encryption status",
        )
        .with_evidence(Evidence::new().with("status", status))
    }
}
