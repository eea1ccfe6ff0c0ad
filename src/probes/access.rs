use std::time::Duration;

use anyhow::{Context, Result};

use super::{ProbeContext, require_macos};
use crate::core::{Evidence, ProbeDefinition, Severity};
use crate::platform::{self, CommandOutput};
use crate::probe::{Probe, ProbeOutcome};

const DEFAULTS_BUDGET: Duration = Duration::from_secs(10);

pub struct ScreenLockProbe {
    def: ProbeDefinition,
    timeout: Duration,
    max_idle_secs: u64,
}

impl ScreenLockProbe {
    pub fn new(ctx: &ProbeContext) -> Self {
        let max_minutes = ctx.screen_lock_max_idle_secs.div_ceil(60);
        let def = ProbeDefinition::new(
            "CIS-5.9",
            format!("Ensure Screen Lock Timeout is Set to {max_minutes} Minutes or Less"),
            "Automatic screen lock prevents unauthorized access while the user is away",
            "Access Control",
            Severity::Medium,
        )
        .with_frameworks(["CIS_macOS_14", "NIST_CSF_PR.AC-7", "ISO27001_A.11.2.8"])
        .with_remediation(format!(
            "Open System Settings > Lock Screen, set \"Start Screen Saver when inactive\" to \
             {max_minutes} minutes or less and require a password immediately after the \
             screen saver begins."
        ));
        Self {
            def,
            timeout: ctx.budget(DEFAULTS_BUDGET),
            max_idle_secs: ctx.screen_lock_max_idle_secs,
        }
    }
}

impl Probe for ScreenLockProbe {
    fn definition(&self) -> &ProbeDefinition {
        &self.def
    }

    fn check(&self) -> Result<ProbeOutcome> {
        if let Some(na) = require_macos() {
            return Ok(na);
        }
        let output = platform::run_command_invoking_user(
            "defaults",
            &["read", "com.apple.screensaver", "idleTime"],
            self.timeout,
        )
        .context("could not read screen saver preferences")?;
        evaluate_screen_lock(&output, self.max_idle_secs)
    }
}

/// Verdict for `defaults read com.apple.screensaver idleTime`. An unparsable
/// value is a fault, not a verdict.
pub(crate) fn evaluate_screen_lock(output: &CommandOutput, max_idle_secs: u64) -> Result<ProbeOutcome> {
    if !output.success() {
        return Ok(ProbeOutcome::warning(
            "Screen lock timeout setting not found (system default may apply)",
            "Unable to verify screen lock timeout configuration",
        )
        .with_evidence(
            Evidence::new()
                .with("configured", false)
                .with("error", output.stderr.trim()),
        ));
    }

    let raw = output.stdout.trim();
    let idle_secs: i64 = raw
        .parse()
        .with_context(|| format!("could not parse screen lock timeout value: {raw:?}"))?;
    let max_minutes = max_idle_secs.div_ceil(60);

    if idle_secs <= 0 {
        return Ok(ProbeOutcome::fail(
            "Screen lock timeout is not configured (set to never)",
            "Screen never locks automatically, allowing unauthorized access",
        )
        .with_evidence(
            Evidence::new()
                .with("timeout_seconds", idle_secs)
                .with("configured", false),
        ));
    }

    let idle_minutes = idle_secs as f64 / 60.0;
    let evidence = Evidence::new()
        .with("timeout_seconds", idle_secs)
        .with("timeout_minutes", (idle_minutes * 10.0).round() / 10.0)
        .with("recommended_max_seconds", max_idle_secs);

    if idle_secs as u64 <= max_idle_secs {
        Ok(ProbeOutcome::pass(format!(
            "Screen lock timeout is {idle_minutes:.0} minutes (within the recommended {max_minutes} minutes)"
        ))
        .with_evidence(evidence))
    } else {
        Ok(ProbeOutcome::fail(
            format!(
                "Screen lock timeout is {idle_minutes:.0} minutes (exceeds the recommended {max_minutes} minutes)"
            ),
            "A long timeout leaves an unattended workstation open to unauthorized access",
        )
        .with_evidence(evidence))
    }
}
