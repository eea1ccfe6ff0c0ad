//! Probe contract and the execution wrapper that isolates probe faults.
//!
//! A probe reads ambient system state and returns a partial [`ProbeOutcome`].
//! [`run_probe`] turns whatever happens inside [`Probe::check`] (a verdict, an
//! error, or a panic) into exactly one [`CheckResult`].

use std::panic::{self, AssertUnwindSafe};

use anyhow::Result;
use tracing::{debug, warn};

use crate::core::{
    CheckResult, CheckStatus, DEFAULT_FINDING, Evidence, FAULT_FINDING, ProbeDefinition,
    timestamp_now,
};

/// A single pluggable control check.
pub trait Probe: Send + Sync {
    fn definition(&self) -> &ProbeDefinition;

    /// Inspect the system and classify it. Faults may simply be returned;
    /// the caller converts them into an `ERROR` result.
    fn check(&self) -> Result<ProbeOutcome>;
}

/// What a probe reports back. `remediation` falls back to the definition's
/// default when `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    pub status: CheckStatus,
    pub finding: Option<String>,
    pub evidence: Option<Evidence>,
    pub risk: String,
    pub remediation: Option<String>,
}

impl ProbeOutcome {
    pub fn new(status: CheckStatus, finding: impl Into<String>) -> Self {
        Self {
            status,
            finding: Some(finding.into()),
            evidence: None,
            risk: String::new(),
            remediation: None,
        }
    }

    pub fn pass(finding: impl Into<String>) -> Self {
        Self::new(CheckStatus::Pass, finding)
    }

    pub fn fail(finding: impl Into<String>, risk: impl Into<String>) -> Self {
        Self::new(CheckStatus::Fail, finding).with_risk(risk)
    }

    pub fn warning(finding: impl Into<String>, risk: impl Into<String>) -> Self {
        Self::new(CheckStatus::Warning, finding).with_risk(risk)
    }

    /// Indeterminate state the probe detected itself; `finding` doubles as the
    /// error description.
    pub fn error(finding: impl Into<String>) -> Self {
        Self::new(CheckStatus::Error, finding)
    }

    pub fn not_applicable(finding: impl Into<String>) -> Self {
        Self::new(CheckStatus::NotApplicable, finding)
    }

    pub fn with_evidence(mut self, evidence: Evidence) -> Self {
        self.evidence = Some(evidence);
        self
    }

    pub fn with_risk(mut self, risk: impl Into<String>) -> Self {
        self.risk = risk.into();
        self
    }

    pub fn with_remediation(mut self, remediation: impl Into<String>) -> Self {
        self.remediation = Some(remediation.into());
        self
    }
}

/// Execute one probe. Never panics and never returns an error.
pub fn run_probe(probe: &dyn Probe) -> CheckResult {
    let def = probe.definition();
    debug!(probe = %def.id, "running probe");

    let outcome = match panic::catch_unwind(AssertUnwindSafe(|| probe.check())) {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(err)) => {
            let message = format!("{err:#}");
            warn!(probe = %def.id, error = %message, "probe failed");
            return fault_result(def, message);
        }
        Err(payload) => {
            let message = format!("probe panicked: {}", panic_message(payload.as_ref()));
            warn!(probe = %def.id, error = %message, "probe panicked");
            return fault_result(def, message);
        }
    };

    merge_outcome(def, outcome)
}

fn merge_outcome(def: &ProbeDefinition, outcome: ProbeOutcome) -> CheckResult {
    let finding = outcome
        .finding
        .filter(|f| !f.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_FINDING.to_string());

    let mut risk = outcome.risk;
    match outcome.status {
        CheckStatus::Pass => risk.clear(),
        CheckStatus::Fail if risk.trim().is_empty() => {
            debug!(probe = %def.id, "FAIL outcome without risk statement");
            risk = format!("System does not satisfy control {}: {}", def.id, def.title);
        }
        _ => {}
    }

    CheckResult {
        id: def.id.clone(),
        title: def.title.clone(),
        description: def.description.clone(),
        category: def.category.clone(),
        severity: def.severity,
        compliance_frameworks: def.compliance_frameworks.clone(),
        status: outcome.status,
        finding,
        evidence: outcome.evidence,
        risk,
        remediation: outcome
            .remediation
            .unwrap_or_else(|| def.remediation.clone()),
        timestamp: timestamp_now(),
        error: None,
    }
}

fn fault_result(def: &ProbeDefinition, message: String) -> CheckResult {
    CheckResult {
        id: def.id.clone(),
        title: def.title.clone(),
        description: def.description.clone(),
        category: def.category.clone(),
        severity: def.severity,
        compliance_frameworks: def.compliance_frameworks.clone(),
        status: CheckStatus::Error,
        finding: FAULT_FINDING.to_string(),
        evidence: None,
        risk: String::new(),
        remediation: String::new(),
        timestamp: timestamp_now(),
        error: Some(message),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        return (*s).to_string();
    }
    if let Some(s) = payload.downcast_ref::<String>() {
        return s.clone();
    }
    "unknown panic payload".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Severity;
    use anyhow::{Context, anyhow};

    struct Fixed {
        def: ProbeDefinition,
        outcome: fn() -> Result<ProbeOutcome>,
    }

    impl Probe for Fixed {
        fn definition(&self) -> &ProbeDefinition {
            &self.def
        }

        fn check(&self) -> Result<ProbeOutcome> {
            (self.outcome)()
        }
    }

    fn probe(outcome: fn() -> Result<ProbeOutcome>) -> Fixed {
        Fixed {
            def: ProbeDefinition::new(
                "T-1",
                "Test control",
                "A control used in tests",
                "Testing",
                Severity::High,
            )
            .with_frameworks(["CIS_TEST_1", "NIST_TEST"])
            .with_remediation("Default remediation"),
            outcome,
        }
    }

    #[test]
    fn pass_outcome_inherits_definition_and_default_remediation() {
        let result = run_probe(&probe(|| {
            Ok(ProbeOutcome::pass("all good").with_risk("None"))
        }));
        assert_eq!(result.id, "T-1");
        assert_eq!(result.category, "Testing");
        assert_eq!(result.severity, Severity::High);
        assert_eq!(result.compliance_frameworks, vec!["CIS_TEST_1", "NIST_TEST"]);
        assert_eq!(result.status, CheckStatus::Pass);
        assert_eq!(result.finding, "all good");
        assert_eq!(result.risk, "");
        assert_eq!(result.remediation, "Default remediation");
        assert!(result.error.is_none());
        assert!(!result.timestamp.is_empty());
    }

    #[test]
    fn outcome_remediation_overrides_default() {
        let result = run_probe(&probe(|| {
            Ok(ProbeOutcome::fail("bad", "exposed").with_remediation("Do this instead"))
        }));
        assert_eq!(result.status, CheckStatus::Fail);
        assert_eq!(result.risk, "exposed");
        assert_eq!(result.remediation, "Do this instead");
    }

    #[test]
    fn missing_finding_gets_default_text() {
        let result = run_probe(&probe(|| {
            Ok(ProbeOutcome {
                status: CheckStatus::Warning,
                finding: None,
                evidence: None,
                risk: "unclear".to_string(),
                remediation: None,
            })
        }));
        assert_eq!(result.finding, DEFAULT_FINDING);
    }

    #[test]
    fn fail_without_risk_gets_generic_statement() {
        let result = run_probe(&probe(|| Ok(ProbeOutcome::new(CheckStatus::Fail, "bad"))));
        assert!(!result.risk.is_empty());
        assert!(result.risk.contains("T-1"));
    }

    #[test]
    fn error_is_converted_to_error_result() {
        let result = run_probe(&probe(|| {
            Err(anyhow!("exit status 1")).context("could not run fdesetup")
        }));
        assert_eq!(result.status, CheckStatus::Error);
        assert_eq!(result.finding, FAULT_FINDING);
        assert!(result.evidence.is_none());
        assert_eq!(result.remediation, "");
        assert_eq!(result.risk, "");
        let err = result.error.expect("error set");
        assert!(err.contains("could not run fdesetup"), "err={err}");
        assert!(err.contains("exit status 1"), "err={err}");
        assert!(!result.timestamp.is_empty());
    }

    #[test]
    fn panic_is_converted_to_error_result() {
        let result = run_probe(&probe(|| panic!("index out of bounds")));
        assert_eq!(result.status, CheckStatus::Error);
        let err = result.error.expect("error set");
        assert!(err.contains("index out of bounds"), "err={err}");
    }

    #[test]
    fn self_reported_error_status_is_a_verdict_not_a_fault() {
        let result = run_probe(&probe(|| {
            Ok(ProbeOutcome::error("could not parse output"))
        }));
        assert_eq!(result.status, CheckStatus::Error);
        assert_eq!(result.finding, "could not parse output");
        assert!(result.error.is_none());
        assert!(!result.is_fault());
    }
}
