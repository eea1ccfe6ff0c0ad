use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::core::{CheckStatus, Evidence, Severity};

pub const DEFAULT_FINDING: &str = "No finding recorded";
pub const FAULT_FINDING: &str = "Check execution failed";

/// Outcome of one probe execution: the probe's static identity merged with
/// the verdict it produced (or the fault that prevented one).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub severity: Severity,
    pub compliance_frameworks: Vec<String>,
    pub status: CheckStatus,
    pub finding: String,
    pub evidence: Option<Evidence>,
    pub risk: String,
    pub remediation: String,
    pub timestamp: String,
    pub error: Option<String>,
}

impl CheckResult {
    pub fn is_fault(&self) -> bool {
        self.error.is_some()
    }
}

/// Current UTC time as RFC 3339; `"unknown"` if formatting fails.
pub fn timestamp_now() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "unknown".to_string())
}
