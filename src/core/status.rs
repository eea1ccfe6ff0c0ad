use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckStatus {
    Pass,
    Fail,
    Warning,
    Error,
    NotApplicable,
}

impl CheckStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            CheckStatus::Pass => "PASS",
            CheckStatus::Fail => "FAIL",
            CheckStatus::Warning => "WARNING",
            CheckStatus::Error => "ERROR",
            CheckStatus::NotApplicable => "NOT_APPLICABLE",
        }
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "PASS" => Ok(CheckStatus::Pass),
            "FAIL" => Ok(CheckStatus::Fail),
            "WARNING" | "WARN" => Ok(CheckStatus::Warning),
            "ERROR" => Ok(CheckStatus::Error),
            "NOT_APPLICABLE" | "N/A" | "NA" => Ok(CheckStatus::NotApplicable),
            other => Err(format!(
                "invalid status: {other} (expected PASS|FAIL|WARNING|ERROR|NOT_APPLICABLE)"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_as_upper_case_names() {
        let v = serde_json::to_value(CheckStatus::NotApplicable).expect("serialize");
        assert_eq!(v, serde_json::json!("NOT_APPLICABLE"));
        let v = serde_json::to_value(CheckStatus::Pass).expect("serialize");
        assert_eq!(v, serde_json::json!("PASS"));
    }

    #[test]
    fn parses_loose_spellings() {
        assert_eq!("warn".parse::<CheckStatus>(), Ok(CheckStatus::Warning));
        assert_eq!(
            "not-applicable".parse::<CheckStatus>(),
            Ok(CheckStatus::NotApplicable)
        );
        assert!("maybe".parse::<CheckStatus>().is_err());
    }
}
