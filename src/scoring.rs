use serde::{Deserialize, Serialize};

use crate::core::{CheckResult, CheckStatus};

/// How NOT_APPLICABLE results enter the score denominator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotApplicablePolicy {
    /// Every result counts: `passed / total`.
    #[default]
    Include,
    /// N/A results stay in `total` but are dropped from the denominator.
    ExcludeFromScore,
}

impl NotApplicablePolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Include => "include",
            Self::ExcludeFromScore => "exclude_from_score",
        }
    }
}

impl std::str::FromStr for NotApplicablePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "include" => Ok(Self::Include),
            "exclude" | "exclude_from_score" => Ok(Self::ExcludeFromScore),
            other => Err(format!(
                "unknown not_applicable policy: {other} (expected include|exclude_from_score)"
            )),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanStats {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub warnings: usize,
    pub errors: usize,
    pub not_applicable: usize,
    pub compliance_score: f64,
}

impl ScanStats {
    pub fn from_results(results: &[CheckResult], policy: NotApplicablePolicy) -> Self {
        let mut stats = Self {
            total: results.len(),
            ..Self::default()
        };
        for r in results {
            match r.status {
                CheckStatus::Pass => stats.passed += 1,
                CheckStatus::Fail => stats.failed += 1,
                CheckStatus::Warning => stats.warnings += 1,
                CheckStatus::Error => stats.errors += 1,
                CheckStatus::NotApplicable => stats.not_applicable += 1,
            }
        }

        let denominator = match policy {
            NotApplicablePolicy::Include => stats.total,
            NotApplicablePolicy::ExcludeFromScore => stats.total - stats.not_applicable,
        };
        stats.compliance_score = score(stats.passed, denominator);
        stats
    }

    pub fn band(&self) -> ScoreBand {
        score_band(self.compliance_score)
    }
}

/// `passed / denominator * 100`, rounded to one decimal; 0 for an empty set.
pub fn score(passed: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    round1(passed as f64 / denominator as f64 * 100.0)
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreBand {
    Good,
    Fair,
    Moderate,
    Poor,
    Critical,
}

impl ScoreBand {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Good => "good",
            Self::Fair => "fair",
            Self::Moderate => "moderate",
            Self::Poor => "poor",
            Self::Critical => "critical",
        }
    }
}

pub fn score_band(score: f64) -> ScoreBand {
    if score >= 80.0 {
        ScoreBand::Good
    } else if score >= 60.0 {
        ScoreBand::Fair
    } else if score >= 40.0 {
        ScoreBand::Moderate
    } else if score >= 20.0 {
        ScoreBand::Poor
    } else {
        ScoreBand::Critical
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryGroup<'a> {
    pub category: &'a str,
    pub results: Vec<&'a CheckResult>,
}

impl CategoryGroup<'_> {
    pub fn passed(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.status == CheckStatus::Pass)
            .count()
    }
}

/// Partition by category, keeping first-seen category order and the input
/// order inside each group.
pub fn group_by_category(results: &[CheckResult]) -> Vec<CategoryGroup<'_>> {
    let mut groups: Vec<CategoryGroup<'_>> = Vec::new();
    for r in results {
        match groups.iter_mut().find(|g| g.category == r.category) {
            Some(group) => group.results.push(r),
            None => groups.push(CategoryGroup {
                category: &r.category,
                results: vec![r],
            }),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Severity;

    fn result(id: &str, category: &str, status: CheckStatus) -> CheckResult {
        CheckResult {
            id: id.to_string(),
            title: format!("title {id}"),
            description: String::new(),
            category: category.to_string(),
            severity: Severity::Medium,
            compliance_frameworks: vec![],
            status,
            finding: "x".to_string(),
            evidence: None,
            risk: String::new(),
            remediation: String::new(),
            timestamp: "2026-01-01T00:00:00Z".to_string(),
            error: None,
        }
    }

    fn of(statuses: &[CheckStatus]) -> Vec<CheckResult> {
        statuses
            .iter()
            .enumerate()
            .map(|(i, s)| result(&format!("c{i}"), "General", *s))
            .collect()
    }

    #[test]
    fn empty_set_scores_zero() {
        let stats = ScanStats::from_results(&[], NotApplicablePolicy::Include);
        assert_eq!(stats.total, 0);
        assert_eq!(stats.compliance_score, 0.0);
        assert!(group_by_category(&[]).is_empty());
    }

    #[test]
    fn all_pass_is_hundred_and_all_fail_is_zero() {
        use CheckStatus::*;
        let stats = ScanStats::from_results(&of(&[Pass, Pass, Pass]), Default::default());
        assert_eq!(stats.compliance_score, 100.0);
        let stats = ScanStats::from_results(&of(&[Fail, Fail]), Default::default());
        assert_eq!(stats.compliance_score, 0.0);
    }

    #[test]
    fn score_rounds_to_one_decimal() {
        assert_eq!(score(1, 3), 33.3);
        assert_eq!(score(2, 3), 66.7);
        assert_eq!(score(1, 7), 14.3);
        assert_eq!(score(3, 0), 0.0);
    }

    #[test]
    fn error_and_not_applicable_only_count_in_total() {
        use CheckStatus::*;
        let results = of(&[Pass, Fail, Warning, Error, NotApplicable]);
        let stats = ScanStats::from_results(&results, NotApplicablePolicy::Include);
        assert_eq!(stats.total, 5);
        assert_eq!(stats.passed, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.warnings, 1);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.not_applicable, 1);
        assert!(stats.passed + stats.failed + stats.warnings < stats.total);
        assert_eq!(stats.compliance_score, 20.0);
    }

    #[test]
    fn verdict_counts_equal_total_without_error_or_na() {
        use CheckStatus::*;
        let stats = ScanStats::from_results(&of(&[Pass, Fail, Warning, Pass]), Default::default());
        assert_eq!(stats.passed + stats.failed + stats.warnings, stats.total);
    }

    #[test]
    fn exclude_policy_drops_not_applicable_from_denominator() {
        use CheckStatus::*;
        let results = of(&[Pass, Fail, NotApplicable, NotApplicable]);
        let include = ScanStats::from_results(&results, NotApplicablePolicy::Include);
        let exclude = ScanStats::from_results(&results, NotApplicablePolicy::ExcludeFromScore);
        assert_eq!(include.compliance_score, 25.0);
        assert_eq!(exclude.compliance_score, 50.0);
        assert_eq!(exclude.total, 4);

        let only_na = of(&[NotApplicable]);
        let stats = ScanStats::from_results(&only_na, NotApplicablePolicy::ExcludeFromScore);
        assert_eq!(stats.compliance_score, 0.0);
    }

    #[test]
    fn aggregation_is_idempotent() {
        use CheckStatus::*;
        let results = of(&[Pass, Error, Fail]);
        let a = ScanStats::from_results(&results, Default::default());
        let b = ScanStats::from_results(&results, Default::default());
        assert_eq!(a, b);
        assert_eq!(a.compliance_score, 33.3);
    }

    #[test]
    fn grouping_keeps_first_seen_order_and_is_a_permutation() {
        let results = vec![
            result("a", "Network Security", CheckStatus::Pass),
            result("b", "Data Protection", CheckStatus::Fail),
            result("c", "Network Security", CheckStatus::Warning),
            result("d", "Access Control", CheckStatus::Pass),
            result("e", "Data Protection", CheckStatus::Pass),
        ];
        let groups = group_by_category(&results);
        let names: Vec<&str> = groups.iter().map(|g| g.category).collect();
        assert_eq!(
            names,
            vec!["Network Security", "Data Protection", "Access Control"]
        );
        for g in &groups {
            assert!(g.results.iter().all(|r| r.category == g.category));
        }
        let ids: Vec<&str> = groups
            .iter()
            .flat_map(|g| g.results.iter().map(|r| r.id.as_str()))
            .collect();
        assert_eq!(ids, vec!["a", "c", "b", "e", "d"]);
        assert_eq!(groups[1].passed(), 1);
    }

    #[test]
    fn score_bands_follow_thresholds() {
        assert_eq!(score_band(100.0), ScoreBand::Good);
        assert_eq!(score_band(80.0), ScoreBand::Good);
        assert_eq!(score_band(79.9), ScoreBand::Fair);
        assert_eq!(score_band(40.0), ScoreBand::Moderate);
        assert_eq!(score_band(20.0), ScoreBand::Poor);
        assert_eq!(score_band(0.0), ScoreBand::Critical);
    }

    #[test]
    fn policy_parses_from_config_strings() {
        assert_eq!(
            "exclude-from-score".parse::<NotApplicablePolicy>().unwrap(),
            NotApplicablePolicy::ExcludeFromScore
        );
        assert_eq!(
            "Include".parse::<NotApplicablePolicy>().unwrap(),
            NotApplicablePolicy::Include
        );
        assert!("bogus".parse::<NotApplicablePolicy>().is_err());
    }
}
