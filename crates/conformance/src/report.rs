//! Run results and summaries

use crate::comparator::{CheckStatus, ComparisonResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of one control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlStatus {
    Passed,
    Failed,
    Skipped,
}

impl fmt::Display for ControlStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed => write!(f, "passed"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// Result of evaluating one control
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlResult {
    #[serde(rename = "control_id")]
    pub id: String,
    pub title: String,
    pub impact: f64,
    pub status: ControlStatus,
    pub checks: Vec<ComparisonResult>,
    /// Correlation and observation failures
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<String>,
}

impl ControlResult {
    /// Build a result, deriving status from checks and diagnostics
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        impact: f64,
        checks: Vec<ComparisonResult>,
        diagnostics: Vec<String>,
    ) -> Self {
        let status = if !diagnostics.is_empty() || checks.iter().any(ComparisonResult::failed) {
            ControlStatus::Failed
        } else if !checks.is_empty() && checks.iter().all(|c| c.status == CheckStatus::Skipped) {
            ControlStatus::Skipped
        } else {
            ControlStatus::Passed
        };
        Self {
            id: id.into(),
            title: title.into(),
            impact,
            status,
            checks,
            diagnostics,
        }
    }

    /// Whether the control failed
    pub fn failed(&self) -> bool {
        self.status == ControlStatus::Failed
    }

    /// Failed checks only
    pub fn failures(&self) -> impl Iterator<Item = &ComparisonResult> {
        self.checks.iter().filter(|c| c.failed())
    }
}

/// Counts across a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub checks_passed: usize,
    pub checks_failed: usize,
    pub checks_skipped: usize,
}

impl Summary {
    /// Total controls
    pub fn total(&self) -> usize {
        self.passed + self.failed + self.skipped
    }

    /// Total checks
    pub fn total_checks(&self) -> usize {
        self.checks_passed + self.checks_failed + self.checks_skipped
    }

    /// Add a control result to the summary
    pub fn add_result(&mut self, result: &ControlResult) {
        match result.status {
            ControlStatus::Passed => self.passed += 1,
            ControlStatus::Failed => self.failed += 1,
            ControlStatus::Skipped => self.skipped += 1,
        }
        for check in &result.checks {
            match check.status {
                CheckStatus::Pass => self.checks_passed += 1,
                CheckStatus::Fail => self.checks_failed += 1,
                CheckStatus::Skipped => self.checks_skipped += 1,
            }
        }
    }
}

/// Everything a run produced, ordered by control id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub controls: Vec<ControlResult>,
}

impl RunReport {
    /// Build a report; controls are sorted by id
    pub fn new(started_at: DateTime<Utc>, mut controls: Vec<ControlResult>) -> Self {
        controls.sort_by(|a, b| a.id.cmp(&b.id));
        Self {
            started_at,
            controls,
        }
    }

    /// Aggregate counts
    pub fn summary(&self) -> Summary {
        let mut summary = Summary::default();
        for result in &self.controls {
            summary.add_result(result);
        }
        summary
    }

    /// Every full-impact control passed or was skipped
    pub fn conformant(&self) -> bool {
        self.controls
            .iter()
            .filter(|c| c.impact >= 1.0)
            .all(|c| !c.failed())
    }

    /// Failed controls whose impact is at least `threshold`
    pub fn failed_at_or_above(&self, threshold: f64) -> Vec<&ControlResult> {
        self.controls
            .iter()
            .filter(|c| c.failed() && c.impact >= threshold)
            .collect()
    }

    /// Look a control result up by id
    pub fn control(&self, id: &str) -> Option<&ControlResult> {
        self.controls.iter().find(|c| c.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Expected;

    fn check(status: CheckStatus) -> ComparisonResult {
        ComparisonResult {
            path: "status".to_string(),
            expected: Some(Expected::from("RUNNING")),
            actual: None,
            status,
            instance: "demo".to_string(),
            detail: None,
        }
    }

    fn result(id: &str, impact: f64, status: CheckStatus) -> ControlResult {
        ControlResult::new(id, id, impact, vec![check(status)], Vec::new())
    }

    #[test]
    fn test_status_derivation() {
        assert_eq!(
            result("a", 1.0, CheckStatus::Pass).status,
            ControlStatus::Passed
        );
        assert_eq!(
            result("a", 1.0, CheckStatus::Fail).status,
            ControlStatus::Failed
        );
        assert_eq!(
            result("a", 1.0, CheckStatus::Skipped).status,
            ControlStatus::Skipped
        );
        let diagnosed = ControlResult::new(
            "a",
            "a",
            1.0,
            vec![check(CheckStatus::Pass)],
            vec!["no instance correlates to logical name 'pool-b'".to_string()],
        );
        assert!(diagnosed.failed());
    }

    #[test]
    fn test_sorted_and_summarized() {
        let report = RunReport::new(
            Utc::now(),
            vec![
                result("node_pools", 1.0, CheckStatus::Pass),
                result("api", 1.0, CheckStatus::Fail),
                result("gcr_role", 0.5, CheckStatus::Skipped),
            ],
        );
        let ids: Vec<_> = report.controls.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["api", "gcr_role", "node_pools"]);

        let summary = report.summary();
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.total(), 3);
        assert_eq!(summary.total_checks(), 3);
    }

    #[test]
    fn test_conformance_and_threshold() {
        let report = RunReport::new(
            Utc::now(),
            vec![
                result("cluster", 1.0, CheckStatus::Pass),
                result("kubeconfig", 0.7, CheckStatus::Fail),
                result("gcr_role", 0.5, CheckStatus::Fail),
            ],
        );
        assert!(report.conformant());
        assert_eq!(report.failed_at_or_above(0.7).len(), 1);
        assert_eq!(report.failed_at_or_above(0.5).len(), 2);
        assert!(report.failed_at_or_above(1.0).is_empty());

        let failing = RunReport::new(Utc::now(), vec![result("cluster", 1.0, CheckStatus::Fail)]);
        assert!(!failing.conformant());
    }

    #[test]
    fn test_serialized_shape() {
        let report = RunReport::new(Utc::now(), vec![result("cluster", 1.0, CheckStatus::Pass)]);
        let value = serde_json::to_value(&report).unwrap();
        let control = &value["controls"][0];
        assert_eq!(control["control_id"], "cluster");
        assert_eq!(control["impact"], 1.0);
        assert_eq!(control["checks"][0]["path"], "status");
        assert_eq!(control["checks"][0]["status"], "pass");
        assert_eq!(control["checks"][0]["expected"]["rule"], "exact");
        assert!(control.get("diagnostics").is_none());
    }
}
