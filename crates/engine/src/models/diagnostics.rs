//! Diagnostic check and report model
//!
//! A report is an ordered list of named, categorized findings plus summary
//! counts. `overall_health` is recomputed on every append from the counts,
//! never cached stale.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of a single diagnostic check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
    /// The check's own computation failed; contained to this check only.
    Error,
}

impl CheckStatus {
    /// Whether this status counts against overall health as a failure.
    pub fn is_failing(&self) -> bool {
        matches!(self, Self::Fail | Self::Error)
    }
}

/// Severity of a finding, independent of its status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

/// Category a check belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckCategory {
    ControlPlane,
    Arc,
    Networking,
    Nodes,
    Workloads,
}

/// Suggested remediation: a human description plus ordered read-only
/// diagnostic commands. Never auto-executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemediationAction {
    pub description: String,
    pub commands: Vec<String>,
}

impl RemediationAction {
    pub fn new(description: impl Into<String>, commands: Vec<String>) -> Self {
        Self {
            description: description.into(),
            commands,
        }
    }
}

/// One named diagnostic finding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticCheck {
    pub name: String,
    pub category: CheckCategory,
    pub status: CheckStatus,
    pub severity: Severity,
    pub message: String,
    /// Structured details; each check builds a typed payload internally and
    /// serializes it here at the boundary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<RemediationAction>,
}

impl DiagnosticCheck {
    pub fn new(
        name: impl Into<String>,
        category: CheckCategory,
        status: CheckStatus,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            category,
            status,
            severity,
            message: message.into(),
            details: None,
            remediation: None,
        }
    }

    pub fn with_details<T: Serialize>(mut self, details: &T) -> Self {
        self.details = serde_json::to_value(details).ok();
        self
    }

    pub fn with_remediation(mut self, remediation: RemediationAction) -> Self {
        self.remediation = Some(remediation);
        self
    }
}

/// Per-status counts over a report's checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub pass: usize,
    pub warn: usize,
    pub fail: usize,
    pub error: usize,
}

impl ReportSummary {
    pub fn total(&self) -> usize {
        self.pass + self.warn + self.fail + self.error
    }
}

/// Aggregate health of a report: the worst status observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallHealth {
    Pass,
    Warn,
    Fail,
}

/// Complete diagnostic report for one topology snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticReport {
    pub cluster_name: String,
    pub timestamp: DateTime<Utc>,
    pub checks: Vec<DiagnosticCheck>,
    pub summary: ReportSummary,
    pub overall_health: OverallHealth,
}

impl DiagnosticReport {
    pub fn new(cluster_name: impl Into<String>) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            timestamp: Utc::now(),
            checks: Vec::new(),
            summary: ReportSummary::default(),
            overall_health: OverallHealth::Pass,
        }
    }

    /// Append a check, updating summary counts and recomputing
    /// `overall_health` from them. Fail and error dominate warn, warn
    /// dominates pass; ties resolve by status, not by count.
    pub fn add_check(&mut self, check: DiagnosticCheck) {
        match check.status {
            CheckStatus::Pass => self.summary.pass += 1,
            CheckStatus::Warn => self.summary.warn += 1,
            CheckStatus::Fail => self.summary.fail += 1,
            CheckStatus::Error => self.summary.error += 1,
        }
        self.checks.push(check);

        self.overall_health = if self.summary.fail + self.summary.error > 0 {
            OverallHealth::Fail
        } else if self.summary.warn > 0 {
            OverallHealth::Warn
        } else {
            OverallHealth::Pass
        };
    }

    /// Checks that count against overall health.
    pub fn failing_checks(&self) -> impl Iterator<Item = &DiagnosticCheck> {
        self.checks.iter().filter(|c| c.status.is_failing())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(name: &str, status: CheckStatus, severity: Severity) -> DiagnosticCheck {
        DiagnosticCheck::new(name, CheckCategory::Nodes, status, severity, "msg")
    }

    #[test]
    fn test_overall_health_recomputed_on_append() {
        let mut report = DiagnosticReport::new("test");
        assert_eq!(report.overall_health, OverallHealth::Pass);

        report.add_check(check("a", CheckStatus::Pass, Severity::Info));
        assert_eq!(report.overall_health, OverallHealth::Pass);

        report.add_check(check("b", CheckStatus::Warn, Severity::Low));
        assert_eq!(report.overall_health, OverallHealth::Warn);

        report.add_check(check("c", CheckStatus::Fail, Severity::Critical));
        assert_eq!(report.overall_health, OverallHealth::Fail);

        // A later pass never improves overall health
        report.add_check(check("d", CheckStatus::Pass, Severity::Info));
        assert_eq!(report.overall_health, OverallHealth::Fail);
    }

    #[test]
    fn test_error_status_counts_as_failure() {
        let mut report = DiagnosticReport::new("test");
        report.add_check(check("a", CheckStatus::Error, Severity::High));
        assert_eq!(report.overall_health, OverallHealth::Fail);
        assert_eq!(report.summary.error, 1);
        assert_eq!(report.summary.fail, 0);
    }

    #[test]
    fn test_health_matches_summary_counts() {
        // overall == fail iff fail + error > 0; warn iff that sum is 0 and
        // warn > 0; else pass.
        let mut report = DiagnosticReport::new("test");
        for status in [
            CheckStatus::Pass,
            CheckStatus::Warn,
            CheckStatus::Pass,
            CheckStatus::Error,
        ] {
            report.add_check(check("x", status, Severity::Info));
            let expected = if report.summary.fail + report.summary.error > 0 {
                OverallHealth::Fail
            } else if report.summary.warn > 0 {
                OverallHealth::Warn
            } else {
                OverallHealth::Pass
            };
            assert_eq!(report.overall_health, expected);
        }
        assert_eq!(report.summary.total(), 4);
    }

    #[test]
    fn test_typed_details_serialize() {
        #[derive(Serialize)]
        struct Details {
            unhealthy_nodes: Vec<String>,
        }

        let c = check("a", CheckStatus::Fail, Severity::Critical).with_details(&Details {
            unhealthy_nodes: vec!["worker-1".to_string()],
        });
        let details = c.details.expect("details serialized");
        assert_eq!(details["unhealthy_nodes"][0], "worker-1");
    }
}
