//! Tick result types: what the loop observed, concluded, and proposes
//!
//! Each tick produces a fresh `Observation` and `Reasoning`, and an
//! `ActionPlan` only when overall health is degraded. The loop retains the
//! latest of each; history lives in the context buffer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::context::ClusterEvent;
use crate::models::diagnostics::{CheckStatus, DiagnosticReport, OverallHealth, Severity};
use crate::models::topology::TopologyGraph;

/// Phase of the reasoning loop's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopPhase {
    Idle,
    Observing,
    Reasoning,
    Acting,
}

/// What one tick saw: the freshly built graph plus point-in-time events.
#[derive(Debug, Clone, Serialize)]
pub struct Observation {
    pub timestamp: DateTime<Utc>,
    pub topology: Arc<TopologyGraph>,
    /// Events supplied by an external event-collection collaborator; the
    /// built-in loop records none, so this is empty unless a caller feeds
    /// events into the buffer itself.
    pub events: Vec<ClusterEvent>,
}

impl Observation {
    pub fn new(topology: Arc<TopologyGraph>, events: Vec<ClusterEvent>) -> Self {
        Self {
            timestamp: topology.metadata.timestamp,
            topology,
            events,
        }
    }
}

/// Conclusions drawn from one observation.
#[derive(Debug, Clone, Serialize)]
pub struct Reasoning {
    pub timestamp: DateTime<Utc>,
    pub report: DiagnosticReport,
    /// One entry per failing or warning check.
    pub anomalies: Vec<String>,
    /// Names of the checks believed to be root causes (failing checks only).
    pub root_causes: Vec<String>,
    /// Fraction of the battery that passed, in [0, 1].
    pub confidence: f64,
    /// Human-readable trace of which checks fired and what each implied.
    pub reasoning_chain: Vec<String>,
}

impl Reasoning {
    /// Derive anomalies, root causes, confidence, and the reasoning chain
    /// from a finished report.
    pub fn from_report(report: DiagnosticReport) -> Self {
        let mut anomalies = Vec::new();
        let mut root_causes = Vec::new();
        let mut chain = Vec::new();

        for check in &report.checks {
            match check.status {
                CheckStatus::Pass => {
                    chain.push(format!("{}: pass", check.name));
                }
                CheckStatus::Warn => {
                    anomalies.push(format!("{}: {}", check.name, check.message));
                    chain.push(format!("{}: warn ({})", check.name, check.message));
                }
                CheckStatus::Fail | CheckStatus::Error => {
                    anomalies.push(format!("{}: {}", check.name, check.message));
                    root_causes.push(check.name.clone());
                    chain.push(format!(
                        "{}: {} ({})",
                        check.name,
                        if check.status == CheckStatus::Fail { "fail" } else { "error" },
                        check.message
                    ));
                }
            }
        }

        let total = report.summary.total();
        let failing = report.summary.fail + report.summary.error;
        let confidence = if total == 0 {
            1.0
        } else {
            (1.0 - failing as f64 / total as f64).clamp(0.0, 1.0)
        };

        Self {
            timestamp: report.timestamp,
            report,
            anomalies,
            root_causes,
            confidence,
            reasoning_chain: chain,
        }
    }
}

/// A single proposed command, tagged by the check that motivated it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposedAction {
    pub origin_check: String,
    pub description: String,
    pub command: String,
}

/// Read-only remediation steps proposed for a degraded cluster.
#[derive(Debug, Clone, Serialize)]
pub struct ActionPlan {
    pub timestamp: DateTime<Utc>,
    /// 1 = critical, 2 = high, 3 = elevated, 4 = low.
    pub priority: u8,
    pub actions: Vec<ProposedAction>,
    pub expected_outcome: String,
    pub rollback_note: String,
}

impl ActionPlan {
    /// Build a plan from degraded reasoning. Returns `None` when overall
    /// health is `pass`: a healthy cluster needs no plan.
    pub fn from_reasoning(reasoning: &Reasoning) -> Option<Self> {
        let report = &reasoning.report;
        if report.overall_health == OverallHealth::Pass {
            return None;
        }

        let has_critical_failure = report.checks.iter().any(|c| {
            c.status.is_failing() && c.severity == Severity::Critical
        });
        let priority = if has_critical_failure {
            1
        } else if report.summary.fail + report.summary.error > 0 {
            2
        } else {
            3
        };

        let mut actions = Vec::new();
        for check in &report.checks {
            if check.status == CheckStatus::Pass {
                continue;
            }
            if let Some(remediation) = &check.remediation {
                for command in &remediation.commands {
                    actions.push(ProposedAction {
                        origin_check: check.name.clone(),
                        description: remediation.description.clone(),
                        command: command.clone(),
                    });
                }
            }
        }

        let failing = report.summary.fail + report.summary.error;
        let expected_outcome = if failing > 0 {
            format!(
                "Resolve {} failing check(s); cluster health returns to pass",
                failing
            )
        } else {
            format!(
                "Review {} warning(s); confirm they are intentional posture",
                report.summary.warn
            )
        };

        Some(Self {
            timestamp: Utc::now(),
            priority,
            actions,
            expected_outcome,
            rollback_note: "All proposed commands are read-only; nothing to roll back".to_string(),
        })
    }
}

/// Compact summary of the last reasoning result, for `status()`.
#[derive(Debug, Clone, Serialize)]
pub struct ReasoningSummary {
    pub timestamp: DateTime<Utc>,
    pub overall_health: OverallHealth,
    pub anomaly_count: usize,
    pub confidence: f64,
}

impl From<&Reasoning> for ReasoningSummary {
    fn from(reasoning: &Reasoning) -> Self {
        Self {
            timestamp: reasoning.timestamp,
            overall_health: reasoning.report.overall_health,
            anomaly_count: reasoning.anomalies.len(),
            confidence: reasoning.confidence,
        }
    }
}

/// Compact summary of the last action plan, for `status()`.
#[derive(Debug, Clone, Serialize)]
pub struct ActionPlanSummary {
    pub timestamp: DateTime<Utc>,
    pub priority: u8,
    pub action_count: usize,
}

impl From<&ActionPlan> for ActionPlanSummary {
    fn from(plan: &ActionPlan) -> Self {
        Self {
            timestamp: plan.timestamp,
            priority: plan.priority,
            action_count: plan.actions.len(),
        }
    }
}

/// Point-in-time report of what the loop is doing and last produced.
#[derive(Debug, Clone, Serialize)]
pub struct LoopStatus {
    pub running: bool,
    pub phase: LoopPhase,
    pub last_observation_time: Option<DateTime<Utc>>,
    pub last_reasoning: Option<ReasoningSummary>,
    pub last_action_plan: Option<ActionPlanSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::diagnostics::{CheckCategory, DiagnosticCheck, RemediationAction};

    fn check(name: &str, status: CheckStatus, severity: Severity) -> DiagnosticCheck {
        DiagnosticCheck::new(name, CheckCategory::Nodes, status, severity, format!("{name} message"))
    }

    fn report_with(checks: Vec<DiagnosticCheck>) -> DiagnosticReport {
        let mut report = DiagnosticReport::new("test-cluster");
        for c in checks {
            report.add_check(c);
        }
        report
    }

    #[test]
    fn test_reasoning_derivation() {
        let report = report_with(vec![
            check("a", CheckStatus::Pass, Severity::Info),
            check("b", CheckStatus::Warn, Severity::Low),
            check("c", CheckStatus::Fail, Severity::High),
            check("d", CheckStatus::Error, Severity::High),
        ]);

        let reasoning = Reasoning::from_report(report);

        assert_eq!(reasoning.anomalies.len(), 3);
        assert_eq!(reasoning.root_causes, vec!["c", "d"]);
        assert_eq!(reasoning.reasoning_chain.len(), 4);
        assert!((reasoning.confidence - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_confidence_bounds() {
        let all_pass = Reasoning::from_report(report_with(vec![
            check("a", CheckStatus::Pass, Severity::Info),
        ]));
        assert!((all_pass.confidence - 1.0).abs() < f64::EPSILON);

        let all_fail = Reasoning::from_report(report_with(vec![
            check("a", CheckStatus::Fail, Severity::High),
            check("b", CheckStatus::Fail, Severity::High),
        ]));
        assert!(all_fail.confidence.abs() < f64::EPSILON);

        let empty = Reasoning::from_report(DiagnosticReport::new("test"));
        assert!((empty.confidence - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_no_plan_when_healthy() {
        let reasoning = Reasoning::from_report(report_with(vec![
            check("a", CheckStatus::Pass, Severity::Info),
        ]));
        assert!(ActionPlan::from_reasoning(&reasoning).is_none());
    }

    #[test]
    fn test_plan_priority_from_worst_status() {
        let critical = Reasoning::from_report(report_with(vec![
            check("cp", CheckStatus::Fail, Severity::Critical),
        ]));
        assert_eq!(ActionPlan::from_reasoning(&critical).unwrap().priority, 1);

        let failing = Reasoning::from_report(report_with(vec![
            check("svc", CheckStatus::Fail, Severity::Medium),
        ]));
        assert_eq!(ActionPlan::from_reasoning(&failing).unwrap().priority, 2);

        let warning = Reasoning::from_report(report_with(vec![
            check("posture", CheckStatus::Warn, Severity::Low),
        ]));
        assert_eq!(ActionPlan::from_reasoning(&warning).unwrap().priority, 3);
    }

    #[test]
    fn test_plan_actions_tagged_by_origin_check() {
        let mut report = DiagnosticReport::new("test-cluster");
        report.add_check(
            check("dns_service", CheckStatus::Fail, Severity::High).with_remediation(
                RemediationAction::new(
                    "Verify DNS deployment",
                    vec![
                        "kubectl get pods -n kube-system".to_string(),
                        "kubectl get svc -n kube-system".to_string(),
                    ],
                ),
            ),
        );
        report.add_check(check("pod_health", CheckStatus::Warn, Severity::Low));

        let plan = ActionPlan::from_reasoning(&Reasoning::from_report(report)).unwrap();

        assert_eq!(plan.actions.len(), 2);
        assert!(plan.actions.iter().all(|a| a.origin_check == "dns_service"));
        assert!(plan.expected_outcome.contains("1 failing check"));
        assert!(plan.rollback_note.contains("read-only"));
    }
}
