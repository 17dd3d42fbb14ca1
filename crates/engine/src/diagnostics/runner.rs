//! Diagnostic rule engine
//!
//! Scores a topology snapshot against a fixed battery of health checks and
//! produces a [`DiagnosticReport`]. Evaluation is a pure function of its
//! inputs: the same graph and history always yield the same checks. A
//! failure inside one check degrades that check to status `error` and never
//! aborts the rest of the report.

use anyhow::Result;
use serde::Serialize;
use tracing::info;

use crate::context::RestartHistory;
use crate::models::diagnostics::{
    CheckCategory, CheckStatus, DiagnosticCheck, DiagnosticReport, RemediationAction, Severity,
};
use crate::models::topology::{NodeRole, PolicyType, TopologyGraph};

/// Namespace the managed-platform agents run in.
const PLATFORM_NAMESPACE: &str = "azure-arc";

/// Agents expected in the platform namespace on a managed cluster.
const PLATFORM_AGENTS: &[&str] = &[
    "clusterconnect-agent",
    "config-agent",
    "controller-manager",
    "extension-manager",
    "metrics-agent",
    "resource-sync-agent",
];

/// Node pressure conditions that indicate resource exhaustion.
const PRESSURE_CONDITIONS: &[&str] = &["MemoryPressure", "DiskPressure", "PIDPressure"];

/// Restart-count delta within the lookback window that counts as a loop.
pub const RESTART_LOOP_THRESHOLD: u32 = 3;

/// Runs the fixed diagnostic check battery.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticRunner;

impl DiagnosticRunner {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate the full battery against a snapshot, using buffered restart
    /// history for the restart-loop check. Check ordering matters only for
    /// message aggregation; `overall_health` is order-independent.
    pub fn run_all_checks(
        &self,
        topology: &TopologyGraph,
        history: &RestartHistory,
    ) -> DiagnosticReport {
        let mut report = DiagnosticReport::new(&topology.metadata.cluster_name);

        report.add_check(guarded("control_plane_health", CheckCategory::ControlPlane, || {
            check_control_plane_health(topology)
        }));
        report.add_check(guarded("api_server_connectivity", CheckCategory::ControlPlane, || {
            check_api_server_connectivity(topology)
        }));
        report.add_check(guarded("arc_agents_running", CheckCategory::Arc, || {
            check_platform_agents(topology)
        }));
        report.add_check(guarded("arc_connectivity", CheckCategory::Arc, || {
            check_cloud_connectivity(topology)
        }));
        report.add_check(guarded("dns_service", CheckCategory::Networking, || {
            check_dns_service(topology)
        }));
        report.add_check(guarded("network_policies", CheckCategory::Networking, || {
            check_network_policies(topology)
        }));
        report.add_check(guarded("service_endpoints", CheckCategory::Networking, || {
            check_service_endpoints(topology)
        }));
        report.add_check(guarded("node_conditions", CheckCategory::Nodes, || {
            check_node_conditions(topology)
        }));
        report.add_check(guarded("node_resources", CheckCategory::Nodes, || {
            check_node_resources(topology)
        }));
        report.add_check(guarded("pod_health", CheckCategory::Workloads, || {
            check_pod_health(topology)
        }));
        report.add_check(guarded("restart_loops", CheckCategory::Workloads, || {
            check_restart_loops(topology, history)
        }));

        info!(
            total = report.summary.total(),
            passed = report.summary.pass,
            warnings = report.summary.warn,
            failed = report.summary.fail,
            errors = report.summary.error,
            overall = ?report.overall_health,
            "Diagnostic checks complete"
        );

        report
    }
}

/// Run one check, containing any internal failure to a status-`error`
/// result on that check alone.
fn guarded(
    name: &str,
    category: CheckCategory,
    f: impl FnOnce() -> Result<DiagnosticCheck>,
) -> DiagnosticCheck {
    match f() {
        Ok(check) => check,
        Err(e) => DiagnosticCheck::new(
            name,
            category,
            CheckStatus::Error,
            Severity::High,
            format!("Check failed: {e}"),
        ),
    }
}

#[derive(Serialize)]
struct UnhealthyNodesDetails {
    unhealthy_nodes: Vec<String>,
}

fn check_control_plane_health(topology: &TopologyGraph) -> Result<DiagnosticCheck> {
    let control_plane: Vec<_> = topology
        .compute_nodes
        .iter()
        .filter(|n| n.role == NodeRole::ControlPlane)
        .collect();

    if control_plane.is_empty() {
        return Ok(DiagnosticCheck::new(
            "control_plane_health",
            CheckCategory::ControlPlane,
            CheckStatus::Fail,
            Severity::Critical,
            "No control plane nodes found",
        )
        .with_remediation(RemediationAction::new(
            "Verify cluster setup and control plane deployment",
            vec![
                "kubectl get nodes -o wide".to_string(),
                "kubectl get pods -n kube-system".to_string(),
            ],
        )));
    }

    let unhealthy: Vec<String> = control_plane
        .iter()
        .filter(|node| {
            node.conditions
                .iter()
                .any(|c| c.condition_type == "Ready" && c.status != "True")
        })
        .map(|node| node.name.clone())
        .collect();

    if !unhealthy.is_empty() {
        return Ok(DiagnosticCheck::new(
            "control_plane_health",
            CheckCategory::ControlPlane,
            CheckStatus::Fail,
            Severity::Critical,
            format!("Control plane nodes not ready: {}", unhealthy.join(", ")),
        )
        .with_details(&UnhealthyNodesDetails {
            unhealthy_nodes: unhealthy.clone(),
        })
        .with_remediation(RemediationAction::new(
            "Investigate node conditions and control plane component health",
            vec![
                format!("kubectl describe node {}", unhealthy[0]),
                "kubectl get pods -n kube-system -o wide".to_string(),
            ],
        )));
    }

    Ok(DiagnosticCheck::new(
        "control_plane_health",
        CheckCategory::ControlPlane,
        CheckStatus::Pass,
        Severity::Info,
        format!("All {} control plane node(s) healthy", control_plane.len()),
    ))
}

fn check_api_server_connectivity(topology: &TopologyGraph) -> Result<DiagnosticCheck> {
    if topology.metadata.api_reachable {
        Ok(DiagnosticCheck::new(
            "api_server_connectivity",
            CheckCategory::ControlPlane,
            CheckStatus::Pass,
            Severity::Info,
            format!(
                "API server reachable (Kubernetes {})",
                topology.metadata.kubernetes_version
            ),
        ))
    } else {
        Ok(DiagnosticCheck::new(
            "api_server_connectivity",
            CheckCategory::ControlPlane,
            CheckStatus::Fail,
            Severity::Critical,
            "API server metadata probe failed during this snapshot",
        )
        .with_remediation(RemediationAction::new(
            "Verify kubeconfig and cluster connectivity",
            vec!["kubectl cluster-info".to_string()],
        )))
    }
}

#[derive(Serialize)]
struct MissingAgentsDetails {
    missing_agents: Vec<String>,
}

fn check_platform_agents(topology: &TopologyGraph) -> Result<DiagnosticCheck> {
    let platform_pods: Vec<_> = topology.pods_in_namespace(PLATFORM_NAMESPACE).collect();

    // An empty platform namespace indicates a non-managed cluster, not a
    // defect: skip with a warning instead of failing.
    if platform_pods.is_empty() {
        return Ok(DiagnosticCheck::new(
            "arc_agents_running",
            CheckCategory::Arc,
            CheckStatus::Warn,
            Severity::Low,
            format!("Agent check skipped: no pods in {PLATFORM_NAMESPACE} namespace"),
        ));
    }

    let running: Vec<&str> = platform_pods
        .iter()
        .filter(|p| p.phase.is_healthy())
        .map(|p| p.name.as_str())
        .collect();

    let missing: Vec<String> = PLATFORM_AGENTS
        .iter()
        .filter(|agent| !running.iter().any(|name| name.contains(*agent)))
        .map(|agent| agent.to_string())
        .collect();

    if !missing.is_empty() {
        return Ok(DiagnosticCheck::new(
            "arc_agents_running",
            CheckCategory::Arc,
            CheckStatus::Fail,
            Severity::High,
            format!("Missing platform agents: {}", missing.join(", ")),
        )
        .with_details(&MissingAgentsDetails {
            missing_agents: missing,
        })
        .with_remediation(RemediationAction::new(
            "Inspect agent pods and their logs in the platform namespace",
            vec![
                format!("kubectl get pods -n {PLATFORM_NAMESPACE}"),
                format!(
                    "kubectl logs -n {PLATFORM_NAMESPACE} -l app.kubernetes.io/component=connect-agent"
                ),
            ],
        )));
    }

    Ok(DiagnosticCheck::new(
        "arc_agents_running",
        CheckCategory::Arc,
        CheckStatus::Pass,
        Severity::Info,
        format!("All {} platform agents running", PLATFORM_AGENTS.len()),
    ))
}

fn check_cloud_connectivity(topology: &TopologyGraph) -> Result<DiagnosticCheck> {
    let connect_agent = topology
        .pods_in_namespace(PLATFORM_NAMESPACE)
        .find(|p| p.name.contains("clusterconnect-agent") && p.phase.is_healthy());

    match connect_agent {
        Some(pod) => Ok(DiagnosticCheck::new(
            "arc_connectivity",
            CheckCategory::Arc,
            CheckStatus::Pass,
            Severity::Info,
            format!("Cluster connect agent running: {}", pod.name),
        )),
        None => Ok(DiagnosticCheck::new(
            "arc_connectivity",
            CheckCategory::Arc,
            CheckStatus::Warn,
            Severity::Medium,
            "No running clusterconnect-agent pod; cloud connectivity cannot be verified",
        )),
    }
}

fn check_dns_service(topology: &TopologyGraph) -> Result<DiagnosticCheck> {
    let dns_service = topology
        .services
        .iter()
        .find(|s| s.namespace == "kube-system" && s.name.to_lowercase().contains("dns"));

    match dns_service {
        Some(svc) => Ok(DiagnosticCheck::new(
            "dns_service",
            CheckCategory::Networking,
            CheckStatus::Pass,
            Severity::Info,
            format!("DNS service available: {}", svc.name),
        )),
        None => Ok(DiagnosticCheck::new(
            "dns_service",
            CheckCategory::Networking,
            CheckStatus::Fail,
            Severity::High,
            "No DNS service found in kube-system",
        )
        .with_remediation(RemediationAction::new(
            "Verify CoreDNS or kube-dns deployment",
            vec!["kubectl get pods -n kube-system -l k8s-app=kube-dns".to_string()],
        ))),
    }
}

#[derive(Serialize)]
struct DenyAllPoliciesDetails {
    deny_all_policies: Vec<String>,
}

fn check_network_policies(topology: &TopologyGraph) -> Result<DiagnosticCheck> {
    if topology.network_policies.is_empty() {
        return Ok(DiagnosticCheck::new(
            "network_policies",
            CheckCategory::Networking,
            CheckStatus::Warn,
            Severity::Low,
            "No NetworkPolicies defined: all traffic allowed by default",
        ));
    }

    // An Ingress-type policy with zero ingress rules denies all ingress to
    // the pods it selects. Flag it as an isolation risk.
    let deny_all: Vec<String> = topology
        .network_policies
        .iter()
        .filter(|np| {
            np.policy_types.contains(&PolicyType::Ingress) && np.ingress_rules.is_empty()
        })
        .map(|np| np.name.clone())
        .collect();

    if !deny_all.is_empty() {
        return Ok(DiagnosticCheck::new(
            "network_policies",
            CheckCategory::Networking,
            CheckStatus::Warn,
            Severity::Medium,
            format!(
                "Deny-all ingress policies may unintentionally isolate pods: {}",
                deny_all.join(", ")
            ),
        )
        .with_details(&DenyAllPoliciesDetails {
            deny_all_policies: deny_all,
        }));
    }

    Ok(DiagnosticCheck::new(
        "network_policies",
        CheckCategory::Networking,
        CheckStatus::Pass,
        Severity::Info,
        format!("{} NetworkPolicies configured", topology.network_policies.len()),
    ))
}

#[derive(Serialize)]
struct ServicesWithoutEndpointsDetails {
    services_without_endpoints: Vec<String>,
}

fn check_service_endpoints(topology: &TopologyGraph) -> Result<DiagnosticCheck> {
    let orphaned: Vec<_> = topology
        .services
        .iter()
        .filter(|svc| svc.endpoint_pod_ids.is_empty())
        .collect();

    if orphaned.is_empty() {
        return Ok(DiagnosticCheck::new(
            "service_endpoints",
            CheckCategory::Networking,
            CheckStatus::Pass,
            Severity::Info,
            format!("All {} services have endpoints", topology.services.len()),
        ));
    }

    let named: Vec<&str> = orphaned.iter().take(5).map(|s| s.name.as_str()).collect();
    Ok(DiagnosticCheck::new(
        "service_endpoints",
        CheckCategory::Networking,
        CheckStatus::Warn,
        Severity::Medium,
        format!(
            "{} service(s) have no backing pods: {}",
            orphaned.len(),
            named.join(", ")
        ),
    )
    .with_details(&ServicesWithoutEndpointsDetails {
        services_without_endpoints: orphaned.iter().map(|s| s.name.clone()).collect(),
    })
    .with_remediation(RemediationAction::new(
        "Verify pod selectors match running pods",
        vec![format!(
            "kubectl describe svc {} -n {}",
            orphaned[0].name, orphaned[0].namespace
        )],
    )))
}

#[derive(Serialize)]
struct PressureDetails {
    node: String,
    condition: String,
    reason: String,
}

fn check_node_conditions(topology: &TopologyGraph) -> Result<DiagnosticCheck> {
    let mut problems = Vec::new();

    for node in &topology.compute_nodes {
        for condition in &node.conditions {
            if PRESSURE_CONDITIONS.contains(&condition.condition_type.as_str())
                && condition.status == "True"
            {
                problems.push(PressureDetails {
                    node: node.name.clone(),
                    condition: condition.condition_type.clone(),
                    reason: condition.reason.clone().unwrap_or_else(|| "unknown".to_string()),
                });
            }
        }
    }

    if problems.is_empty() {
        return Ok(DiagnosticCheck::new(
            "node_conditions",
            CheckCategory::Nodes,
            CheckStatus::Pass,
            Severity::Info,
            "All nodes have healthy conditions",
        ));
    }

    let first_node = problems[0].node.clone();
    Ok(DiagnosticCheck::new(
        "node_conditions",
        CheckCategory::Nodes,
        CheckStatus::Fail,
        Severity::High,
        format!("{} node(s) report pressure conditions", problems.len()),
    )
    .with_details(&problems)
    .with_remediation(RemediationAction::new(
        "Investigate resource pressure before workloads are evicted",
        vec![
            format!("kubectl describe node {first_node}"),
            "kubectl top nodes".to_string(),
        ],
    )))
}

fn check_node_resources(topology: &TopologyGraph) -> Result<DiagnosticCheck> {
    // Live usage data needs a metrics provider; capacity alone cannot tell
    // whether a node is saturated.
    Ok(DiagnosticCheck::new(
        "node_resources",
        CheckCategory::Nodes,
        CheckStatus::Pass,
        Severity::Info,
        format!(
            "Not yet implemented: live usage for {} node(s) requires a metrics provider",
            topology.compute_nodes.len()
        ),
    ))
}

#[derive(Serialize)]
struct UnhealthyPodsDetails {
    unhealthy_pods: Vec<String>,
}

fn check_pod_health(topology: &TopologyGraph) -> Result<DiagnosticCheck> {
    let unhealthy: Vec<_> = topology
        .pods
        .iter()
        .filter(|pod| !pod.phase.is_healthy())
        .collect();

    if unhealthy.is_empty() {
        return Ok(DiagnosticCheck::new(
            "pod_health",
            CheckCategory::Workloads,
            CheckStatus::Pass,
            Severity::Info,
            format!("All {} pods healthy", topology.pods.len()),
        ));
    }

    let named: Vec<String> = unhealthy
        .iter()
        .take(5)
        .map(|p| format!("{}/{}", p.namespace, p.name))
        .collect();

    Ok(DiagnosticCheck::new(
        "pod_health",
        CheckCategory::Workloads,
        CheckStatus::Fail,
        Severity::Medium,
        format!("{} pod(s) not healthy: {}", unhealthy.len(), named.join(", ")),
    )
    .with_details(&UnhealthyPodsDetails {
        unhealthy_pods: unhealthy
            .iter()
            .map(|p| format!("{}/{}", p.namespace, p.name))
            .collect(),
    })
    .with_remediation(RemediationAction::new(
        "Investigate pod failures",
        vec![
            format!("kubectl describe pod {} -n {}", unhealthy[0].name, unhealthy[0].namespace),
            format!("kubectl logs {} -n {}", unhealthy[0].name, unhealthy[0].namespace),
        ],
    )))
}

#[derive(Serialize)]
struct RestartLoopDetails {
    looping_pods: Vec<LoopingPod>,
    window_snapshots: usize,
}

#[derive(Serialize)]
struct LoopingPod {
    pod_id: String,
    restart_delta: u32,
}

fn check_restart_loops(
    topology: &TopologyGraph,
    history: &RestartHistory,
) -> Result<DiagnosticCheck> {
    // A single instantaneous count cannot distinguish an old restart from an
    // active loop; this check needs at least two buffered snapshots to diff.
    if !history.has_sufficient_data() {
        return Ok(DiagnosticCheck::new(
            "restart_loops",
            CheckCategory::Workloads,
            CheckStatus::Pass,
            Severity::Info,
            format!(
                "Insufficient history for restart analysis ({} snapshot(s) buffered)",
                history.snapshot_count
            ),
        ));
    }

    let mut looping: Vec<LoopingPod> = history
        .deltas
        .iter()
        .filter(|(_, delta)| **delta >= RESTART_LOOP_THRESHOLD)
        .map(|(pod_id, delta)| LoopingPod {
            pod_id: pod_id.clone(),
            restart_delta: *delta,
        })
        .collect();
    looping.sort_by(|a, b| b.restart_delta.cmp(&a.restart_delta));

    if looping.is_empty() {
        return Ok(DiagnosticCheck::new(
            "restart_loops",
            CheckCategory::Workloads,
            CheckStatus::Pass,
            Severity::Info,
            format!(
                "No restart loops detected across {} snapshot(s)",
                history.snapshot_count
            ),
        ));
    }

    let worst = &looping[0];
    let remediation_target = topology
        .pod(&worst.pod_id)
        .map(|p| format!("kubectl logs {} -n {} --previous", p.name, p.namespace))
        .unwrap_or_else(|| "kubectl get pods -A --sort-by=.status.containerStatuses[0].restartCount".to_string());

    let message = format!(
        "{} pod(s) restarting repeatedly, worst {} with {} restarts in window",
        looping.len(),
        worst.pod_id,
        worst.restart_delta
    );

    Ok(DiagnosticCheck::new(
        "restart_loops",
        CheckCategory::Workloads,
        CheckStatus::Fail,
        Severity::High,
        message,
    )
    .with_details(&RestartLoopDetails {
        looping_pods: looping,
        window_snapshots: history.snapshot_count,
    })
    .with_remediation(RemediationAction::new(
        "Inspect previous container logs for the crash cause",
        vec![remediation_target],
    )))
}
