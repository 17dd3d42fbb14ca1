//! Topology graph builder
//!
//! Turns raw cluster resource lists into an immutable [`TopologyGraph`]
//! snapshot: typed nodes, service-to-pod endpoint resolution, policy
//! affected-pod resolution, derived communication flows with
//! NetworkPolicy verdicts, and a namespace connectivity matrix.
//!
//! The connectivity matrix and per-flow verdicts are a conservative
//! estimate, not a full policy simulator: IP-block peers, AND'd peer
//! selectors, and egress-only restrictions are not evaluated.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::ProviderError;
use crate::models::topology::{
    node_id, pod_id, policy_id, selector_matches, service_id, ComputeNode, ContainerPort,
    EntityKind, FlowEndpoint, NamespaceConnectivity, NetworkFlow, NetworkPolicyNode, NodeCondition,
    NodeRole, PodNode, PodPhase, PolicyPeer, PolicyPort, PolicyRule, PolicyType, ServiceNode,
    ServicePort, ServiceType, TopologyGraph, TopologyMetadata, UNSCHEDULED_NODE_ID,
    WILDCARD_SOURCE,
};
use crate::provider::{
    Platform, RawEndpoints, RawNetworkPolicy, RawNode, RawPod, RawService, ResourceProvider,
};

const CONTROL_PLANE_LABEL: &str = "node-role.kubernetes.io/control-plane";

/// Builds topology snapshots from a [`ResourceProvider`].
pub struct TopologyBuilder {
    provider: Arc<dyn ResourceProvider>,
}

impl TopologyBuilder {
    pub fn new(provider: Arc<dyn ResourceProvider>) -> Self {
        Self { provider }
    }

    /// Build a complete topology snapshot.
    ///
    /// The five resource listings run concurrently and are joined
    /// all-or-nothing: a failed listing aborts the whole build so the graph
    /// is never assembled from inconsistent data. Two exceptions:
    /// an `Unsupported` NetworkPolicy listing degrades to an empty policy
    /// set, and a failed platform probe yields unknown metadata with
    /// `api_reachable = false`.
    pub async fn build(&self) -> Result<TopologyGraph, ProviderError> {
        let (nodes, pods, services, endpoints, netpols, platform) = tokio::join!(
            self.provider.list_nodes(),
            self.provider.list_pods(),
            self.provider.list_services(),
            self.provider.list_endpoints(),
            self.provider.list_network_policies(),
            self.provider.platform_info(),
        );

        let nodes = nodes?;
        let pods_raw = pods?;
        let services_raw = services?;
        let endpoints_raw = endpoints?;
        let netpols_raw = match netpols {
            Ok(list) => list,
            Err(ProviderError::Unsupported { resource }) => {
                warn!(resource, "NetworkPolicy API unavailable, assuming no policies");
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        let (cluster_name, k8s_version, platform_kind, api_reachable) = match platform {
            Ok(info) => (info.cluster_name, info.kubernetes_version, info.platform, true),
            Err(e) => {
                warn!(error = %e, "Platform probe failed, recording unknown metadata");
                ("unknown".to_string(), "unknown".to_string(), Platform::Other, false)
            }
        };

        let compute_nodes = build_compute_nodes(&nodes);
        let pods = build_pod_nodes(&pods_raw);
        let services = build_service_nodes(&services_raw, &endpoints_raw, &pods);
        let network_policies = build_policy_nodes(&netpols_raw, &pods);
        let communication_flows = build_communication_flows(&pods, &services, &network_policies);
        let namespace_connectivity = namespace_connectivity(&pods, &network_policies);

        let metadata = TopologyMetadata {
            cluster_name,
            timestamp: Utc::now(),
            kubernetes_version: k8s_version,
            platform: platform_kind,
            api_reachable,
            node_count: compute_nodes.len(),
            pod_count: pods.len(),
            service_count: services.len(),
            namespace_count: pods.iter().map(|p| p.namespace.as_str()).collect::<std::collections::HashSet<_>>().len(),
        };

        info!(
            nodes = compute_nodes.len(),
            pods = pods.len(),
            services = services.len(),
            policies = network_policies.len(),
            flows = communication_flows.len(),
            "Topology graph built"
        );

        Ok(TopologyGraph {
            metadata,
            compute_nodes,
            pods,
            services,
            network_policies,
            communication_flows,
            namespace_connectivity,
        })
    }
}

fn build_compute_nodes(nodes: &[RawNode]) -> Vec<ComputeNode> {
    nodes
        .iter()
        .map(|node| {
            let role = if node.labels.contains_key(CONTROL_PLANE_LABEL) {
                NodeRole::ControlPlane
            } else {
                NodeRole::Worker
            };

            ComputeNode {
                id: node_id(&node.name),
                name: node.name.clone(),
                ip: node.internal_ip.clone(),
                role,
                capacity: node.capacity.clone(),
                allocatable: node.allocatable.clone(),
                conditions: node
                    .conditions
                    .iter()
                    .map(|c| NodeCondition {
                        condition_type: c.condition_type.clone(),
                        status: c.status.clone(),
                        reason: c.reason.clone(),
                    })
                    .collect(),
            }
        })
        .collect()
}

fn build_pod_nodes(pods: &[RawPod]) -> Vec<PodNode> {
    pods.iter()
        .map(|pod| {
            let ports = pod
                .containers
                .iter()
                .flat_map(|c| {
                    c.ports.iter().map(|p| ContainerPort {
                        container: c.name.clone(),
                        port: p.port,
                        protocol: p.protocol,
                        name: p.name.clone(),
                    })
                })
                .collect();

            PodNode {
                id: pod_id(&pod.namespace, &pod.name),
                name: pod.name.clone(),
                namespace: pod.namespace.clone(),
                node_id: pod
                    .node_name
                    .as_deref()
                    .map(node_id)
                    .unwrap_or_else(|| UNSCHEDULED_NODE_ID.to_string()),
                ip: pod.ip.clone(),
                phase: PodPhase::parse(&pod.phase),
                labels: pod.labels.clone(),
                ports,
                restart_count: pod.restart_count,
            }
        })
        .collect()
}

fn build_service_nodes(
    services: &[RawService],
    endpoints: &[RawEndpoints],
    pods: &[PodNode],
) -> Vec<ServiceNode> {
    let endpoints_by_service: HashMap<(&str, &str), &[String]> = endpoints
        .iter()
        .map(|ep| ((ep.namespace.as_str(), ep.name.as_str()), ep.addresses.as_slice()))
        .collect();

    let pod_by_ip: HashMap<&str, &str> = pods
        .iter()
        .filter_map(|p| p.ip.as_deref().map(|ip| (ip, p.id.as_str())))
        .collect();

    services
        .iter()
        .map(|svc| {
            // Stale Endpoint addresses with no matching pod IP are dropped;
            // a service may briefly reference pods that no longer exist.
            let endpoint_pod_ids = endpoints_by_service
                .get(&(svc.namespace.as_str(), svc.name.as_str()))
                .map(|addresses| {
                    addresses
                        .iter()
                        .filter_map(|ip| pod_by_ip.get(ip.as_str()))
                        .map(|id| id.to_string())
                        .collect()
                })
                .unwrap_or_default();

            let ports = svc
                .ports
                .iter()
                .map(|p| ServicePort {
                    port: p.port,
                    target_port: p
                        .target_port
                        .clone()
                        .unwrap_or_else(|| p.port.to_string()),
                    protocol: p.protocol,
                    name: p.name.clone(),
                })
                .collect();

            ServiceNode {
                id: service_id(&svc.namespace, &svc.name),
                name: svc.name.clone(),
                namespace: svc.namespace.clone(),
                service_type: ServiceType::parse(&svc.service_type),
                cluster_ip: svc.cluster_ip.clone(),
                external_ip: svc.external_ip.clone(),
                ports,
                selector: svc.selector.clone(),
                endpoint_pod_ids,
            }
        })
        .collect()
}

fn build_policy_nodes(netpols: &[RawNetworkPolicy], pods: &[PodNode]) -> Vec<NetworkPolicyNode> {
    netpols
        .iter()
        .map(|np| {
            let affected_pod_ids = pods
                .iter()
                .filter(|pod| {
                    pod.namespace == np.namespace && selector_matches(&pod.labels, &np.pod_selector)
                })
                .map(|pod| pod.id.clone())
                .collect();

            let convert_rules = |rules: &[crate::provider::RawPolicyRule]| -> Vec<PolicyRule> {
                rules
                    .iter()
                    .map(|rule| PolicyRule {
                        ports: rule
                            .ports
                            .iter()
                            .map(|p| PolicyPort {
                                port: p.port,
                                protocol: p.protocol,
                            })
                            .collect(),
                        peers: rule
                            .peers
                            .iter()
                            .map(|peer| PolicyPeer {
                                pod_selector: peer.pod_selector.clone(),
                                namespace_selector: peer.namespace_selector.clone(),
                                ip_block_cidr: peer.ip_block_cidr.clone(),
                            })
                            .collect(),
                    })
                    .collect()
            };

            NetworkPolicyNode {
                id: policy_id(&np.namespace, &np.name),
                name: np.name.clone(),
                namespace: np.namespace.clone(),
                pod_selector: np.pod_selector.clone(),
                policy_types: np
                    .policy_types
                    .iter()
                    .filter_map(|t| match t.as_str() {
                        "Ingress" => Some(PolicyType::Ingress),
                        "Egress" => Some(PolicyType::Egress),
                        _ => None,
                    })
                    .collect(),
                ingress_rules: convert_rules(&np.ingress),
                egress_rules: convert_rules(&np.egress),
                affected_pod_ids,
            }
        })
        .collect()
}

/// Derive flow edges in two passes: service routing edges (always allowed,
/// NetworkPolicy does not apply to service VIP routing) and wildcard-source
/// potential-ingress edges per exposed pod port.
fn build_communication_flows(
    pods: &[PodNode],
    services: &[ServiceNode],
    netpols: &[NetworkPolicyNode],
) -> Vec<NetworkFlow> {
    let mut flows = Vec::new();

    for service in services {
        for pod_id in &service.endpoint_pod_ids {
            for port in &service.ports {
                flows.push(NetworkFlow {
                    id: format!("flow-{}-{}-{}", service.id, pod_id, port.port),
                    source: FlowEndpoint {
                        kind: EntityKind::Service,
                        id: service.id.clone(),
                    },
                    destination: FlowEndpoint {
                        kind: EntityKind::Pod,
                        id: pod_id.clone(),
                    },
                    protocol: port.protocol,
                    port: port.port,
                    allowed: true,
                    policy_refs: vec![],
                });
            }
        }
    }

    // Pods without an assigned IP (still Pending) cannot receive traffic
    // and never appear as flow endpoints.
    for pod in pods.iter().filter(|p| p.ip.is_some()) {
        let policy_refs: Vec<String> = netpols
            .iter()
            .filter(|np| np.affected_pod_ids.contains(&pod.id))
            .map(|np| np.id.clone())
            .collect();

        for port in &pod.ports {
            flows.push(NetworkFlow {
                id: format!("flow-potential-{}-{}", pod.id, port.port),
                source: FlowEndpoint {
                    kind: EntityKind::Pod,
                    id: WILDCARD_SOURCE.to_string(),
                },
                destination: FlowEndpoint {
                    kind: EntityKind::Pod,
                    id: pod.id.clone(),
                },
                protocol: port.protocol,
                port: port.port,
                allowed: check_flow_allowed(pod, port.port, netpols),
                policy_refs: policy_refs.clone(),
            });
        }
    }

    flows
}

/// NetworkPolicy verdict for ingress traffic to `pod` on `port`.
///
/// Default-allow when no policy selects the pod; otherwise allowed iff at
/// least one ingress rule on a selecting Ingress-type policy declares no
/// port restriction or lists the port explicitly.
fn check_flow_allowed(pod: &PodNode, port: u16, netpols: &[NetworkPolicyNode]) -> bool {
    let affecting: Vec<&NetworkPolicyNode> = netpols
        .iter()
        .filter(|np| np.affected_pod_ids.contains(&pod.id))
        .collect();

    if affecting.is_empty() {
        return true;
    }

    affecting.iter().any(|policy| {
        policy.policy_types.contains(&PolicyType::Ingress)
            && policy.ingress_rules.iter().any(|rule| {
                rule.ports.is_empty() || rule.ports.iter().any(|p| p.port == Some(port))
            })
    })
}

/// Pairwise namespace connectivity over all namespaces seen in the snapshot,
/// including self-pairs. A pair is blocked when any Ingress-type policy in
/// the destination namespace has no rule admitting a namespace-scoped peer.
fn namespace_connectivity(
    pods: &[PodNode],
    netpols: &[NetworkPolicyNode],
) -> Vec<NamespaceConnectivity> {
    let namespaces: std::collections::BTreeSet<&str> =
        pods.iter().map(|p| p.namespace.as_str()).collect();

    let mut matrix = Vec::with_capacity(namespaces.len() * namespaces.len());

    for src in &namespaces {
        for dst in &namespaces {
            let mut blocking = Vec::new();
            let mut allowing = Vec::new();

            for np in netpols {
                if np.namespace != *dst || !np.policy_types.contains(&PolicyType::Ingress) {
                    continue;
                }
                let admits_namespace_peer = np.ingress_rules.iter().any(|rule| {
                    !rule.peers.is_empty()
                        && rule.peers.iter().any(|peer| peer.namespace_selector.is_some())
                });
                if admits_namespace_peer {
                    allowing.push(np.id.clone());
                } else {
                    blocking.push(np.id.clone());
                }
            }

            let allowed = blocking.is_empty();
            debug!(src, dst, allowed, "Namespace pair evaluated");

            matrix.push(NamespaceConnectivity {
                source_namespace: src.to_string(),
                destination_namespace: dst.to_string(),
                allowed,
                blocking_policies: blocking,
                allowing_policies: allowing,
            });
        }
    }

    matrix
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{
        async_trait, PlatformInfo, RawCondition, RawContainer, RawContainerPort, RawPolicyPeer,
        RawPolicyPort, RawPolicyRule, RawServicePort, ResourceProvider,
    };
    use crate::models::topology::Protocol;
    use std::collections::HashMap;

    /// Provider backed by in-memory fixtures, with per-resource failure
    /// injection.
    #[derive(Default)]
    struct StaticProvider {
        nodes: Vec<RawNode>,
        pods: Vec<RawPod>,
        services: Vec<RawService>,
        endpoints: Vec<RawEndpoints>,
        netpols: Vec<RawNetworkPolicy>,
        fail_resource: Option<&'static str>,
        netpols_unsupported: bool,
    }

    impl StaticProvider {
        fn fail_if(&self, resource: &'static str) -> Result<(), ProviderError> {
            if self.fail_resource == Some(resource) {
                Err(ProviderError::fetch(resource, "injected failure"))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl ResourceProvider for StaticProvider {
        async fn list_nodes(&self) -> Result<Vec<RawNode>, ProviderError> {
            self.fail_if("nodes")?;
            Ok(self.nodes.clone())
        }

        async fn list_pods(&self) -> Result<Vec<RawPod>, ProviderError> {
            self.fail_if("pods")?;
            Ok(self.pods.clone())
        }

        async fn list_services(&self) -> Result<Vec<RawService>, ProviderError> {
            self.fail_if("services")?;
            Ok(self.services.clone())
        }

        async fn list_endpoints(&self) -> Result<Vec<RawEndpoints>, ProviderError> {
            self.fail_if("endpoints")?;
            Ok(self.endpoints.clone())
        }

        async fn list_network_policies(&self) -> Result<Vec<RawNetworkPolicy>, ProviderError> {
            if self.netpols_unsupported {
                return Err(ProviderError::unsupported("networkpolicies"));
            }
            self.fail_if("networkpolicies")?;
            Ok(self.netpols.clone())
        }

        async fn platform_info(&self) -> Result<PlatformInfo, ProviderError> {
            self.fail_if("platform")?;
            Ok(PlatformInfo {
                cluster_name: "test-cluster".to_string(),
                kubernetes_version: "1.28.0".to_string(),
                platform: Platform::K3s,
            })
        }
    }

    fn labels(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn raw_node(name: &str, control_plane: bool) -> RawNode {
        RawNode {
            name: name.to_string(),
            labels: if control_plane {
                labels(&[(CONTROL_PLANE_LABEL, "")])
            } else {
                HashMap::new()
            },
            internal_ip: Some("10.0.0.1".to_string()),
            capacity: HashMap::new(),
            allocatable: HashMap::new(),
            conditions: vec![RawCondition {
                condition_type: "Ready".to_string(),
                status: "True".to_string(),
                reason: None,
            }],
        }
    }

    fn raw_pod(name: &str, namespace: &str, ip: Option<&str>, port: Option<u16>) -> RawPod {
        RawPod {
            name: name.to_string(),
            namespace: namespace.to_string(),
            node_name: Some("worker-1".to_string()),
            ip: ip.map(str::to_string),
            phase: if ip.is_some() { "Running" } else { "Pending" }.to_string(),
            labels: labels(&[("app", name)]),
            containers: vec![RawContainer {
                name: "main".to_string(),
                image: "nginx:1.25".to_string(),
                ports: port
                    .map(|p| {
                        vec![RawContainerPort {
                            port: p,
                            protocol: Protocol::Tcp,
                            name: None,
                        }]
                    })
                    .unwrap_or_default(),
            }],
            restart_count: 0,
        }
    }

    fn raw_service(name: &str, namespace: &str, selector_app: &str, port: u16) -> RawService {
        RawService {
            name: name.to_string(),
            namespace: namespace.to_string(),
            service_type: "ClusterIP".to_string(),
            cluster_ip: Some("10.96.0.10".to_string()),
            external_ip: None,
            ports: vec![RawServicePort {
                port,
                target_port: None,
                protocol: Protocol::Tcp,
                name: None,
            }],
            selector: labels(&[("app", selector_app)]),
        }
    }

    fn base_provider() -> StaticProvider {
        StaticProvider {
            nodes: vec![raw_node("cp-1", true), raw_node("worker-1", false)],
            pods: vec![
                raw_pod("web", "default", Some("10.1.0.5"), Some(80)),
                raw_pod("db", "default", Some("10.1.0.6"), Some(5432)),
            ],
            services: vec![raw_service("web", "default", "web", 80)],
            endpoints: vec![RawEndpoints {
                name: "web".to_string(),
                namespace: "default".to_string(),
                addresses: vec!["10.1.0.5".to_string()],
            }],
            ..Default::default()
        }
    }

    async fn build(provider: StaticProvider) -> TopologyGraph {
        TopologyBuilder::new(Arc::new(provider))
            .build()
            .await
            .expect("build succeeds")
    }

    #[tokio::test]
    async fn test_referential_integrity() {
        let graph = build(base_provider()).await;

        let node_ids: Vec<&str> = graph.compute_nodes.iter().map(|n| n.id.as_str()).collect();
        for pod in &graph.pods {
            assert!(
                node_ids.contains(&pod.node_id.as_str()) || pod.node_id == UNSCHEDULED_NODE_ID,
                "pod {} references unknown node {}",
                pod.id,
                pod.node_id
            );
        }

        let pod_ids: Vec<&str> = graph.pods.iter().map(|p| p.id.as_str()).collect();
        for svc in &graph.services {
            for backing in &svc.endpoint_pod_ids {
                assert!(pod_ids.contains(&backing.as_str()));
            }
        }
    }

    #[tokio::test]
    async fn test_control_plane_role_from_label() {
        let graph = build(base_provider()).await;
        let cp = graph.compute_nodes.iter().find(|n| n.name == "cp-1").unwrap();
        assert_eq!(cp.role, NodeRole::ControlPlane);
        let worker = graph.compute_nodes.iter().find(|n| n.name == "worker-1").unwrap();
        assert_eq!(worker.role, NodeRole::Worker);
    }

    #[tokio::test]
    async fn test_unscheduled_pod_attaches_to_sentinel() {
        let mut provider = base_provider();
        provider.pods.push(RawPod {
            node_name: None,
            ..raw_pod("pending", "default", None, Some(8080))
        });

        let graph = build(provider).await;
        let pending = graph.pod("pod-default-pending").unwrap();
        assert_eq!(pending.node_id, UNSCHEDULED_NODE_ID);
    }

    #[tokio::test]
    async fn test_pending_pod_without_ip_excluded_from_flows() {
        let mut provider = base_provider();
        provider.pods.push(raw_pod("pending", "default", None, Some(8080)));

        let graph = build(provider).await;
        assert!(graph
            .communication_flows
            .iter()
            .all(|f| f.destination.id != "pod-default-pending"));
    }

    #[tokio::test]
    async fn test_service_endpoint_resolution() {
        let graph = build(base_provider()).await;
        let svc = &graph.services[0];
        assert_eq!(svc.endpoint_pod_ids, vec!["pod-default-web".to_string()]);

        let service_flows: Vec<&NetworkFlow> = graph
            .communication_flows
            .iter()
            .filter(|f| f.source.kind == EntityKind::Service)
            .collect();
        assert_eq!(service_flows.len(), 1);
        assert!(service_flows[0].allowed);
        assert_eq!(service_flows[0].port, 80);
    }

    #[tokio::test]
    async fn test_stale_endpoint_address_dropped() {
        let mut provider = base_provider();
        provider.endpoints[0]
            .addresses
            .push("10.1.99.99".to_string()); // no pod has this IP

        let graph = build(provider).await;
        assert_eq!(graph.services[0].endpoint_pod_ids.len(), 1);
    }

    #[tokio::test]
    async fn test_selector_matching_no_pods_yields_empty_endpoints() {
        let mut provider = base_provider();
        provider.services = vec![raw_service("orphan", "default", "nothing-matches", 9090)];
        provider.endpoints = vec![];

        let graph = build(provider).await;
        assert!(graph.services[0].endpoint_pod_ids.is_empty());
    }

    #[tokio::test]
    async fn test_empty_policy_selector_affects_whole_namespace() {
        let mut provider = base_provider();
        provider.netpols = vec![RawNetworkPolicy {
            name: "default-deny".to_string(),
            namespace: "default".to_string(),
            pod_selector: HashMap::new(),
            policy_types: vec!["Ingress".to_string()],
            ingress: vec![],
            egress: vec![],
        }];

        let graph = build(provider).await;
        let np = &graph.network_policies[0];
        assert_eq!(np.affected_pod_ids.len(), 2);
    }

    #[tokio::test]
    async fn test_flow_allowed_without_policies() {
        let graph = build(base_provider()).await;
        let potential: Vec<&NetworkFlow> = graph
            .communication_flows
            .iter()
            .filter(|f| !f.has_concrete_source())
            .collect();
        assert_eq!(potential.len(), 2);
        assert!(potential.iter().all(|f| f.allowed));
        assert!(potential.iter().all(|f| f.policy_refs.is_empty()));
    }

    #[tokio::test]
    async fn test_flow_verdict_against_port_restricted_policy() {
        let mut provider = base_provider();
        provider.netpols = vec![RawNetworkPolicy {
            name: "allow-web".to_string(),
            namespace: "default".to_string(),
            pod_selector: HashMap::new(),
            policy_types: vec!["Ingress".to_string()],
            ingress: vec![RawPolicyRule {
                ports: vec![RawPolicyPort {
                    port: Some(80),
                    protocol: Protocol::Tcp,
                }],
                peers: vec![],
            }],
            egress: vec![],
        }];

        let graph = build(provider).await;

        let web_flow = graph
            .communication_flows
            .iter()
            .find(|f| f.id == "flow-potential-pod-default-web-80")
            .unwrap();
        assert!(web_flow.allowed);
        assert_eq!(web_flow.policy_refs, vec!["netpol-default-allow-web".to_string()]);

        let db_flow = graph
            .communication_flows
            .iter()
            .find(|f| f.id == "flow-potential-pod-default-db-5432")
            .unwrap();
        assert!(!db_flow.allowed, "port 5432 is not admitted by the policy");
    }

    #[tokio::test]
    async fn test_rule_without_ports_allows_any_port() {
        let mut provider = base_provider();
        provider.netpols = vec![RawNetworkPolicy {
            name: "allow-all-ports".to_string(),
            namespace: "default".to_string(),
            pod_selector: HashMap::new(),
            policy_types: vec!["Ingress".to_string()],
            ingress: vec![RawPolicyRule::default()],
            egress: vec![],
        }];

        let graph = build(provider).await;
        assert!(graph
            .communication_flows
            .iter()
            .filter(|f| !f.has_concrete_source())
            .all(|f| f.allowed));
    }

    #[tokio::test]
    async fn test_namespace_connectivity_open_without_policies() {
        let mut provider = base_provider();
        provider.pods.push(raw_pod("api", "prod", Some("10.1.1.1"), None));

        let graph = build(provider).await;
        // 2 namespaces -> 4 pairs including self-pairs
        assert_eq!(graph.namespace_connectivity.len(), 4);
        assert!(graph.namespace_connectivity.iter().all(|c| c.allowed));
    }

    #[tokio::test]
    async fn test_namespace_connectivity_blocked_by_ingress_policy() {
        let mut provider = base_provider();
        provider.pods.push(raw_pod("api", "prod", Some("10.1.1.1"), None));
        provider.netpols = vec![RawNetworkPolicy {
            name: "isolate".to_string(),
            namespace: "prod".to_string(),
            pod_selector: HashMap::new(),
            policy_types: vec!["Ingress".to_string()],
            ingress: vec![],
            egress: vec![],
        }];

        let graph = build(provider).await;
        let into_prod = graph
            .namespace_connectivity
            .iter()
            .find(|c| c.source_namespace == "default" && c.destination_namespace == "prod")
            .unwrap();
        assert!(!into_prod.allowed);
        assert_eq!(into_prod.blocking_policies, vec!["netpol-prod-isolate".to_string()]);

        let into_default = graph
            .namespace_connectivity
            .iter()
            .find(|c| c.source_namespace == "prod" && c.destination_namespace == "default")
            .unwrap();
        assert!(into_default.allowed);
    }

    #[tokio::test]
    async fn test_namespace_peer_rule_marks_allowing_policy() {
        let mut provider = base_provider();
        provider.netpols = vec![RawNetworkPolicy {
            name: "allow-ns".to_string(),
            namespace: "default".to_string(),
            pod_selector: HashMap::new(),
            policy_types: vec!["Ingress".to_string()],
            ingress: vec![RawPolicyRule {
                ports: vec![],
                peers: vec![RawPolicyPeer {
                    namespace_selector: Some(HashMap::new()),
                    ..Default::default()
                }],
            }],
            egress: vec![],
        }];

        let graph = build(provider).await;
        let self_pair = graph
            .namespace_connectivity
            .iter()
            .find(|c| c.source_namespace == "default" && c.destination_namespace == "default")
            .unwrap();
        assert!(self_pair.allowed);
        assert_eq!(self_pair.allowing_policies, vec!["netpol-default-allow-ns".to_string()]);
    }

    #[tokio::test]
    async fn test_fetch_failure_aborts_build() {
        let mut provider = base_provider();
        provider.fail_resource = Some("pods");

        let result = TopologyBuilder::new(Arc::new(provider)).build().await;
        assert!(matches!(result, Err(ProviderError::Fetch { resource: "pods", .. })));
    }

    #[tokio::test]
    async fn test_unsupported_network_policies_degrade_to_empty() {
        let mut provider = base_provider();
        provider.netpols_unsupported = true;

        let graph = build(provider).await;
        assert!(graph.network_policies.is_empty());
        assert_eq!(graph.metadata.cluster_name, "test-cluster");
    }

    #[tokio::test]
    async fn test_platform_probe_failure_is_non_fatal() {
        let mut provider = base_provider();
        provider.fail_resource = Some("platform");

        let graph = build(provider).await;
        assert!(!graph.metadata.api_reachable);
        assert_eq!(graph.metadata.cluster_name, "unknown");
    }

    #[tokio::test]
    async fn test_metadata_counts() {
        let graph = build(base_provider()).await;
        assert_eq!(graph.metadata.node_count, 2);
        assert_eq!(graph.metadata.pod_count, 2);
        assert_eq!(graph.metadata.service_count, 1);
        assert_eq!(graph.metadata.namespace_count, 1);
        assert!(graph.metadata.api_reachable);
        assert_eq!(graph.metadata.kubernetes_version, "1.28.0");
    }
}
