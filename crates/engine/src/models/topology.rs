//! Topology graph model
//!
//! An immutable snapshot of the cluster's communication graph: compute
//! nodes, pods, services, network policies, derived flows, and a pairwise
//! namespace connectivity matrix. Built fresh on every reasoning tick and
//! never mutated afterwards.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::provider::Platform;

/// Sentinel owner id for pods the scheduler has not placed yet. Consumers
/// never have to branch on a missing node reference.
pub const UNSCHEDULED_NODE_ID: &str = "node-unscheduled";

/// Wildcard source id on potential-ingress flows: "any pod may attempt this".
pub const WILDCARD_SOURCE: &str = "*";

/// Network protocols carried on flows and ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    Tcp,
    Udp,
    Sctp,
}

impl Default for Protocol {
    fn default() -> Self {
        Self::Tcp
    }
}

/// Role of a compute node, derived from the control-plane label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeRole {
    ControlPlane,
    Worker,
}

/// Kubernetes service type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceType {
    ClusterIP,
    NodePort,
    LoadBalancer,
    ExternalName,
}

impl ServiceType {
    /// Parse the API server's spelling; unknown values map to ClusterIP,
    /// the Kubernetes default.
    pub fn parse(s: &str) -> Self {
        match s {
            "NodePort" => Self::NodePort,
            "LoadBalancer" => Self::LoadBalancer,
            "ExternalName" => Self::ExternalName,
            _ => Self::ClusterIP,
        }
    }
}

/// Pod lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl PodPhase {
    pub fn parse(s: &str) -> Self {
        match s {
            "Pending" => Self::Pending,
            "Running" => Self::Running,
            "Succeeded" => Self::Succeeded,
            "Failed" => Self::Failed,
            _ => Self::Unknown,
        }
    }

    /// Running and Succeeded pods are considered healthy by the workload
    /// checks.
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Running | Self::Succeeded)
    }
}

/// Declared direction of a NetworkPolicy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolicyType {
    Ingress,
    Egress,
}

/// Kind of entity a flow endpoint refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Node,
    Pod,
    Service,
}

/// Node condition tuple (type, status, reason).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeCondition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Kubernetes compute node in the topology.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputeNode {
    /// `node-<name>`
    pub id: String,
    pub name: String,
    pub ip: Option<String>,
    pub role: NodeRole,
    pub capacity: HashMap<String, String>,
    pub allocatable: HashMap<String, String>,
    pub conditions: Vec<NodeCondition>,
}

/// Port exposed by a container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerPort {
    pub container: String,
    pub port: u16,
    pub protocol: Protocol,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Pod workload in the topology. Identity is namespace+name; the id is
/// stable across snapshots so history joins correctly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodNode {
    /// `pod-<namespace>-<name>`
    pub id: String,
    pub name: String,
    pub namespace: String,
    /// References a [`ComputeNode`] id, or [`UNSCHEDULED_NODE_ID`].
    pub node_id: String,
    /// Absent until the CNI assigns an address.
    pub ip: Option<String>,
    pub phase: PodPhase,
    pub labels: HashMap<String, String>,
    pub ports: Vec<ContainerPort>,
    /// Sum of container restart counts at snapshot time. The restart-loop
    /// check diffs this across buffered snapshots.
    pub restart_count: u32,
}

/// Service port mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicePort {
    pub port: u16,
    pub target_port: String,
    pub protocol: Protocol,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Kubernetes Service in the topology.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceNode {
    /// `svc-<namespace>-<name>`
    pub id: String,
    pub name: String,
    pub namespace: String,
    pub service_type: ServiceType,
    pub cluster_ip: Option<String>,
    pub external_ip: Option<String>,
    pub ports: Vec<ServicePort>,
    pub selector: HashMap<String, String>,
    /// Pod ids currently backing this service, resolved from Endpoints.
    /// May be empty when the selector matches no Running pod.
    pub endpoint_pod_ids: Vec<String>,
}

/// Port restriction on a policy rule; `port: None` admits all ports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyPort {
    pub port: Option<u16>,
    pub protocol: Protocol,
}

/// Peer selector on a policy rule.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyPeer {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pod_selector: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace_selector: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_block_cidr: Option<String>,
}

/// One ingress or egress rule.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyRule {
    pub ports: Vec<PolicyPort>,
    pub peers: Vec<PolicyPeer>,
}

/// Kubernetes NetworkPolicy in the topology.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkPolicyNode {
    /// `netpol-<namespace>-<name>`
    pub id: String,
    pub name: String,
    pub namespace: String,
    pub pod_selector: HashMap<String, String>,
    pub policy_types: Vec<PolicyType>,
    pub ingress_rules: Vec<PolicyRule>,
    pub egress_rules: Vec<PolicyRule>,
    /// Pod ids this policy applies to, resolved by same-namespace label
    /// selector match. An empty selector matches every pod in the namespace.
    pub affected_pod_ids: Vec<String>,
}

/// One endpoint of a communication flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowEndpoint {
    pub kind: EntityKind,
    pub id: String,
}

/// Directed, ported, protocol-tagged potential communication edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkFlow {
    pub id: String,
    pub source: FlowEndpoint,
    pub destination: FlowEndpoint,
    pub protocol: Protocol,
    pub port: u16,
    /// Verdict under currently observed NetworkPolicies.
    pub allowed: bool,
    /// Policy ids that determined the verdict.
    pub policy_refs: Vec<String>,
}

impl NetworkFlow {
    /// Flows with the wildcard source denote "any pod may attempt this" and
    /// are excluded from rendering that requires concrete endpoints.
    pub fn has_concrete_source(&self) -> bool {
        self.source.id != WILDCARD_SOURCE
    }
}

/// Pairwise namespace connectivity summary, including self-pairs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamespaceConnectivity {
    pub source_namespace: String,
    pub destination_namespace: String,
    pub allowed: bool,
    pub blocking_policies: Vec<String>,
    pub allowing_policies: Vec<String>,
}

/// Metadata about a topology snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyMetadata {
    pub cluster_name: String,
    pub timestamp: DateTime<Utc>,
    pub kubernetes_version: String,
    pub platform: Platform,
    /// Whether the platform metadata probe succeeded during this build.
    pub api_reachable: bool,
    pub node_count: usize,
    pub pod_count: usize,
    pub service_count: usize,
    pub namespace_count: usize,
}

/// Complete network topology snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyGraph {
    pub metadata: TopologyMetadata,
    pub compute_nodes: Vec<ComputeNode>,
    pub pods: Vec<PodNode>,
    pub services: Vec<ServiceNode>,
    pub network_policies: Vec<NetworkPolicyNode>,
    pub communication_flows: Vec<NetworkFlow>,
    pub namespace_connectivity: Vec<NamespaceConnectivity>,
}

impl TopologyGraph {
    /// Distinct namespaces observed via pods, in sorted order.
    pub fn namespaces(&self) -> BTreeSet<String> {
        self.pods.iter().map(|p| p.namespace.clone()).collect()
    }

    pub fn pod(&self, id: &str) -> Option<&PodNode> {
        self.pods.iter().find(|p| p.id == id)
    }

    pub fn pods_in_namespace<'a>(&'a self, namespace: &'a str) -> impl Iterator<Item = &'a PodNode> {
        self.pods.iter().filter(move |p| p.namespace == namespace)
    }
}

/// `node-<name>` id for a compute node.
pub fn node_id(name: &str) -> String {
    format!("node-{name}")
}

/// `pod-<namespace>-<name>` id for a pod.
pub fn pod_id(namespace: &str, name: &str) -> String {
    format!("pod-{namespace}-{name}")
}

/// `svc-<namespace>-<name>` id for a service.
pub fn service_id(namespace: &str, name: &str) -> String {
    format!("svc-{namespace}-{name}")
}

/// `netpol-<namespace>-<name>` id for a network policy.
pub fn policy_id(namespace: &str, name: &str) -> String {
    format!("netpol-{namespace}-{name}")
}

/// Kubernetes label selector semantics: an empty selector matches all.
pub fn selector_matches(labels: &HashMap<String, String>, selector: &HashMap<String, String>) -> bool {
    selector
        .iter()
        .all(|(k, v)| labels.get(k).map(|lv| lv == v).unwrap_or(false))
}
