//! Read-only cluster resource provider seam
//!
//! The engine never talks to a Kubernetes API server directly. Everything it
//! knows about the cluster arrives through the [`ResourceProvider`] trait as
//! raw, untyped-by-the-graph resource lists. Implementations live outside
//! the engine (a kube client, a recorded fixture file, a test double).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub use async_trait::async_trait;

use crate::error::ProviderError;
use crate::models::topology::Protocol;

/// Node condition as reported by the kubelet (`Ready`, `MemoryPressure`, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawCondition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: String,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Cluster node as listed from the API server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawNode {
    pub name: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    /// InternalIP address, if one has been assigned.
    #[serde(default)]
    pub internal_ip: Option<String>,
    #[serde(default)]
    pub capacity: HashMap<String, String>,
    #[serde(default)]
    pub allocatable: HashMap<String, String>,
    #[serde(default)]
    pub conditions: Vec<RawCondition>,
}

/// Port exposed by a container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawContainerPort {
    pub port: u16,
    #[serde(default)]
    pub protocol: Protocol,
    #[serde(default)]
    pub name: Option<String>,
}

/// Container within a pod spec.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawContainer {
    pub name: String,
    pub image: String,
    #[serde(default)]
    pub ports: Vec<RawContainerPort>,
}

/// Pod as listed from the API server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPod {
    pub name: String,
    pub namespace: String,
    /// Node the pod is scheduled on; `None` while Pending/unscheduled.
    #[serde(default)]
    pub node_name: Option<String>,
    /// Pod IP; `None` until the CNI has assigned one.
    #[serde(default)]
    pub ip: Option<String>,
    pub phase: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub containers: Vec<RawContainer>,
    /// Sum of container restart counts, used for restart-loop history.
    #[serde(default)]
    pub restart_count: u32,
}

/// Service port mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawServicePort {
    pub port: u16,
    #[serde(default)]
    pub target_port: Option<String>,
    #[serde(default)]
    pub protocol: Protocol,
    #[serde(default)]
    pub name: Option<String>,
}

/// Service as listed from the API server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawService {
    pub name: String,
    pub namespace: String,
    pub service_type: String,
    #[serde(default)]
    pub cluster_ip: Option<String>,
    /// First load-balancer ingress IP or hostname, when present.
    #[serde(default)]
    pub external_ip: Option<String>,
    #[serde(default)]
    pub ports: Vec<RawServicePort>,
    #[serde(default)]
    pub selector: HashMap<String, String>,
}

/// Endpoints object with subset addresses flattened to ready IPs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEndpoints {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub addresses: Vec<String>,
}

/// Port restriction on a NetworkPolicy rule. `port: None` means the rule
/// applies to all ports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPolicyPort {
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub protocol: Protocol,
}

/// Peer selector on a NetworkPolicy rule.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawPolicyPeer {
    #[serde(default)]
    pub pod_selector: Option<HashMap<String, String>>,
    #[serde(default)]
    pub namespace_selector: Option<HashMap<String, String>>,
    #[serde(default)]
    pub ip_block_cidr: Option<String>,
}

/// One ingress or egress rule. An empty `ports` list means all ports.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawPolicyRule {
    #[serde(default)]
    pub ports: Vec<RawPolicyPort>,
    #[serde(default)]
    pub peers: Vec<RawPolicyPeer>,
}

/// NetworkPolicy as listed from the API server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawNetworkPolicy {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub pod_selector: HashMap<String, String>,
    /// Declared policy types: "Ingress", "Egress", or both.
    #[serde(default)]
    pub policy_types: Vec<String>,
    #[serde(default)]
    pub ingress: Vec<RawPolicyRule>,
    #[serde(default)]
    pub egress: Vec<RawPolicyRule>,
}

/// Kubernetes distribution the cluster runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Platform {
    AksArc,
    K3s,
    Aks,
    Eks,
    Gke,
    Other,
}

impl Default for Platform {
    fn default() -> Self {
        Self::Other
    }
}

/// Cluster-level metadata detected by the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformInfo {
    pub cluster_name: String,
    pub kubernetes_version: String,
    #[serde(default)]
    pub platform: Platform,
}

/// Read-only queries against the cluster.
///
/// Each call may fail independently. `list_network_policies` must return
/// [`ProviderError::Unsupported`] when the cluster lacks the networking API
/// group, so callers can distinguish "no such API" from a transient failure.
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    async fn list_nodes(&self) -> Result<Vec<RawNode>, ProviderError>;

    async fn list_pods(&self) -> Result<Vec<RawPod>, ProviderError>;

    async fn list_services(&self) -> Result<Vec<RawService>, ProviderError>;

    async fn list_endpoints(&self) -> Result<Vec<RawEndpoints>, ProviderError>;

    async fn list_network_policies(&self) -> Result<Vec<RawNetworkPolicy>, ProviderError>;

    async fn platform_info(&self) -> Result<PlatformInfo, ProviderError>;
}
