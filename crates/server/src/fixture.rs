//! File-backed resource provider
//!
//! Serves a recorded cluster snapshot from a JSON file, so the server can
//! run end to end without a live cluster. The live fetch layer is an
//! external collaborator implementing the same trait.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use topolens_engine::provider::{
    async_trait, PlatformInfo, RawEndpoints, RawNetworkPolicy, RawNode, RawPod, RawService,
    ResourceProvider,
};
use topolens_engine::ProviderError;

/// On-disk shape of a recorded cluster snapshot.
///
/// `network_policies: null` records a cluster without the networking API
/// group; an empty list records a cluster that supports it but has none.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterFixture {
    #[serde(default)]
    pub nodes: Vec<RawNode>,
    #[serde(default)]
    pub pods: Vec<RawPod>,
    #[serde(default)]
    pub services: Vec<RawService>,
    #[serde(default)]
    pub endpoints: Vec<RawEndpoints>,
    #[serde(default)]
    pub network_policies: Option<Vec<RawNetworkPolicy>>,
    pub platform: PlatformInfo,
}

/// `ResourceProvider` over a fixture loaded once at startup.
pub struct FileProvider {
    fixture: ClusterFixture,
}

impl FileProvider {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading cluster fixture {}", path.display()))?;
        let fixture: ClusterFixture = serde_json::from_str(&raw)
            .with_context(|| format!("parsing cluster fixture {}", path.display()))?;
        Ok(Self { fixture })
    }

    pub fn new(fixture: ClusterFixture) -> Self {
        Self { fixture }
    }
}

#[async_trait]
impl ResourceProvider for FileProvider {
    async fn list_nodes(&self) -> Result<Vec<RawNode>, ProviderError> {
        Ok(self.fixture.nodes.clone())
    }

    async fn list_pods(&self) -> Result<Vec<RawPod>, ProviderError> {
        Ok(self.fixture.pods.clone())
    }

    async fn list_services(&self) -> Result<Vec<RawService>, ProviderError> {
        Ok(self.fixture.services.clone())
    }

    async fn list_endpoints(&self) -> Result<Vec<RawEndpoints>, ProviderError> {
        Ok(self.fixture.endpoints.clone())
    }

    async fn list_network_policies(&self) -> Result<Vec<RawNetworkPolicy>, ProviderError> {
        self.fixture
            .network_policies
            .clone()
            .ok_or_else(|| ProviderError::unsupported("networkpolicies"))
    }

    async fn platform_info(&self) -> Result<PlatformInfo, ProviderError> {
        Ok(self.fixture.platform.clone())
    }
}

/// Minimal single-node fixture, used when no fixture file is configured.
pub fn default_fixture() -> ClusterFixture {
    use topolens_engine::provider::{Platform, RawCondition};

    ClusterFixture {
        nodes: vec![RawNode {
            name: "local-node".to_string(),
            labels: HashMap::from([(
                "node-role.kubernetes.io/control-plane".to_string(),
                String::new(),
            )]),
            internal_ip: Some("127.0.0.1".to_string()),
            capacity: HashMap::new(),
            allocatable: HashMap::new(),
            conditions: vec![RawCondition {
                condition_type: "Ready".to_string(),
                status: "True".to_string(),
                reason: None,
            }],
        }],
        pods: vec![],
        services: vec![],
        endpoints: vec![],
        network_policies: Some(vec![]),
        platform: PlatformInfo {
            cluster_name: "local".to_string(),
            kubernetes_version: "unknown".to_string(),
            platform: Platform::Other,
        },
    }
}
