//! Topology and diagnostic reasoning engine for Kubernetes clusters
//!
//! This crate provides the core functionality for:
//! - Building a typed topology graph from raw cluster resources
//! - Rule-based diagnostic evaluation with remediation suggestions
//! - A retention-bounded context buffer of historical snapshots
//! - The Observe → Reason → Act scheduler loop
//!
//! Cluster access is abstracted behind [`provider::ResourceProvider`]; the
//! engine itself never performs a cluster write.

pub mod context;
pub mod diagnostics;
pub mod error;
pub mod models;
pub mod observability;
pub mod provider;
pub mod reasoning;
pub mod topology;

pub use context::{BufferConfig, BufferStats, ContextBuffer, Snapshot};
pub use diagnostics::DiagnosticRunner;
pub use error::{ProviderError, QueryError};
pub use observability::EngineMetrics;
pub use provider::ResourceProvider;
pub use reasoning::{LoopConfig, LoopStatus, ReasoningLoop};
pub use topology::TopologyBuilder;
