//! Error taxonomy for the topology and diagnostic engine
//!
//! Nothing here is fatal to the process: a provider failure aborts the
//! current build and is surfaced to the caller, a single check failure is
//! contained to a status-`error` check, and querying the loop before its
//! first completed cycle yields `QueryError::NotFound`.

use thiserror::Error;

/// Failure while fetching cluster resources from the provider.
///
/// `Unsupported` is a distinguishable condition for clusters that lack an
/// API group entirely (NetworkPolicies on some distributions); the builder
/// degrades it to an empty resource set instead of aborting.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("{resource} API not supported on this cluster")]
    Unsupported { resource: &'static str },

    #[error("failed to list {resource}: {message}")]
    Fetch {
        resource: &'static str,
        message: String,
    },
}

impl ProviderError {
    pub fn fetch(resource: &'static str, message: impl Into<String>) -> Self {
        Self::Fetch {
            resource,
            message: message.into(),
        }
    }

    pub fn unsupported(resource: &'static str) -> Self {
        Self::Unsupported { resource }
    }

    /// Which resource listing failed.
    pub fn resource(&self) -> &'static str {
        match self {
            Self::Unsupported { resource } => resource,
            Self::Fetch { resource, .. } => resource,
        }
    }
}

/// Failure when querying loop results that do not exist yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueryError {
    /// No reasoning cycle has completed, so there is no result to return.
    /// Maps to 404 at the API boundary.
    #[error("no completed reasoning cycle yet")]
    NotFound,
}
