//! Routing backends for progressive traffic shifting
//!
//! A router keeps one external routing resource in sync with a Canary and
//! exposes the primary/canary weight split to the rollout control loop. The
//! loop calls [`Router::reconcile`] once per step to guarantee structure,
//! then [`Router::set_routes`] to shift traffic and [`Router::get_routes`]
//! to read the current split back for its progress decisions.

pub mod builder;
pub mod httpproxy;
pub mod store;

use crate::crd::canary::Canary;
use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;

use store::StoreError;

/// Annotation keys never copied onto generated resources
const DENIED_ANNOTATIONS: &[&str] = &[
    "kubectl.kubernetes.io/last-applied-configuration",
    "kubernetes.io/change-cause",
];

/// Errors surfaced by router operations
///
/// Every variant carries the `{name}.{namespace}` identity of the routing
/// resource the call acted on. All errors are terminal for the single call;
/// retry and backoff belong to the rollout control loop.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("HTTPProxy {name}.{namespace} get query error: {source}")]
    Query {
        name: String,
        namespace: String,
        #[source]
        source: StoreError,
    },

    #[error("HTTPProxy {name}.{namespace} create error: {source}")]
    Create {
        name: String,
        namespace: String,
        #[source]
        source: StoreError,
    },

    #[error("HTTPProxy {name}.{namespace} update error: {source}")]
    Update {
        name: String,
        namespace: String,
        #[source]
        source: StoreError,
    },

    #[error("HTTPProxy {name}.{namespace} update failed: no valid weights")]
    NoValidWeights { name: String, namespace: String },

    #[error("HTTPProxy {name}.{namespace} services not found")]
    ServicesNotFound { name: String, namespace: String },

    #[error("Canary missing object metadata: {0}")]
    MissingObjectMeta(&'static str),
}

/// Uniform contract implemented by every routing backend
#[async_trait]
pub trait Router: Send + Sync {
    /// Create the routing resource or bring its structure in sync
    ///
    /// Never shifts traffic: the desired spec is always built at the
    /// default 100/0 split, and the structural diff excludes weights.
    async fn reconcile(&self, canary: &Canary) -> Result<(), RouterError>;

    /// Read the current (primary, canary, mirrored) split
    async fn get_routes(&self, canary: &Canary) -> Result<(i32, i32, bool), RouterError>;

    /// Write a new weight split, regenerating the full route structure
    async fn set_routes(
        &self,
        canary: &Canary,
        primary_weight: i32,
        canary_weight: i32,
        mirror: bool,
    ) -> Result<(), RouterError>;

    /// Clean up backend-specific state before the canary is deleted
    async fn finalize(&self, canary: &Canary) -> Result<(), RouterError>;
}

/// Strip machine-managed annotations from apex metadata
///
/// Generated resources must not inherit markers like the kubectl
/// last-applied-configuration blob; the deny-list is fixed.
pub fn filter_metadata(annotations: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    annotations
        .iter()
        .filter(|(key, _)| !DENIED_ANNOTATIONS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}
