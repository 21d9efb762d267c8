//! Access to HTTPProxy objects in the cluster
//!
//! Production code uses `KubeProxyStore` backed by the Kubernetes API.
//! Tests use `MockProxyStore` which keeps objects in memory and counts
//! writes for idempotency assertions.

use crate::crd::httpproxy::HTTPProxy;
use async_trait::async_trait;
use kube::api::{Api, PostParams};
use thiserror::Error;

/// Errors returned by the object store
#[derive(Debug, Error)]
pub enum StoreError {
    /// The object does not exist; recovered by Reconcile's create path,
    /// fatal everywhere else
    #[error("not found")]
    NotFound,

    /// Any other API failure
    #[error(transparent)]
    Api(#[from] kube::Error),
}

/// Declarative store for HTTPProxy objects, keyed by namespace and name
///
/// Updates rely on the store's optimistic concurrency: a stale write
/// surfaces as an ordinary error and is never retried here.
#[async_trait]
pub trait ProxyStore: Send + Sync {
    async fn get(&self, namespace: &str, name: &str) -> Result<HTTPProxy, StoreError>;

    async fn create(&self, namespace: &str, proxy: &HTTPProxy) -> Result<HTTPProxy, StoreError>;

    async fn update(&self, namespace: &str, proxy: &HTTPProxy) -> Result<HTTPProxy, StoreError>;
}

/// Production store backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeProxyStore {
    client: kube::Client,
}

impl KubeProxyStore {
    pub fn new(client: kube::Client) -> Self {
        KubeProxyStore { client }
    }

    fn api(&self, namespace: &str) -> Api<HTTPProxy> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ProxyStore for KubeProxyStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<HTTPProxy, StoreError> {
        match self.api(namespace).get(name).await {
            Ok(proxy) => Ok(proxy),
            Err(kube::Error::Api(err)) if err.code == 404 => Err(StoreError::NotFound),
            Err(e) => Err(StoreError::Api(e)),
        }
    }

    async fn create(&self, namespace: &str, proxy: &HTTPProxy) -> Result<HTTPProxy, StoreError> {
        Ok(self
            .api(namespace)
            .create(&PostParams::default(), proxy)
            .await?)
    }

    async fn update(&self, namespace: &str, proxy: &HTTPProxy) -> Result<HTTPProxy, StoreError> {
        let name = proxy.metadata.name.as_deref().unwrap_or_default();
        Ok(self
            .api(namespace)
            .replace(name, &PostParams::default(), proxy)
            .await?)
    }
}

/// Mock store for testing - keeps objects in memory and counts writes
#[cfg(test)]
#[derive(Default)]
pub struct MockProxyStore {
    objects: std::sync::Mutex<std::collections::HashMap<(String, String), HTTPProxy>>,
    creates: std::sync::atomic::AtomicUsize,
    updates: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
impl MockProxyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object without counting it as a write
    pub fn insert(&self, namespace: &str, proxy: HTTPProxy) {
        let name = proxy.metadata.name.clone().unwrap_or_default();
        self.objects
            .lock()
            .unwrap()
            .insert((namespace.to_string(), name), proxy);
    }

    pub fn stored(&self, namespace: &str, name: &str) -> Option<HTTPProxy> {
        self.objects
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn create_count(&self) -> usize {
        self.creates.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub fn update_count(&self) -> usize {
        self.updates.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
#[async_trait]
#[allow(clippy::unwrap_used)]
impl ProxyStore for MockProxyStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<HTTPProxy, StoreError> {
        self.objects
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn create(&self, namespace: &str, proxy: &HTTPProxy) -> Result<HTTPProxy, StoreError> {
        self.creates
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.insert(namespace, proxy.clone());
        Ok(proxy.clone())
    }

    async fn update(&self, namespace: &str, proxy: &HTTPProxy) -> Result<HTTPProxy, StoreError> {
        let name = proxy.metadata.name.clone().unwrap_or_default();
        let key = (namespace.to_string(), name);

        let mut objects = self.objects.lock().unwrap();
        if !objects.contains_key(&key) {
            return Err(StoreError::NotFound);
        }
        self.updates
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        objects.insert(key, proxy.clone());
        Ok(proxy.clone())
    }
}
