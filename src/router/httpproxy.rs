//! HTTPProxy routing backend
//!
//! One Contour HTTPProxy per canary, keyed by the apex service name.
//! `reconcile` guarantees structure and leaves the live weight split alone;
//! `set_routes`/`get_routes` own the split.

use super::builder::{build_proxy_spec, specs_differ_ignoring_weights};
use super::store::{ProxyStore, StoreError};
use super::{filter_metadata, Router, RouterError};
use crate::crd::canary::Canary;
use crate::crd::httpproxy::{HTTPProxy, HTTPProxySpec, HTTPProxyStatus};
use async_trait::async_trait;
use kube::api::ObjectMeta;
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Annotation forcing the Contour ingress class on generated proxies
const INGRESS_CLASS_ANNOTATION: &str = "projectcontour.io/ingress.class";

/// Routing backend managing Contour HTTPProxy objects
pub struct HTTPProxyRouter {
    store: Arc<dyn ProxyStore>,
    ingress_class: Option<String>,
}

impl HTTPProxyRouter {
    /// Create a router
    ///
    /// A non-empty ingress class replaces all apex annotations on newly
    /// created proxies with the single ingress-class annotation.
    pub fn new(store: Arc<dyn ProxyStore>, ingress_class: Option<String>) -> Self {
        HTTPProxyRouter {
            store,
            ingress_class,
        }
    }

    /// Construct the initial HTTPProxy for an absent apex resource
    fn new_proxy(
        &self,
        canary: &Canary,
        apex_name: &str,
        namespace: &str,
        spec: HTTPProxySpec,
    ) -> Result<HTTPProxy, RouterError> {
        let owner_ref = canary
            .controller_owner_ref(&())
            .ok_or(RouterError::MissingObjectMeta("name or uid"))?;

        let metadata = canary.spec.service.apex.clone().unwrap_or_default();

        let mut annotations = filter_metadata(&metadata.annotations);
        if let Some(class) = self.ingress_class.as_deref().filter(|c| !c.is_empty()) {
            annotations = BTreeMap::from([(INGRESS_CLASS_ANNOTATION.to_string(), class.to_string())]);
        }

        let mut proxy = HTTPProxy::new(apex_name, spec);
        proxy.metadata = ObjectMeta {
            name: Some(apex_name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(metadata.labels),
            annotations: Some(annotations),
            owner_references: Some(vec![owner_ref]),
            ..Default::default()
        };
        proxy.status = Some(HTTPProxyStatus {
            current_status: "valid".to_string(),
            description: "valid HTTPProxy".to_string(),
        });

        Ok(proxy)
    }
}

#[async_trait]
impl Router for HTTPProxyRouter {
    async fn reconcile(&self, canary: &Canary) -> Result<(), RouterError> {
        let (apex_name, _, _) = canary.service_names();
        let namespace = canary
            .namespace()
            .ok_or(RouterError::MissingObjectMeta("namespace"))?;

        // Reconcile never shifts traffic; structure is built at the default split
        let new_spec = build_proxy_spec(canary, 100, 0);

        let proxy = match self.store.get(&namespace, &apex_name).await {
            Ok(proxy) => proxy,
            Err(StoreError::NotFound) => {
                let proxy = self.new_proxy(canary, &apex_name, &namespace, new_spec)?;
                self.store
                    .create(&namespace, &proxy)
                    .await
                    .map_err(|source| RouterError::Create {
                        name: apex_name.clone(),
                        namespace: namespace.clone(),
                        source,
                    })?;
                info!(
                    canary = %canary.name_any(),
                    namespace = %namespace,
                    proxy = %apex_name,
                    "HTTPProxy created"
                );
                return Ok(());
            }
            Err(source) => {
                return Err(RouterError::Query {
                    name: apex_name,
                    namespace,
                    source,
                });
            }
        };

        // Keep the live destination weights: the diff must not see them.
        // A structural drift replaces the whole spec, which resets the
        // split to 100/0 until the next set_routes call.
        if specs_differ_ignoring_weights(&new_spec, &proxy.spec) {
            let mut updated = proxy;
            updated.spec = new_spec;

            self.store
                .update(&namespace, &updated)
                .await
                .map_err(|source| RouterError::Update {
                    name: apex_name.clone(),
                    namespace: namespace.clone(),
                    source,
                })?;
            info!(
                canary = %canary.name_any(),
                namespace = %namespace,
                proxy = %apex_name,
                "HTTPProxy updated"
            );
        } else {
            debug!(
                canary = %canary.name_any(),
                namespace = %namespace,
                proxy = %apex_name,
                "HTTPProxy unchanged"
            );
        }

        Ok(())
    }

    async fn get_routes(&self, canary: &Canary) -> Result<(i32, i32, bool), RouterError> {
        let (apex_name, primary_name, _) = canary.service_names();
        let namespace = canary
            .namespace()
            .ok_or(RouterError::MissingObjectMeta("namespace"))?;

        let proxy = self
            .store
            .get(&namespace, &apex_name)
            .await
            .map_err(|source| RouterError::Query {
                name: apex_name.clone(),
                namespace: namespace.clone(),
                source,
            })?;

        let first_route = proxy
            .spec
            .routes
            .first()
            .filter(|route| route.services.len() >= 2)
            .ok_or_else(|| RouterError::ServicesNotFound {
                name: apex_name.clone(),
                namespace: namespace.clone(),
            })?;

        // The canary weight is derived, never read from the canary backend
        for service in &first_route.services {
            if service.name == primary_name {
                let primary_weight = service.weight as i32;
                // Mirroring is not supported by this backend
                return Ok((primary_weight, 100 - primary_weight, false));
            }
        }

        Err(RouterError::ServicesNotFound {
            name: apex_name,
            namespace,
        })
    }

    async fn set_routes(
        &self,
        canary: &Canary,
        primary_weight: i32,
        canary_weight: i32,
        _mirror: bool,
    ) -> Result<(), RouterError> {
        let (apex_name, _, _) = canary.service_names();
        let namespace = canary
            .namespace()
            .ok_or(RouterError::MissingObjectMeta("namespace"))?;

        if primary_weight == 0 && canary_weight == 0 {
            return Err(RouterError::NoValidWeights {
                name: apex_name,
                namespace,
            });
        }

        // Unlike reconcile, a missing proxy is fatal here
        let mut proxy = self
            .store
            .get(&namespace, &apex_name)
            .await
            .map_err(|source| RouterError::Query {
                name: apex_name.clone(),
                namespace: namespace.clone(),
                source,
            })?;

        // Regenerate the whole structure: match rules or policies may have
        // changed since the last reconcile
        proxy.spec = build_proxy_spec(canary, primary_weight, canary_weight);

        self.store
            .update(&namespace, &proxy)
            .await
            .map_err(|source| RouterError::Update {
                name: apex_name.clone(),
                namespace: namespace.clone(),
                source,
            })?;

        debug!(
            canary = %canary.name_any(),
            namespace = %namespace,
            proxy = %apex_name,
            primary_weight,
            canary_weight,
            "HTTPProxy weights updated"
        );

        Ok(())
    }

    async fn finalize(&self, _canary: &Canary) -> Result<(), RouterError> {
        // Nothing to tear down; the owner reference handles garbage collection
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Tests can use unwrap/expect for brevity
#[path = "httpproxy_test.rs"]
mod tests;
