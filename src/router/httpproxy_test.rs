use super::HTTPProxyRouter;
use crate::crd::canary::{
    Canary, CanaryService, CanarySpec, CustomMetadata, HTTPMatchRule, StringMatch,
};
use crate::crd::httpproxy::{HTTPProxy, HTTPProxySpec};
use crate::router::builder::build_proxy_spec;
use crate::router::store::{MockProxyStore, StoreError};
use crate::router::{Router, RouterError};
use std::collections::BTreeMap;
use std::sync::Arc;

fn base_service() -> CanaryService {
    CanaryService {
        name: None,
        port: 9898,
        match_rules: vec![],
        timeout: None,
        retries: None,
        apex: None,
    }
}

fn make_canary(service: CanaryService) -> Canary {
    let mut canary = Canary::new("app", CanarySpec { service });
    canary.metadata.namespace = Some("ns".to_string());
    canary.metadata.uid = Some("f81cfe1e-9e7b-4f0a-8f2f-4f9a5abed7a9".to_string());
    canary
}

fn service_with_header_rule() -> CanaryService {
    let mut service = base_service();
    service.match_rules = vec![HTTPMatchRule {
        headers: BTreeMap::from([(
            "x-canary".to_string(),
            StringMatch {
                exact: Some("insider".to_string()),
                ..Default::default()
            },
        )]),
        uri: None,
    }];
    service
}

#[tokio::test]
async fn reconcile_creates_proxy_with_default_split() {
    let store = Arc::new(MockProxyStore::new());
    let router = HTTPProxyRouter::new(store.clone(), None);
    let canary = make_canary(base_service());

    router.reconcile(&canary).await.unwrap();

    assert_eq!(store.create_count(), 1);
    let proxy = store.stored("ns", "app").expect("proxy created");
    assert_eq!(proxy.spec.routes.len(), 1);

    let route = &proxy.spec.routes[0];
    assert_eq!(route.conditions[0].prefix, "/");
    assert_eq!(route.services.len(), 2);
    assert_eq!(route.services[0].name, "app-primary");
    assert_eq!(route.services[0].weight, 100);
    assert_eq!(route.services[1].name, "app-canary");
    assert_eq!(route.services[1].weight, 0);

    let primary_header = &route.services[0].request_headers_policy.as_ref().unwrap().set[0];
    assert_eq!(primary_header.name, "l5d-dst-override");
    assert_eq!(primary_header.value, "app-primary.ns.svc.cluster.local:9898");
    let canary_header = &route.services[1].request_headers_policy.as_ref().unwrap().set[0];
    assert_eq!(canary_header.value, "app-canary.ns.svc.cluster.local:9898");
}

#[tokio::test]
async fn created_proxy_is_owned_by_the_canary() {
    let store = Arc::new(MockProxyStore::new());
    let router = HTTPProxyRouter::new(store.clone(), None);
    let canary = make_canary(base_service());

    router.reconcile(&canary).await.unwrap();

    let proxy = store.stored("ns", "app").unwrap();
    let owners = proxy.metadata.owner_references.expect("owner references");
    assert_eq!(owners.len(), 1);
    assert_eq!(owners[0].kind, "Canary");
    assert_eq!(owners[0].api_version, "reitti.io/v1alpha1");
    assert_eq!(owners[0].name, "app");
    assert_eq!(owners[0].controller, Some(true));

    assert_eq!(proxy.status.expect("status seeded").current_status, "valid");
}

#[tokio::test]
async fn reconcile_is_idempotent() {
    let store = Arc::new(MockProxyStore::new());
    let router = HTTPProxyRouter::new(store.clone(), None);
    let canary = make_canary(base_service());

    router.reconcile(&canary).await.unwrap();
    router.reconcile(&canary).await.unwrap();

    assert_eq!(store.create_count(), 1);
    assert_eq!(store.update_count(), 0);
}

#[tokio::test]
async fn weight_only_divergence_causes_no_write() {
    let store = Arc::new(MockProxyStore::new());
    let router = HTTPProxyRouter::new(store.clone(), None);
    let canary = make_canary(base_service());

    // Live object matches the desired structure but carries a shifted split
    let mut proxy = HTTPProxy::new("app", build_proxy_spec(&canary, 60, 40));
    proxy.metadata.namespace = Some("ns".to_string());
    store.insert("ns", proxy);

    router.reconcile(&canary).await.unwrap();

    assert_eq!(store.create_count(), 0);
    assert_eq!(store.update_count(), 0);
    let stored = store.stored("ns", "app").unwrap();
    assert_eq!(stored.spec.routes[0].services[0].weight, 60);
}

#[tokio::test]
async fn structural_drift_resets_the_split() {
    let store = Arc::new(MockProxyStore::new());
    let router = HTTPProxyRouter::new(store.clone(), None);
    let canary = make_canary(base_service());

    router.reconcile(&canary).await.unwrap();
    router.set_routes(&canary, 30, 70, false).await.unwrap();

    let mut changed = canary.clone();
    changed.spec.service.timeout = Some("15s".to_string());
    router.reconcile(&changed).await.unwrap();

    let proxy = store.stored("ns", "app").unwrap();
    let route = &proxy.spec.routes[0];
    assert!(route.timeout_policy.is_some());
    assert_eq!(route.services[0].weight, 100);
    assert_eq!(route.services[1].weight, 0);
    assert_eq!(store.update_count(), 2);
}

#[tokio::test]
async fn weight_round_trip() {
    let store = Arc::new(MockProxyStore::new());
    let router = HTTPProxyRouter::new(store.clone(), None);
    let canary = make_canary(base_service());

    router.reconcile(&canary).await.unwrap();
    router.set_routes(&canary, 30, 70, false).await.unwrap();

    let (primary, canary_weight, mirrored) = router.get_routes(&canary).await.unwrap();
    assert_eq!(primary, 30);
    assert_eq!(canary_weight, 70);
    assert!(!mirrored);
}

#[tokio::test]
async fn fallback_route_keeps_primary_under_conditional_matching() {
    let store = Arc::new(MockProxyStore::new());
    let router = HTTPProxyRouter::new(store.clone(), None);
    let canary = make_canary(service_with_header_rule());

    router.reconcile(&canary).await.unwrap();
    router.set_routes(&canary, 40, 60, false).await.unwrap();

    let proxy = store.stored("ns", "app").unwrap();
    assert_eq!(proxy.spec.routes.len(), 2);

    let conditional = &proxy.spec.routes[0];
    assert!(conditional.conditions[0].header.is_some());
    assert_eq!(conditional.services[0].weight, 40);
    assert_eq!(conditional.services[1].weight, 60);

    let fallback = proxy.spec.routes.last().unwrap();
    assert!(fallback.conditions[0].header.is_none());
    assert_eq!(fallback.services[0].weight, 100);
    assert_eq!(fallback.services[1].weight, 0);

    // The first route carries the live split
    let (primary, canary_weight, _) = router.get_routes(&canary).await.unwrap();
    assert_eq!((primary, canary_weight), (40, 60));
}

#[tokio::test]
async fn set_routes_rejects_degenerate_weights() {
    let store = Arc::new(MockProxyStore::new());
    let router = HTTPProxyRouter::new(store.clone(), None);
    let canary = make_canary(base_service());

    router.reconcile(&canary).await.unwrap();

    let err = router.set_routes(&canary, 0, 0, false).await.unwrap_err();
    assert!(matches!(err, RouterError::NoValidWeights { .. }));
    assert_eq!(store.update_count(), 0);
}

#[tokio::test]
async fn set_routes_requires_an_existing_proxy() {
    let store = Arc::new(MockProxyStore::new());
    let router = HTTPProxyRouter::new(store.clone(), None);
    let canary = make_canary(base_service());

    let err = router.set_routes(&canary, 30, 70, false).await.unwrap_err();
    assert!(matches!(
        err,
        RouterError::Query {
            source: StoreError::NotFound,
            ..
        }
    ));
}

#[tokio::test]
async fn get_routes_requires_an_existing_proxy() {
    let store = Arc::new(MockProxyStore::new());
    let router = HTTPProxyRouter::new(store.clone(), None);
    let canary = make_canary(base_service());

    let err = router.get_routes(&canary).await.unwrap_err();
    assert!(matches!(
        err,
        RouterError::Query {
            source: StoreError::NotFound,
            ..
        }
    ));
}

#[tokio::test]
async fn get_routes_rejects_a_proxy_without_routes() {
    let store = Arc::new(MockProxyStore::new());
    let router = HTTPProxyRouter::new(store.clone(), None);
    let canary = make_canary(base_service());

    let mut proxy = HTTPProxy::new("app", HTTPProxySpec::default());
    proxy.metadata.namespace = Some("ns".to_string());
    store.insert("ns", proxy);

    let err = router.get_routes(&canary).await.unwrap_err();
    assert!(matches!(err, RouterError::ServicesNotFound { .. }));
}

#[tokio::test]
async fn get_routes_rejects_a_route_with_missing_backends() {
    let store = Arc::new(MockProxyStore::new());
    let router = HTTPProxyRouter::new(store.clone(), None);
    let canary = make_canary(base_service());

    let mut spec = build_proxy_spec(&canary, 100, 0);
    spec.routes[0].services.truncate(1);
    let mut proxy = HTTPProxy::new("app", spec);
    proxy.metadata.namespace = Some("ns".to_string());
    store.insert("ns", proxy);

    let err = router.get_routes(&canary).await.unwrap_err();
    assert!(matches!(err, RouterError::ServicesNotFound { .. }));
}

#[tokio::test]
async fn get_routes_requires_the_primary_backend() {
    let store = Arc::new(MockProxyStore::new());
    let router = HTTPProxyRouter::new(store.clone(), None);
    let canary = make_canary(base_service());

    let mut spec = build_proxy_spec(&canary, 100, 0);
    spec.routes[0].services[0].name = "someone-else".to_string();
    let mut proxy = HTTPProxy::new("app", spec);
    proxy.metadata.namespace = Some("ns".to_string());
    store.insert("ns", proxy);

    let err = router.get_routes(&canary).await.unwrap_err();
    assert!(matches!(err, RouterError::ServicesNotFound { .. }));
}

#[tokio::test]
async fn get_routes_derives_canary_weight_from_primary() {
    let store = Arc::new(MockProxyStore::new());
    let router = HTTPProxyRouter::new(store.clone(), None);
    let canary = make_canary(base_service());

    // Live weights summing to 90, e.g. after a manual edit; the canary
    // weight is still derived as the complement of primary
    let mut proxy = HTTPProxy::new("app", build_proxy_spec(&canary, 60, 30));
    proxy.metadata.namespace = Some("ns".to_string());
    store.insert("ns", proxy);

    let (primary, canary_weight, _) = router.get_routes(&canary).await.unwrap();
    assert_eq!(primary, 60);
    assert_eq!(canary_weight, 40);
}

#[tokio::test]
async fn mirroring_is_not_supported() {
    let store = Arc::new(MockProxyStore::new());
    let router = HTTPProxyRouter::new(store.clone(), None);
    let canary = make_canary(base_service());

    router.reconcile(&canary).await.unwrap();
    router.set_routes(&canary, 50, 50, true).await.unwrap();

    let (_, _, mirrored) = router.get_routes(&canary).await.unwrap();
    assert!(!mirrored);
}

#[tokio::test]
async fn ingress_class_overrides_apex_annotations() {
    let store = Arc::new(MockProxyStore::new());
    let router = HTTPProxyRouter::new(store.clone(), Some("contour".to_string()));

    let mut service = base_service();
    service.apex = Some(CustomMetadata {
        labels: BTreeMap::new(),
        annotations: BTreeMap::from([("team".to_string(), "delivery".to_string())]),
    });
    let canary = make_canary(service);

    router.reconcile(&canary).await.unwrap();

    let proxy = store.stored("ns", "app").unwrap();
    let annotations = proxy.metadata.annotations.unwrap();
    assert_eq!(annotations.len(), 1);
    assert_eq!(
        annotations.get("projectcontour.io/ingress.class").map(String::as_str),
        Some("contour")
    );
}

#[tokio::test]
async fn apex_metadata_is_copied_and_filtered() {
    let store = Arc::new(MockProxyStore::new());
    let router = HTTPProxyRouter::new(store.clone(), None);

    let mut service = base_service();
    service.apex = Some(CustomMetadata {
        labels: BTreeMap::from([("team".to_string(), "delivery".to_string())]),
        annotations: BTreeMap::from([
            (
                "kubectl.kubernetes.io/last-applied-configuration".to_string(),
                "{}".to_string(),
            ),
            ("team".to_string(), "delivery".to_string()),
        ]),
    });
    let canary = make_canary(service);

    router.reconcile(&canary).await.unwrap();

    let proxy = store.stored("ns", "app").unwrap();
    assert_eq!(
        proxy.metadata.labels.unwrap().get("team").map(String::as_str),
        Some("delivery")
    );
    let annotations = proxy.metadata.annotations.unwrap();
    assert_eq!(annotations.len(), 1);
    assert_eq!(annotations.get("team").map(String::as_str), Some("delivery"));
}

#[tokio::test]
async fn finalize_is_a_noop() {
    let store = Arc::new(MockProxyStore::new());
    let router = HTTPProxyRouter::new(store.clone(), None);
    let canary = make_canary(base_service());

    router.finalize(&canary).await.unwrap();

    assert_eq!(store.create_count(), 0);
    assert_eq!(store.update_count(), 0);
}
