//! Desired-spec construction for HTTPProxy routes
//!
//! Pure functions: rollout intent in, canonical `HTTPProxySpec` out. The
//! builder never invents weights; the unconditional fallback route under
//! conditional matching is the single hard-coded exception.

use crate::crd::canary::{Canary, HTTPMatchRule, StringMatch};
use crate::crd::httpproxy::{
    HTTPProxySpec, HeaderMatchCondition, HeaderValue, HeadersPolicy, MatchCondition, RetryPolicy,
    Route, Service, TimeoutPolicy,
};
use kube::ResourceExt;

/// Idle timeout applied whenever a response timeout is configured
const IDLE_TIMEOUT: &str = "5m";

/// Header consumed by the Linkerd sidecar to pin the destination
const LINKERD_DST_OVERRIDE: &str = "l5d-dst-override";

/// Build the canonical HTTPProxySpec for a canary at the given weight split
///
/// Without match rules the spec holds a single prefix route carrying the
/// caller's weights. With match rules, one route per rule (one condition per
/// header in the rule) precedes an unconditional fallback route pinned to
/// 100/0 on primary: a shifted split only applies to traffic that satisfies
/// a match condition, everything else stays on primary.
pub fn build_proxy_spec(canary: &Canary, primary_weight: i32, canary_weight: i32) -> HTTPProxySpec {
    let (_, primary_name, canary_name) = canary.service_names();
    let prefix = make_prefix(canary);
    let rules = &canary.spec.service.match_rules;

    if rules.is_empty() {
        return HTTPProxySpec {
            routes: vec![Route {
                conditions: vec![MatchCondition {
                    prefix,
                    header: None,
                }],
                timeout_policy: make_timeout_policy(canary),
                retry_policy: make_retry_policy(canary),
                services: make_services(
                    canary,
                    &primary_name,
                    &canary_name,
                    primary_weight,
                    canary_weight,
                ),
            }],
        };
    }

    let mut routes: Vec<Route> = rules
        .iter()
        .map(|rule| Route {
            conditions: make_conditions(&prefix, rule),
            timeout_policy: make_timeout_policy(canary),
            retry_policy: make_retry_policy(canary),
            services: make_services(
                canary,
                &primary_name,
                &canary_name,
                primary_weight,
                canary_weight,
            ),
        })
        .collect();

    // Unmatched traffic always lands on primary, whatever the caller split
    routes.push(Route {
        conditions: vec![MatchCondition {
            prefix,
            header: None,
        }],
        timeout_policy: make_timeout_policy(canary),
        retry_policy: make_retry_policy(canary),
        services: make_services(canary, &primary_name, &canary_name, 100, 0),
    });

    HTTPProxySpec { routes }
}

/// Compare two specs with every backend weight masked out
///
/// Weights are owned by the weight-shifting loop; structural reconciliation
/// must not see them.
pub fn specs_differ_ignoring_weights(desired: &HTTPProxySpec, current: &HTTPProxySpec) -> bool {
    strip_weights(desired) != strip_weights(current)
}

fn strip_weights(spec: &HTTPProxySpec) -> HTTPProxySpec {
    let mut masked = spec.clone();
    for route in &mut masked.routes {
        for service in &mut route.services {
            service.weight = 0;
        }
    }
    masked
}

/// Path prefix shared by every generated condition
///
/// Only the first match rule's URI prefix is consulted; anything else falls
/// back to "/".
fn make_prefix(canary: &Canary) -> String {
    canary
        .spec
        .service
        .match_rules
        .first()
        .and_then(|rule| rule.uri.as_ref())
        .and_then(|uri| uri.prefix.as_deref())
        .filter(|prefix| !prefix.is_empty())
        .unwrap_or("/")
        .to_string()
}

/// Expand one match rule into route conditions
///
/// One condition per header name, each pairing the shared prefix with a
/// single header clause. A rule without headers matches on the prefix alone.
fn make_conditions(prefix: &str, rule: &HTTPMatchRule) -> Vec<MatchCondition> {
    if rule.headers.is_empty() {
        return vec![MatchCondition {
            prefix: prefix.to_string(),
            header: None,
        }];
    }

    rule.headers
        .iter()
        .map(|(name, string_match)| MatchCondition {
            prefix: prefix.to_string(),
            header: Some(make_header_condition(name, string_match)),
        })
        .collect()
}

/// Derive the single clause for a header match
///
/// Precedence: exact, then suffix, then prefix. Suffix and prefix both map
/// onto the contains form the proxy supports; empty strings count as unset.
fn make_header_condition(name: &str, string_match: &StringMatch) -> HeaderMatchCondition {
    let non_empty =
        |value: &Option<String>| value.as_deref().filter(|v| !v.is_empty()).map(str::to_string);

    if let Some(exact) = non_empty(&string_match.exact) {
        return HeaderMatchCondition {
            name: name.to_string(),
            exact: Some(exact),
            contains: None,
        };
    }
    if let Some(suffix) = non_empty(&string_match.suffix) {
        return HeaderMatchCondition {
            name: name.to_string(),
            exact: None,
            contains: Some(suffix),
        };
    }
    if let Some(prefix) = non_empty(&string_match.prefix) {
        return HeaderMatchCondition {
            name: name.to_string(),
            exact: None,
            contains: Some(prefix),
        };
    }

    HeaderMatchCondition {
        name: name.to_string(),
        exact: None,
        contains: None,
    }
}

/// Timeout policy for generated routes, when the intent configures one
fn make_timeout_policy(canary: &Canary) -> Option<TimeoutPolicy> {
    canary
        .spec
        .service
        .timeout
        .as_deref()
        .filter(|timeout| !timeout.is_empty())
        .map(|timeout| TimeoutPolicy {
            response: timeout.to_string(),
            idle: IDLE_TIMEOUT.to_string(),
        })
}

/// Retry policy for generated routes, when the intent configures one
///
/// Trigger tokens are split on commas verbatim; validating them is the
/// intent owner's concern.
fn make_retry_policy(canary: &Canary) -> Option<RetryPolicy> {
    canary
        .spec
        .service
        .retries
        .as_ref()
        .map(|retries| RetryPolicy {
            num_retries: i64::from(retries.attempts),
            per_try_timeout: retries.per_try_timeout.clone(),
            retry_on: retries.retry_on.split(',').map(str::to_string).collect(),
        })
}

fn make_services(
    canary: &Canary,
    primary_name: &str,
    canary_name: &str,
    primary_weight: i32,
    canary_weight: i32,
) -> Vec<Service> {
    vec![
        make_service(canary, primary_name, primary_weight),
        make_service(canary, canary_name, canary_weight),
    ]
}

fn make_service(canary: &Canary, name: &str, weight: i32) -> Service {
    Service {
        name: name.to_string(),
        port: canary.spec.service.port,
        weight: i64::from(weight),
        request_headers_policy: Some(HeadersPolicy {
            set: vec![make_linkerd_header_value(canary, name)],
        }),
    }
}

/// Pin the Linkerd destination so the sidecar honors the proxy's split
fn make_linkerd_header_value(canary: &Canary, service_name: &str) -> HeaderValue {
    HeaderValue {
        name: LINKERD_DST_OVERRIDE.to_string(),
        value: format!(
            "{}.{}.svc.cluster.local:{}",
            service_name,
            canary.namespace().unwrap_or_default(),
            canary.spec.service.port
        ),
    }
}

#[cfg(test)]
#[path = "builder_test.rs"]
mod tests;
