use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// HTTPProxy is the Contour ingress Custom Resource the router manages
///
/// Only the subset of the projectcontour.io/v1 schema that traffic splitting
/// touches is modeled. Every spec type derives `PartialEq` so reconciliation
/// can compare whole specs instead of merging fields.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    group = "projectcontour.io",
    version = "v1",
    kind = "HTTPProxy",
    namespaced,
    status = "HTTPProxyStatus"
)]
pub struct HTTPProxySpec {
    /// Ordered route entries; the first matching route wins
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<Route>,
}

/// A route entry: match conditions, policies and weighted services
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<MatchCondition>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_policy: Option<TimeoutPolicy>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_policy: Option<RetryPolicy>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<Service>,
}

/// Path prefix plus optional header clause
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct MatchCondition {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub prefix: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub header: Option<HeaderMatchCondition>,
}

/// Single-clause header match; exact and contains are mutually exclusive
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct HeaderMatchCondition {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub exact: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub contains: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct TimeoutPolicy {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub response: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub idle: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct RetryPolicy {
    /// Maximum number of retries per request
    #[serde(rename = "count", default)]
    pub num_retries: i64,

    #[serde(
        rename = "perTryTimeout",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub per_try_timeout: String,

    /// Conditions that trigger a retry, verbatim from the intent
    #[serde(rename = "retryOn", default, skip_serializing_if = "Vec::is_empty")]
    pub retry_on: Vec<String>,
}

/// Weighted upstream service
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub name: String,

    pub port: i32,

    /// Traffic weight in [0, 100]; owned by the weight-shifting loop
    #[serde(default)]
    pub weight: i64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_headers_policy: Option<HeadersPolicy>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct HeadersPolicy {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub set: Vec<HeaderValue>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct HeaderValue {
    pub name: String,
    pub value: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HTTPProxyStatus {
    #[serde(default)]
    pub current_status: String,

    #[serde(default)]
    pub description: String,
}
