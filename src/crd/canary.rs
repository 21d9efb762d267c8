use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Canary is a Custom Resource describing one progressive delivery rollout
///
/// The control loop that paces the rollout owns this object; the router only
/// reads it to derive the routing configuration for the apex service.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "reitti.io",
    version = "v1alpha1",
    kind = "Canary",
    namespaced,
    printcolumn = r#"{"name":"Port", "type":"integer", "jsonPath":".spec.service.port"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
pub struct CanarySpec {
    /// Routing configuration for the apex service
    pub service: CanaryService,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
pub struct CanaryService {
    /// Apex service name; defaults to the Canary object name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Service port targeted by the generated routes
    pub port: i32,

    /// Conditional request match rules, in evaluation order
    #[serde(default, skip_serializing_if = "Vec::is_empty", rename = "match")]
    pub match_rules: Vec<HTTPMatchRule>,

    /// Response timeout (e.g. "15s"); the format is owned by the proxy schema
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,

    /// Retry policy applied to every generated route
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retries: Option<Retries>,

    /// Labels and annotations for the generated apex resource
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apex: Option<CustomMetadata>,
}

/// A single conditional match rule
///
/// Header clauses and the URI prefix are expanded into route conditions by
/// the spec builder; one condition per header name, never a conjunction.
#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
pub struct HTTPMatchRule {
    /// Header name to string-match mapping
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, StringMatch>,

    /// URI match; only the prefix form is consulted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<StringMatch>,
}

/// String matching clause
///
/// At most one form is applied per header, with precedence
/// exact > suffix > prefix. Empty strings count as unset.
#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
pub struct StringMatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exact: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
}

/// Retry policy for generated routes
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
pub struct Retries {
    /// Number of retry attempts per request
    pub attempts: i32,

    /// Timeout per retry attempt (e.g. "5s")
    #[serde(rename = "perTryTimeout")]
    pub per_try_timeout: String,

    /// Comma-separated retry trigger conditions (e.g. "5xx,gateway-error")
    #[serde(rename = "retryOn")]
    pub retry_on: String,
}

/// Extra metadata attached to the generated apex resource
#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
pub struct CustomMetadata {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl Canary {
    /// Derive the (apex, primary, canary) service names for this rollout
    ///
    /// The apex name is `spec.service.name` when set, otherwise the object
    /// name; the primary and canary backends carry fixed suffixes.
    pub fn service_names(&self) -> (String, String, String) {
        let apex = self
            .spec
            .service
            .name
            .clone()
            .unwrap_or_else(|| self.name_any());
        let primary = format!("{apex}-primary");
        let canary = format!("{apex}-canary");
        (apex, primary, canary)
    }
}

#[cfg(test)]
#[path = "canary_test.rs"]
mod tests;
