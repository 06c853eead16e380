//! Passthrough kinds (§4.B): recognized by the cache and reconciler
//! registry, validated against the common name rule and marked
//! `Ready=True`, but with no further side effects -- their behavior
//! (MonitorSet expansion, status-page rendering, local auth) is out of
//! scope per §1.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::condition::Condition;

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "yuptime.io",
    version = "v1",
    kind = "MonitorSet",
    namespaced,
    status = "PassthroughStatus",
    shortname = "monset"
)]
pub struct MonitorSetSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub targets: Option<Vec<serde_json::Value>>,
}

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "yuptime.io",
    version = "v1",
    kind = "StatusPage",
    namespaced,
    status = "PassthroughStatus",
    shortname = "spage"
)]
pub struct StatusPageSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitor_refs: Option<Vec<String>>,
}

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "yuptime.io",
    version = "v1",
    kind = "LocalUser",
    namespaced,
    status = "PassthroughStatus",
    shortname = "luser"
)]
pub struct LocalUserSpec {
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,
}

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "yuptime.io",
    version = "v1",
    kind = "ApiKey",
    namespaced,
    status = "PassthroughStatus",
    shortname = "akey"
)]
pub struct ApiKeySpec {
    pub subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes: Option<BTreeMap<String, String>>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
pub struct PassthroughStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}
