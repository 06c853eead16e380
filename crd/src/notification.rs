use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::condition::Condition;
use crate::selector::Selector;

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "yuptime.io",
    version = "v1",
    kind = "NotificationPolicy",
    namespaced,
    status = "NotificationPolicyStatus",
    shortname = "npol"
)]
pub struct NotificationPolicySpec {
    #[serde(default, rename = "match")]
    pub match_: Selector,
    #[serde(default)]
    pub priority: i32,
    pub triggers: Triggers,
    pub providers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dedup: Option<Dedup>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resend: Option<Resend>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatting: Option<Formatting>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, JsonSchema)]
pub struct Triggers {
    #[serde(default)]
    pub on_down: bool,
    #[serde(default)]
    pub on_up: bool,
    #[serde(default)]
    pub on_flapping: bool,
    /// Reserved; not yet implemented (§4.H, §9 Open Questions).
    #[serde(default)]
    pub on_cert_expiring: bool,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
pub struct Dedup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub window_minutes: u32,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
pub struct RateLimit {
    pub min_minutes_between_alerts: u32,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
pub struct Resend {
    pub interval_minutes: u32,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
pub struct Formatting {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_template: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
pub struct NotificationPolicyStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

/// A callable notification capability (§1: "treated as a single
/// capability `deliver(title, body) -> result`"). Only connection details
/// are modeled here; the transport itself is an external collaborator.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "yuptime.io",
    version = "v1",
    kind = "NotificationProvider",
    namespaced,
    status = "NotificationProviderStatus",
    shortname = "nprov"
)]
pub struct NotificationProviderSpec {
    pub provider_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<SecretRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
pub struct SecretRef {
    pub name: String,
    pub key: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
pub struct NotificationProviderStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}
