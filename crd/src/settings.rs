use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::condition::Condition;

/// Cluster-wide singleton; `metadata.name` must equal
/// [`crate::SETTINGS_SINGLETON_NAME`] (§4.B).
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "yuptime.io",
    version = "v1",
    kind = "YuptimeSettings",
    namespaced,
    status = "YuptimeSettingsStatus",
    shortname = "yset"
)]
pub struct YuptimeSettingsSpec {
    #[serde(default = "default_min_interval_sec")]
    pub min_interval_sec: u32,
    #[serde(default = "default_max_concurrent_net_checks")]
    pub max_concurrent_net_checks: u32,
    #[serde(default = "default_max_concurrent_priv_checks")]
    pub max_concurrent_priv_checks: u32,
    #[serde(default = "default_flapping_window")]
    pub flapping_window_checks: u32,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_min_interval_sec() -> u32 {
    20
}
fn default_max_concurrent_net_checks() -> u32 {
    32
}
fn default_max_concurrent_priv_checks() -> u32 {
    4
}
fn default_flapping_window() -> u32 {
    3
}
fn default_retention_days() -> u32 {
    30
}

impl Default for YuptimeSettingsSpec {
    fn default() -> Self {
        Self {
            min_interval_sec: default_min_interval_sec(),
            max_concurrent_net_checks: default_max_concurrent_net_checks(),
            max_concurrent_priv_checks: default_max_concurrent_priv_checks(),
            flapping_window_checks: default_flapping_window(),
            retention_days: default_retention_days(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
pub struct YuptimeSettingsStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}
