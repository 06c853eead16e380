use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::condition::Condition;
use crate::selector::Selector;

/// Ad-hoc, time-bounded suppression (§3, GLOSSARY).
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "yuptime.io",
    version = "v1",
    kind = "Silence",
    namespaced,
    status = "SilenceStatus",
    shortname = "sil"
)]
pub struct SilenceSpec {
    pub expires_at: DateTime<Utc>,
    #[serde(default, rename = "match")]
    pub match_: Selector,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl SilenceSpec {
    /// `now <= expiresAt` (§3).
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now <= self.expires_at
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
pub struct SilenceStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}
