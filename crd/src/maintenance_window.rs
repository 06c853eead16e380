use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::condition::Condition;
use crate::selector::Selector;

/// Recurring, schedule-bounded suppression described by an RFC 5545 RRULE
/// plus a duration (§3, GLOSSARY).
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "yuptime.io",
    version = "v1",
    kind = "MaintenanceWindow",
    namespaced,
    status = "MaintenanceWindowStatus",
    shortname = "mw"
)]
pub struct MaintenanceWindowSpec {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub schedule: WindowSchedule,
    #[serde(default, rename = "match")]
    pub match_: Selector,
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
pub struct WindowSchedule {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<Recurrence>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
pub struct Recurrence {
    pub rrule: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
pub struct MaintenanceWindowStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}
