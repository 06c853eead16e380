//! Shared `status.conditions` management (§4.B): every per-kind
//! reconciler ends by setting `Valid`, `Reconciled` and `Ready`
//! conditions the same way, so the upsert-by-type and status-patch logic
//! is factored here once instead of duplicated per kind.

use kube::api::{Api, Patch, PatchParams};
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use yuptime_crd::{Condition, ConditionStatus};

use crate::error::Result;

/// Replaces the condition of the same `type_` in place, or appends it.
pub fn upsert(conditions: &mut Vec<Condition>, condition: Condition) {
    if let Some(existing) = conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        *existing = condition;
    } else {
        conditions.push(condition);
    }
}

pub fn valid_true(observed_generation: Option<i64>) -> Condition {
    Condition::new(
        yuptime_crd::condition::TYPE_VALID,
        ConditionStatus::True,
        "Validated",
        "resource passed validation",
        observed_generation,
    )
}

pub fn valid_false(reason: &str, message: &str, observed_generation: Option<i64>) -> Condition {
    Condition::new(
        yuptime_crd::condition::TYPE_VALID,
        ConditionStatus::False,
        reason,
        message,
        observed_generation,
    )
}

pub fn reconciled_true(observed_generation: Option<i64>) -> Condition {
    Condition::new(
        yuptime_crd::condition::TYPE_RECONCILED,
        ConditionStatus::True,
        "Reconciled",
        "spec applied to in-memory state",
        observed_generation,
    )
}

pub fn ready_true(observed_generation: Option<i64>) -> Condition {
    Condition::new(
        yuptime_crd::condition::TYPE_READY,
        ConditionStatus::True,
        "Ready",
        "resource is in its desired state",
        observed_generation,
    )
}

/// Patches `status.conditions` and `status.observedGeneration` via a
/// merge patch against the status subresource. Every status type in
/// this CRD set shares this exact shape (§6: "writes `status.conditions`
/// ... plus `status.observedGeneration`").
pub async fn patch_status<K>(
    api: &Api<K>,
    name: &str,
    conditions: Vec<Condition>,
    observed_generation: Option<i64>,
) -> Result<()>
where
    K: Resource + Clone + DeserializeOwned + Serialize + std::fmt::Debug,
{
    let patch = serde_json::json!({
        "status": {
            "conditions": conditions,
            "observedGeneration": observed_generation,
        }
    });
    api.patch_status(name, &PatchParams::default(), &Patch::Merge(patch))
        .await?;
    Ok(())
}

/// `true` if the object's `status.observedGeneration` already matches
/// its current `metadata.generation` (§8: "re-delivering the same event
/// (same generation) is a no-op").
pub fn already_observed<K: ResourceExt>(obj: &K, observed_generation: Option<i64>) -> bool {
    match (obj.meta().generation, observed_generation) {
        (Some(current), Some(observed)) => current == observed,
        _ => false,
    }
}
