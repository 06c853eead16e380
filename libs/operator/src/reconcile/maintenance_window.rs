//! MaintenanceWindow reconciler (§4.B, §4.I): projects `WindowSchedule`
//! (plus an optional RRULE recurrence) into the suppression index's
//! `windows` map.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use kube::api::Api;
use kube::runtime::controller::Action;
use kube::{Resource, ResourceExt};
use yuptime_crd::MaintenanceWindow;

use super::condition;
use super::validation::validate_name;
use crate::cache::{Kind, ObjectKey, ResourceDocument};
use crate::context::OperatorContext;
use crate::error::{Error, Result};
use crate::suppression::rrule::Rrule;
use crate::suppression::WindowEntry;

const RESYNC: StdDuration = StdDuration::from_secs(300);

pub async fn reconcile(window: Arc<MaintenanceWindow>, ctx: Arc<OperatorContext>) -> Result<Action> {
    ctx.note_reconcile().await;
    let namespace = window
        .namespace()
        .ok_or_else(|| Error::MissingNamespace(window.name_any()))?;
    let name = window.name_any();
    let generation = window.meta().generation;
    let key = ObjectKey::new(Kind::MaintenanceWindow, &namespace, &name);
    let api: Api<MaintenanceWindow> = Api::namespaced(ctx.client.clone(), &namespace);

    if window.meta().deletion_timestamp.is_some() {
        ctx.suppression.lock().await.remove_window(&key);
        ctx.cache.remove(key).await;
        return Ok(Action::await_change());
    }

    let rrule = match &window.spec.schedule.recurrence {
        Some(r) => match Rrule::parse(&r.rrule) {
            Some(rule) => Some(rule),
            None => {
                condition::patch_status(
                    &api,
                    &name,
                    vec![condition::valid_false(
                        "InvalidRrule",
                        &format!("could not parse RRULE {:?}", r.rrule),
                        generation,
                    )],
                    generation,
                )
                .await?;
                return Ok(Action::requeue(StdDuration::from_secs(30)));
            }
        },
        None => None,
    };

    if let Err(e) = validate_name(&name) {
        condition::patch_status(
            &api,
            &name,
            vec![condition::valid_false("InvalidSpec", &e.to_string(), generation)],
            generation,
        )
        .await?;
        return Ok(Action::requeue(StdDuration::from_secs(30)));
    }

    ctx.cache
        .upsert(
            key.clone(),
            window.resource_version(),
            ResourceDocument::MaintenanceWindow(window.clone()),
        )
        .await;

    if window.spec.enabled {
        ctx.suppression.lock().await.upsert_window(
            key,
            WindowEntry {
                selector: window.spec.match_.clone(),
                rrule,
                dtstart: window.spec.schedule.start,
                duration: window.spec.schedule.end - window.spec.schedule.start,
                next_occurrence: window.spec.schedule.start,
            },
        );
    } else {
        ctx.suppression.lock().await.remove_window(&key);
    }

    condition::patch_status(
        &api,
        &name,
        vec![
            condition::valid_true(generation),
            condition::reconciled_true(generation),
            condition::ready_true(generation),
        ],
        generation,
    )
    .await?;

    Ok(Action::requeue(RESYNC))
}

pub fn error_policy(window: Arc<MaintenanceWindow>, error: &Error, ctx: Arc<OperatorContext>) -> Action {
    ctx.metrics.reconcile.set_failure(&window, error);
    tracing::warn!(window = %window.name_any(), %error, "maintenance window reconcile failed");
    Action::requeue(StdDuration::from_secs(60))
}
