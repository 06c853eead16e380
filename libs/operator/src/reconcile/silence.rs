//! Silence reconciler (§4.B, §4.I): projects `SilenceSpec` into the
//! suppression index's `silences` map.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use kube::api::Api;
use kube::runtime::controller::Action;
use kube::{Resource, ResourceExt};
use yuptime_crd::Silence;

use super::condition;
use super::validation::validate_name;
use crate::cache::{Kind, ObjectKey, ResourceDocument};
use crate::context::OperatorContext;
use crate::error::{Error, Result};
use crate::suppression::SilenceEntry;

const RESYNC: StdDuration = StdDuration::from_secs(300);

pub async fn reconcile(silence: Arc<Silence>, ctx: Arc<OperatorContext>) -> Result<Action> {
    ctx.note_reconcile().await;
    let namespace = silence
        .namespace()
        .ok_or_else(|| Error::MissingNamespace(silence.name_any()))?;
    let name = silence.name_any();
    let generation = silence.meta().generation;
    let key = ObjectKey::new(Kind::Silence, &namespace, &name);
    let api: Api<Silence> = Api::namespaced(ctx.client.clone(), &namespace);

    if silence.meta().deletion_timestamp.is_some() {
        ctx.suppression.lock().await.remove_silence(&key);
        ctx.cache.remove(key).await;
        return Ok(Action::await_change());
    }

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
        .upsert(key.clone(), silence.resource_version(), ResourceDocument::Silence(silence.clone()))
        .await;

    ctx.suppression.lock().await.upsert_silence(
        key,
        SilenceEntry {
            expires_at: silence.spec.expires_at,
            selector: silence.spec.match_.clone(),
            reason: silence.spec.reason.clone(),
        },
    );

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

pub fn error_policy(silence: Arc<Silence>, error: &Error, ctx: Arc<OperatorContext>) -> Action {
    ctx.metrics.reconcile.set_failure(&silence, error);
    tracing::warn!(silence = %silence.name_any(), %error, "silence reconcile failed");
    Action::requeue(StdDuration::from_secs(60))
}
