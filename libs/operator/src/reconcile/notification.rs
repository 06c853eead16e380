//! NotificationPolicy and NotificationProvider reconcilers (§4.B, §4.H):
//! project both kinds into the alert engine's [`PolicyView`], keyed by
//! `metadata.name` so policies can reference providers by name (§9).

use std::sync::Arc;
use std::time::Duration as StdDuration;

use kube::api::Api;
use kube::runtime::controller::Action;
use kube::{Resource, ResourceExt};
use yuptime_crd::{NotificationPolicy, NotificationProvider};

use super::condition;
use super::validation::validate_name;
use crate::context::OperatorContext;
use crate::error::{Error, Result};

const RESYNC: StdDuration = StdDuration::from_secs(300);

pub async fn reconcile_policy(policy: Arc<NotificationPolicy>, ctx: Arc<OperatorContext>) -> Result<Action> {
    ctx.note_reconcile().await;
    let namespace = policy
        .namespace()
        .ok_or_else(|| Error::MissingNamespace(policy.name_any()))?;
    let name = policy.name_any();
    let generation = policy.meta().generation;
    let api: Api<NotificationPolicy> = Api::namespaced(ctx.client.clone(), &namespace);

    if policy.meta().deletion_timestamp.is_some() {
        ctx.policy_view.lock().await.remove_policy(&name);
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

    ctx.policy_view.lock().await.upsert_policy(name.clone(), policy.spec.clone());

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

pub fn error_policy_policy(policy: Arc<NotificationPolicy>, error: &Error, ctx: Arc<OperatorContext>) -> Action {
    ctx.metrics.reconcile.set_failure(&policy, error);
    tracing::warn!(policy = %policy.name_any(), %error, "notification policy reconcile failed");
    Action::requeue(StdDuration::from_secs(60))
}

pub async fn reconcile_provider(
    provider: Arc<NotificationProvider>,
    ctx: Arc<OperatorContext>,
) -> Result<Action> {
    ctx.note_reconcile().await;
    let namespace = provider
        .namespace()
        .ok_or_else(|| Error::MissingNamespace(provider.name_any()))?;
    let name = provider.name_any();
    let generation = provider.meta().generation;
    let api: Api<NotificationProvider> = Api::namespaced(ctx.client.clone(), &namespace);

    if provider.meta().deletion_timestamp.is_some() {
        ctx.policy_view.lock().await.remove_provider(&name);
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

    ctx.policy_view
        .lock()
        .await
        .upsert_provider(name.clone(), provider.spec.clone());

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

pub fn error_policy_provider(
    provider: Arc<NotificationProvider>,
    error: &Error,
    ctx: Arc<OperatorContext>,
) -> Action {
    ctx.metrics.reconcile.set_failure(&provider, error);
    tracing::warn!(provider = %provider.name_any(), %error, "notification provider reconcile failed");
    Action::requeue(StdDuration::from_secs(60))
}

#[cfg(test)]
mod tests {
    use super::*;
    use yuptime_crd::notification::Triggers;
    use yuptime_crd::{NotificationPolicySpec, Selector};

    fn policy(name: &str, priority: i32) -> NotificationPolicy {
        NotificationPolicy::new(
            name,
            NotificationPolicySpec {
                match_: Selector::default(),
                priority,
                triggers: Triggers {
                    on_down: true,
                    on_up: false,
                    on_flapping: false,
                    on_cert_expiring: false,
                },
                providers: vec!["pager".into()],
                dedup: None,
                rate_limit: None,
                resend: None,
                formatting: None,
            },
        )
    }

    #[test]
    fn valid_name_accepted() {
        assert!(validate_name(&policy("p1", 0).name_any()).is_ok());
    }
}
