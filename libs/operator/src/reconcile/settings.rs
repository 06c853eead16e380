//! `YuptimeSettings` singleton reconciler and the passthrough-kind
//! reconcilers for `MonitorSet`, `StatusPage`, `LocalUser` and `ApiKey`
//! (§4.B). The passthrough kinds are validated and marked `Ready` but
//! carry no further side effects; their behavior is out of scope (§1).

use std::sync::Arc;
use std::time::Duration as StdDuration;

use kube::api::Api;
use kube::runtime::controller::Action;
use kube::{Resource, ResourceExt};
use yuptime_crd::{ApiKey, LocalUser, MonitorSet, StatusPage, YuptimeSettings};

use super::condition;
use super::validation::validate_name;
use crate::context::OperatorContext;
use crate::error::{Error, Result};

const RESYNC: StdDuration = StdDuration::from_secs(300);

pub async fn reconcile_settings(settings: Arc<YuptimeSettings>, ctx: Arc<OperatorContext>) -> Result<Action> {
    ctx.note_reconcile().await;
    let namespace = settings
        .namespace()
        .ok_or_else(|| Error::MissingNamespace(settings.name_any()))?;
    let name = settings.name_any();
    let generation = settings.meta().generation;
    let api: Api<YuptimeSettings> = Api::namespaced(ctx.client.clone(), &namespace);

    if settings.meta().deletion_timestamp.is_some() {
        return Ok(Action::await_change());
    }

    if name != yuptime_crd::SETTINGS_SINGLETON_NAME {
        condition::patch_status(
            &api,
            &name,
            vec![condition::valid_false(
                "NotSingleton",
                &format!(
                    "metadata.name must be {:?}, found {:?}",
                    yuptime_crd::SETTINGS_SINGLETON_NAME,
                    name
                ),
                generation,
            )],
            generation,
        )
        .await?;
        return Ok(Action::requeue(StdDuration::from_secs(30)));
    }

    *ctx.settings.write().await = settings.spec.clone();

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

pub fn error_policy_settings(settings: Arc<YuptimeSettings>, error: &Error, ctx: Arc<OperatorContext>) -> Action {
    ctx.metrics.reconcile.set_failure(&settings, error);
    tracing::warn!(settings = %settings.name_any(), %error, "settings reconcile failed");
    Action::requeue(StdDuration::from_secs(60))
}

macro_rules! passthrough_reconciler {
    ($reconcile_fn:ident, $error_fn:ident, $kind:ty) => {
        pub async fn $reconcile_fn(obj: Arc<$kind>, ctx: Arc<OperatorContext>) -> Result<Action> {
            ctx.note_reconcile().await;
            let namespace = obj
                .namespace()
                .ok_or_else(|| Error::MissingNamespace(obj.name_any()))?;
            let name = obj.name_any();
            let generation = obj.meta().generation;
            let api: Api<$kind> = Api::namespaced(ctx.client.clone(), &namespace);

            if obj.meta().deletion_timestamp.is_some() {
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

        pub fn $error_fn(obj: Arc<$kind>, error: &Error, ctx: Arc<OperatorContext>) -> Action {
            ctx.metrics.reconcile.set_failure(&obj, error);
            tracing::warn!(name = %obj.name_any(), %error, "passthrough reconcile failed");
            Action::requeue(StdDuration::from_secs(60))
        }
    };
}

passthrough_reconciler!(reconcile_monitor_set, error_policy_monitor_set, MonitorSet);
passthrough_reconciler!(reconcile_status_page, error_policy_status_page, StatusPage);
passthrough_reconciler!(reconcile_local_user, error_policy_local_user, LocalUser);
passthrough_reconciler!(reconcile_api_key, error_policy_api_key, ApiKey);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn singleton_name_is_the_reserved_constant() {
        assert_eq!(yuptime_crd::SETTINGS_SINGLETON_NAME, "cluster");
    }
}
