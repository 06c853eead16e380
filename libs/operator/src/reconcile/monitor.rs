//! Monitor reconciler (§4.B, §3 Monitor invariants, §4.C/D job upsert).

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Utc;
use kube::api::Api;
use kube::runtime::controller::Action;
use kube::{Resource, ResourceExt};
use tracing::info;
use yuptime_crd::{Monitor, ProbeTarget};

use super::condition::{self, already_observed};
use super::validation::validate_name;
use crate::cache::{Kind, ObjectKey, ResourceDocument};
use crate::context::OperatorContext;
use crate::error::{Error, Result};
use crate::scheduler::driver::deterministic_jitter_sec;
use crate::scheduler::job::ScheduledJob;

const RESYNC: StdDuration = StdDuration::from_secs(300);

pub async fn reconcile(monitor: Arc<Monitor>, ctx: Arc<OperatorContext>) -> Result<Action> {
    ctx.note_reconcile().await;
    let namespace = monitor
        .namespace()
        .ok_or_else(|| Error::MissingNamespace(monitor.name_any()))?;
    let name = monitor.name_any();
    let generation = monitor.meta().generation;
    let job_id = ScheduledJob::new_id(&namespace, &name);
    let api: Api<Monitor> = Api::namespaced(ctx.client.clone(), &namespace);

    if monitor.meta().deletion_timestamp.is_some() {
        info!(namespace = %namespace, name = %name, "removing deleted monitor");
        ctx.job_registry.lock().await.remove(&job_id);
        ctx.queue.lock().await.remove(&job_id);
        ctx.cache.remove(ObjectKey::new(Kind::Monitor, &namespace, &name)).await;
        return Ok(Action::await_change());
    }

    let min_interval_sec = ctx.min_interval_sec().await;
    if let Err(e) = validate(&monitor, min_interval_sec) {
        condition::patch_status(
            &api,
            &name,
            vec![
                condition::valid_false("InvalidSpec", &e.to_string(), generation),
                condition::reconciled_true(generation),
            ],
            generation,
        )
        .await?;
        return Ok(Action::requeue(StdDuration::from_secs(30)));
    }

    ctx.cache
        .upsert(
            ObjectKey::new(Kind::Monitor, &namespace, &name),
            monitor.resource_version(),
            ResourceDocument::Monitor(monitor.clone()),
        )
        .await;

    if !monitor.spec.is_enabled() {
        ctx.job_registry.lock().await.remove(&job_id);
        ctx.queue.lock().await.remove(&job_id);
    } else {
        let status_observed = monitor.status.as_ref().and_then(|s| s.observed_generation);
        let already_scheduled = ctx.job_registry.lock().await.contains(&job_id);
        if !already_scheduled || !already_observed(monitor.as_ref(), status_observed) {
            let jitter = deterministic_jitter_sec(
                &namespace,
                &name,
                monitor.spec.schedule.interval_sec,
                monitor.spec.schedule.jitter_percent,
            );
            let next_run_at = Utc::now()
                + chrono::Duration::seconds(monitor.spec.schedule.initial_delay_sec as i64)
                + chrono::Duration::seconds(jitter);
            let job = ScheduledJob {
                id: job_id.clone(),
                namespace: namespace.clone(),
                name: name.clone(),
                next_run_at,
                interval_sec: monitor.spec.schedule.interval_sec,
                timeout_sec: monitor.spec.schedule.timeout_sec,
                jitter_percent: monitor.spec.schedule.jitter_percent,
                priority: 0,
            };
            ctx.queue.lock().await.update(&job);
            ctx.job_registry.lock().await.insert(job);
        }
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

pub fn error_policy(monitor: Arc<Monitor>, error: &Error, ctx: Arc<OperatorContext>) -> Action {
    ctx.metrics.reconcile.set_failure(&monitor, error);
    tracing::warn!(monitor = %monitor.name_any(), %error, "monitor reconcile failed");
    Action::requeue(StdDuration::from_secs(60))
}

/// `{exactly one target variant consistent with the type tag, timeoutSec
/// < intervalSec, intervalSec >= configured minimum}` (§3). The minimum is
/// the cluster-wide `YuptimeSettings.minIntervalSec`, falling back to
/// `DEFAULT_MIN_INTERVAL_SEC` before a `YuptimeSettings` has been reconciled.
fn validate(monitor: &Monitor, min_interval_sec: u32) -> Result<()> {
    validate_name(&monitor.name_any())?;
    let spec = &monitor.spec;
    if spec.target.kind() != spec.type_ {
        return Err(Error::Validation(format!(
            "target variant {:?} does not match declared type {:?}",
            spec.target.kind(),
            spec.type_
        )));
    }
    if spec.schedule.timeout_sec >= spec.schedule.interval_sec {
        return Err(Error::Validation(format!(
            "timeoutSec ({}) must be less than intervalSec ({})",
            spec.schedule.timeout_sec, spec.schedule.interval_sec
        )));
    }
    if spec.schedule.interval_sec < min_interval_sec {
        return Err(Error::Validation(format!(
            "intervalSec ({}) is below the configured minimum ({})",
            spec.schedule.interval_sec, min_interval_sec
        )));
    }
    if !(0..=100).contains(&spec.schedule.jitter_percent) {
        return Err(Error::Validation("jitterPercent must be within [0, 100]".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use yuptime_crd::{MonitorSpec, ProbeKind, Schedule, TcpTarget};

    fn monitor(interval: u32, timeout: u32) -> Monitor {
        Monitor::new(
            "m1",
            MonitorSpec {
                type_: ProbeKind::Tcp,
                target: ProbeTarget::Tcp(TcpTarget {
                    host: "db".into(),
                    port: 5432,
                }),
                schedule: Schedule {
                    interval_sec: interval,
                    timeout_sec: timeout,
                    retries: 0,
                    initial_delay_sec: 0,
                    jitter_percent: 10,
                },
                success_criteria: None,
                labels: None,
                tags: None,
                enabled: None,
                alertmanager_url: None,
            },
        )
    }

    #[test]
    fn rejects_timeout_not_less_than_interval() {
        assert!(validate(&monitor(30, 30), yuptime_crd::monitor::DEFAULT_MIN_INTERVAL_SEC).is_err());
    }

    #[test]
    fn rejects_interval_below_minimum() {
        assert!(validate(&monitor(10, 5), yuptime_crd::monitor::DEFAULT_MIN_INTERVAL_SEC).is_err());
    }

    #[test]
    fn accepts_well_formed_spec() {
        assert!(validate(&monitor(30, 5), yuptime_crd::monitor::DEFAULT_MIN_INTERVAL_SEC).is_ok());
    }

    #[test]
    fn rejects_interval_below_configured_cluster_minimum() {
        assert!(validate(&monitor(30, 5), 60).is_err());
    }
}
