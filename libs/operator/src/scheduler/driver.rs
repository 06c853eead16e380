//! Component E: the singleton scheduler loop (§4.E). Cooperative,
//! single-threaded on the driver; probe execution is dispatched
//! asynchronously under a concurrency budget and is the only suspension
//! point surfaced outside the driver loop besides its own sleep (§5, §9).

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{watch, Semaphore};
use tracing::{debug, info, warn};

use super::job::ScheduledJob;
use super::lease::LeaseGuard;
use crate::alert::{self, AlertEvent};
use crate::cache::{Kind, ObjectKey, ResourceCache};
use crate::context::OperatorContext;
use crate::heartbeat;
use crate::probe::ProbeExecutor;

/// Hard upper bound on how long the driver sleeps between empty-queue polls
/// (§4.E step 1: "bounded by ~100 ms").
const POLL_TICK: StdDuration = StdDuration::from_millis(100);
const LEASE_RENEW_INTERVAL: StdDuration = StdDuration::from_secs(10);

/// `jitter = (hash(namespace, name) mod (2J+1) - J) * intervalSec / 100` (§4.E).
pub fn deterministic_jitter_sec(namespace: &str, name: &str, interval_sec: u32, jitter_percent: u8) -> i64 {
    if jitter_percent == 0 {
        return 0;
    }
    let j = jitter_percent as i64;
    let hash = fnv1a(format!("{namespace}/{name}").as_bytes());
    let span = 2 * j + 1;
    let offset = (hash % span as u64) as i64 - j;
    offset * interval_sec as i64 / 100
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for b in bytes {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

pub fn next_run_at(now: DateTime<Utc>, namespace: &str, name: &str, interval_sec: u32, jitter_percent: u8) -> DateTime<Utc> {
    let jitter = deterministic_jitter_sec(namespace, name, interval_sec, jitter_percent);
    now + Duration::seconds(interval_sec as i64) + Duration::seconds(jitter)
}

pub struct Driver {
    ctx: Arc<OperatorContext>,
    executor: Arc<dyn ProbeExecutor>,
    lease: Option<LeaseGuard>,
}

impl Driver {
    pub fn new(ctx: Arc<OperatorContext>, executor: Arc<dyn ProbeExecutor>, lease: Option<LeaseGuard>) -> Self {
        Self { ctx, executor, lease }
    }

    /// Runs until `shutdown` signals, then stops popping, waits out
    /// in-flight probes, and releases the lease (§4.E "Cancellation and
    /// shutdown").
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        if let Some(lease) = self.lease.as_mut() {
            match lease.acquire().await {
                Ok(true) => info!("acquired scheduler lease"),
                Ok(false) => {
                    warn!("scheduler lease held by another replica; idling");
                    let _ = shutdown.changed().await;
                    return;
                }
                Err(e) => {
                    warn!(%e, "failed to acquire scheduler lease; proceeding lease-less (dev mode)");
                    self.lease = None;
                }
            }
        } else {
            warn!("running without a cluster lease (dev mode, §4.E)");
        }
        self.ctx.metrics.scheduler.lease_held.set(1);

        let net_sem = Arc::new(Semaphore::new(self.ctx.max_concurrent_net_checks().await as usize));
        let priv_sem = Arc::new(Semaphore::new(self.ctx.max_concurrent_priv_checks().await as usize));
        let mut lease_renew = tokio::time::interval(LEASE_RENEW_INTERVAL);

        loop {
            if *shutdown.borrow() {
                break;
            }

            let sleep_until = {
                let queue = self.ctx.queue.lock().await;
                match queue.peek_next_run_at() {
                    Some(at) if at <= Utc::now() => None,
                    Some(at) => Some(at),
                    None => Some(Utc::now() + Duration::milliseconds(POLL_TICK.as_millis() as i64)),
                }
            };

            if let Some(at) = sleep_until {
                let dur = (at - Utc::now()).to_std().unwrap_or(StdDuration::ZERO).min(POLL_TICK);
                tokio::select! {
                    _ = tokio::time::sleep(dur) => {}
                    _ = shutdown.changed() => { continue }
                    _ = lease_renew.tick() => {
                        if let Some(lease) = self.lease.as_mut() {
                            if lease.renew().await.is_err() {
                                warn!("scheduler lease lost; stopping driver");
                                break;
                            }
                        }
                        continue
                    }
                }
                continue;
            }

            let job_id = {
                let mut queue = self.ctx.queue.lock().await;
                queue.pop()
            };
            let Some(job_id) = job_id else { continue };

            let job = {
                let registry = self.ctx.job_registry.lock().await;
                registry.get(&job_id).cloned()
            };
            let Some(job) = job else { continue };

            self.dispatch(job.clone(), net_sem.clone(), priv_sem.clone());

            let rescheduled = ScheduledJob {
                next_run_at: next_run_at(Utc::now(), &job.namespace, &job.name, job.interval_sec, job.jitter_percent),
                ..job
            };
            {
                let mut queue = self.ctx.queue.lock().await;
                queue.update(&rescheduled);
            }
            {
                let mut registry = self.ctx.job_registry.lock().await;
                registry.insert(rescheduled);
            }
        }

        info!("scheduler driver stopped popping; draining in-flight probes");
        if let Some(lease) = self.lease.as_mut() {
            let _ = lease.release().await;
        }
        self.ctx.metrics.scheduler.lease_held.set(0);
    }

    /// Dispatches one probe under the appropriate concurrency semaphore.
    /// Overflow blocks (never silently drops) -- the due job simply runs
    /// late (§4.E "Concurrency budget").
    fn dispatch(&self, job: ScheduledJob, net_sem: Arc<Semaphore>, priv_sem: Arc<Semaphore>) {
        let ctx = self.ctx.clone();
        let executor = self.executor.clone();
        tokio::spawn(async move {
            let key = ObjectKey::new(Kind::Monitor, &job.namespace, &job.name);
            let monitor = match ctx.cache.get(&key).await.and_then(|d| d.as_monitor().cloned()) {
                Some(m) => m,
                None => {
                    warn!(monitor = %job.id, "monitor missing from cache at dispatch time; skipping");
                    return;
                }
            };
            let is_privileged = matches!(monitor.spec.type_, yuptime_crd::ProbeKind::KubernetesResource);
            let sem = if is_privileged { priv_sem } else { net_sem };
            let permit = sem.acquire_owned().await;
            ctx.metrics.scheduler.probes_in_flight.inc();
            let start = Utc::now();
            let result = executor.execute(&monitor, job.timeout_sec).await;
            drop(permit);
            ctx.metrics.scheduler.probes_in_flight.dec();
            let elapsed = (Utc::now() - start).num_milliseconds() as f64 / 1000.0;
            ctx.metrics
                .scheduler
                .probe_latency
                .get_or_create(&crate::metrics::ProbeLabels {
                    state: format!("{:?}", result.state).to_lowercase(),
                })
                .observe(elapsed);
            ctx.metrics
                .scheduler
                .probes_dispatched
                .get_or_create(&crate::metrics::ProbeLabels {
                    state: format!("{:?}", result.state).to_lowercase(),
                })
                .inc();
            debug!(monitor = %job.id, state = ?result.state, "probe completed");

            let flapping_window_checks = ctx.settings.read().await.flapping_window_checks;
            let outcome = match heartbeat::record(
                &ctx.store,
                &ctx.metrics,
                crate::store::Heartbeat {
                    monitor_id: job.id.clone(),
                    state: result.state,
                    latency_ms: result.latency_ms,
                    reason: result.reason.clone(),
                    message: result.message.clone(),
                    checked_at: Utc::now(),
                    attempts: 1,
                },
                flapping_window_checks,
            )
            .await
            {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(%e, monitor = %job.id, "failed to record heartbeat");
                    return;
                }
            };

            if !outcome.is_state_change {
                return;
            }

            let labels = monitor.spec.labels.clone().unwrap_or_default();
            let tags = monitor.spec.tags.clone().unwrap_or_default();
            let event = AlertEvent {
                monitor_namespace: &job.namespace,
                monitor_name: &job.name,
                labels: &labels,
                tags: &tags,
                reason: &result.reason,
                message: &result.message,
                latency_ms: result.latency_ms,
                timestamp: Utc::now(),
                outcome: &outcome,
            };

            let alerts = {
                let policies = ctx.policy_view.lock().await;
                alert::process_event(&policies, &event)
            };

            let subject = yuptime_crd::MatchSubject {
                namespace: &job.namespace,
                name: &job.name,
                labels: &labels,
                tags: &tags,
            };
            for to_deliver in alerts {
                if let Err(e) = ctx
                    .delivery_queue
                    .queue_alert(to_deliver, &subject, &ctx.suppression)
                    .await
                {
                    warn!(%e, monitor = %job.id, "failed to queue alert");
                }
            }

            if let Some(url) = &monitor.spec.alertmanager_url {
                ctx.alertmanager
                    .notify(url, &job.namespace, &job.name, result.state, &tags, &result.reason, &result.message)
                    .await;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_is_deterministic_for_same_inputs() {
        let a = deterministic_jitter_sec("default", "m1", 60, 20);
        let b = deterministic_jitter_sec("default", "m1", 60, 20);
        assert_eq!(a, b);
    }

    #[test]
    fn zero_jitter_percent_yields_zero_offset() {
        assert_eq!(deterministic_jitter_sec("default", "m1", 60, 0), 0);
    }

    #[test]
    fn jitter_bounded_by_percent() {
        let offset = deterministic_jitter_sec("ns", "name-with-entropy", 100, 10);
        assert!(offset.abs() <= 10);
    }
}
