use crate::error::Error;

use kube::ResourceExt;
use opentelemetry::trace::TraceId;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::{
    counter::Counter, exemplar::HistogramWithExemplars, family::Family, histogram::Histogram,
};
use prometheus_client::registry::{Registry, Unit};
use std::sync::atomic::AtomicI64;
use std::sync::Arc;
use tokio::time::Instant;

#[derive(Clone)]
pub struct Metrics {
    pub reconcile: ReconcileMetrics,
    pub scheduler: SchedulerMetrics,
    pub alerts: AlertMetrics,
    pub registry: Arc<Registry>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new(Registry::with_prefix("yuptime"))
    }
}

impl Metrics {
    /// Registers the reconcile/scheduler/alert families into `registry`.
    /// Callers that also feed `registry` to `new_client_with_metrics`
    /// (`yuptime-k8s-util`) get client HTTP metrics on the same
    /// `/metrics` output as everything registered here.
    pub fn new(mut registry: Registry) -> Self {
        let reconcile = ReconcileMetrics::default().register(&mut registry);
        let scheduler = SchedulerMetrics::default().register(&mut registry);
        let alerts = AlertMetrics::default().register(&mut registry);
        Self {
            registry: Arc::new(registry),
            reconcile,
            scheduler,
            alerts,
        }
    }
}

/// Metrics for the scheduler driver (§4.E, invariant 5 of §8).
#[derive(Clone)]
pub struct SchedulerMetrics {
    pub jobs_scheduled: Gauge<i64, AtomicI64>,
    pub probes_in_flight: Gauge<i64, AtomicI64>,
    pub probes_dispatched: Family<ProbeLabels, Counter>,
    pub probe_latency: Family<ProbeLabels, Histogram>,
    pub lease_held: Gauge<i64, AtomicI64>,
}

impl Default for SchedulerMetrics {
    fn default() -> Self {
        Self {
            jobs_scheduled: Gauge::default(),
            probes_in_flight: Gauge::default(),
            probes_dispatched: Family::<ProbeLabels, Counter>::default(),
            probe_latency: Family::<ProbeLabels, Histogram>::new_with_constructor(|| {
                Histogram::new([0.01, 0.05, 0.1, 0.5, 1., 5., 10., 30.].into_iter())
            }),
            lease_held: Gauge::default(),
        }
    }
}

impl SchedulerMetrics {
    fn register(self, r: &mut Registry) -> Self {
        r.register("jobs_scheduled", "jobs currently in the queue", self.jobs_scheduled.clone());
        r.register(
            "probes_in_flight",
            "probes currently dispatched",
            self.probes_in_flight.clone(),
        );
        r.register(
            "probes_dispatched",
            "probes dispatched by state",
            self.probes_dispatched.clone(),
        );
        r.register_with_unit(
            "probe_latency",
            "probe execution latency",
            Unit::Seconds,
            self.probe_latency.clone(),
        );
        r.register(
            "lease_held",
            "1 if this replica holds the scheduler lease",
            self.lease_held.clone(),
        );
        self
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ProbeLabels {
    pub state: String,
}

/// Metrics for the alert/delivery pipeline (§4.H, §4.J).
#[derive(Clone)]
pub struct AlertMetrics {
    pub incidents_opened: Counter,
    pub incidents_closed: Counter,
    pub deliveries: Family<DeliveryLabels, Counter>,
}

impl Default for AlertMetrics {
    fn default() -> Self {
        Self {
            incidents_opened: Counter::default(),
            incidents_closed: Counter::default(),
            deliveries: Family::<DeliveryLabels, Counter>::default(),
        }
    }
}

impl AlertMetrics {
    fn register(self, r: &mut Registry) -> Self {
        r.register(
            "incidents_opened",
            "incidents opened",
            self.incidents_opened.clone(),
        );
        r.register(
            "incidents_closed",
            "incidents closed",
            self.incidents_closed.clone(),
        );
        r.register(
            "deliveries",
            "delivery records by terminal status",
            self.deliveries.clone(),
        );
        self
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct DeliveryLabels {
    pub status: String,
}

#[derive(Clone, Hash, PartialEq, Eq, EncodeLabelSet, Debug, Default)]
pub struct TraceLabel {
    pub id: String,
}
impl TryFrom<&TraceId> for TraceLabel {
    type Error = Error;

    fn try_from(id: &TraceId) -> Result<TraceLabel, Self::Error> {
        if std::matches!(id, &TraceId::INVALID) {
            Err(Error::InvalidTraceId)
        } else {
            let trace_id = id.to_string();
            Ok(Self { id: trace_id })
        }
    }
}

#[derive(Clone)]
pub struct ReconcileMetrics {
    pub runs: Family<(), Counter>,
    pub failures: Family<ErrorLabels, Counter>,
    pub duration: HistogramWithExemplars<TraceLabel>,
}

impl Default for ReconcileMetrics {
    fn default() -> Self {
        Self {
            runs: Family::<(), Counter>::default(),
            failures: Family::<ErrorLabels, Counter>::default(),
            duration: HistogramWithExemplars::new([0.1, 0.5, 1., 5., 10.].into_iter()),
        }
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ErrorLabels {
    pub instance: String,
    pub error: String,
}

impl ReconcileMetrics {
    /// Register API metrics to start tracking them.
    pub fn register(self, r: &mut Registry) -> Self {
        r.register_with_unit(
            "duration",
            "reconcile duration",
            Unit::Seconds,
            self.duration.clone(),
        );
        r.register("failures", "reconciliation errors", self.failures.clone());
        r.register("runs", "reconciliations", self.runs.clone());
        self
    }

    pub fn set_failure<K: ResourceExt>(&self, obj: &Arc<K>, e: &Error) {
        self.failures
            .get_or_create(&ErrorLabels {
                instance: obj.name_any(),
                error: e.metric_label(),
            })
            .inc();
    }

    pub fn count_and_measure(&self, trace_id: &TraceId) -> ReconcileMeasurer {
        self.runs.get_or_create(&()).inc();
        ReconcileMeasurer {
            start: Instant::now(),
            labels: trace_id.try_into().ok(),
            metric: self.duration.clone(),
        }
    }
}

/// Smart function duration measurer
///
/// Relies on Drop to calculate duration and register the observation in the histogram
pub struct ReconcileMeasurer {
    start: Instant,
    labels: Option<TraceLabel>,
    metric: HistogramWithExemplars<TraceLabel>,
}

impl Drop for ReconcileMeasurer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        let labels = self.labels.take();
        self.metric.observe(duration, labels);
    }
}
