//! Shared state threaded through the reconcilers, the scheduler driver
//! and the delivery worker (Design Notes §9). A single `Context`/`State`
//! pair spans every component this operator drives, behind the
//! narrowest lock each needs.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use kube::runtime::events::Reporter;
use kube::Client;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use yuptime_crd::YuptimeSettingsSpec;

use crate::alert::policy::PolicyView;
use crate::alertmanager::AlertmanagerBridge;
use crate::cache::ResourceCache;
use crate::delivery::DeliveryQueue;
use crate::metrics::Metrics;
use crate::scheduler::job::JobRegistry;
use crate::scheduler::queue::JobQueue;
use crate::store::Store;
use crate::suppression::SuppressionIndex;

/// Diagnostics surfaced by the admin HTTP server's status endpoint (§6,
/// Non-goals: the HTTP surface itself is out of scope, this struct is its
/// payload shape).
#[derive(Clone, Serialize)]
pub struct Diagnostics {
    pub last_reconcile: DateTime<Utc>,
    #[serde(skip)]
    pub reporter: Reporter,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self {
            last_reconcile: Utc::now(),
            reporter: "yuptime-operator".into(),
        }
    }
}

pub struct OperatorContext {
    pub client: Client,
    pub cache: Arc<ResourceCache>,
    pub job_registry: Mutex<JobRegistry>,
    pub queue: Mutex<JobQueue>,
    pub suppression: Mutex<SuppressionIndex>,
    pub policy_view: Mutex<PolicyView>,
    pub store: Arc<dyn Store>,
    pub delivery_queue: DeliveryQueue,
    pub alertmanager: AlertmanagerBridge,
    pub metrics: Arc<Metrics>,
    pub settings: RwLock<YuptimeSettingsSpec>,
    pub diagnostics: Arc<RwLock<Diagnostics>>,
}

impl OperatorContext {
    pub fn new(client: Client, store: Arc<dyn Store>, metrics: Arc<Metrics>) -> Arc<Self> {
        Arc::new(Self {
            client,
            cache: ResourceCache::new(),
            job_registry: Mutex::new(JobRegistry::new()),
            queue: Mutex::new(JobQueue::new()),
            suppression: Mutex::new(SuppressionIndex::new()),
            policy_view: Mutex::new(PolicyView::new()),
            delivery_queue: DeliveryQueue::new(store.clone(), metrics.clone()),
            store,
            alertmanager: AlertmanagerBridge::default(),
            metrics,
            settings: RwLock::new(YuptimeSettingsSpec::default()),
            diagnostics: Arc::new(RwLock::new(Diagnostics::default())),
        })
    }

    pub async fn max_concurrent_net_checks(&self) -> u32 {
        self.settings.read().await.max_concurrent_net_checks
    }

    pub async fn max_concurrent_priv_checks(&self) -> u32 {
        self.settings.read().await.max_concurrent_priv_checks
    }

    pub async fn min_interval_sec(&self) -> u32 {
        self.settings.read().await.min_interval_sec
    }

    pub async fn note_reconcile(&self) {
        self.diagnostics.write().await.last_reconcile = Utc::now();
    }

    pub fn metrics_text(&self) -> String {
        let mut buffer = String::new();
        let registry = &*self.metrics.registry;
        prometheus_client::encoding::text::encode(&mut buffer, registry).unwrap();
        buffer
    }
}
