//! Component A: in-memory, typed store of observed custom resources keyed
//! by `(kind, namespace, name)`, with fan-out of change events to the
//! reconciler registry (§4.A).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, RwLock};
use yuptime_crd::{
    ApiKey, LocalUser, MaintenanceWindow, Monitor, MonitorSet, NotificationPolicy,
    NotificationProvider, Silence, StatusPage, YuptimeSettings,
};

/// The recognized-kinds allowlist (§4.A, §6).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    Monitor,
    MonitorSet,
    NotificationProvider,
    NotificationPolicy,
    StatusPage,
    MaintenanceWindow,
    Silence,
    LocalUser,
    ApiKey,
    YuptimeSettings,
}

impl Kind {
    pub const ALL: &'static [Kind] = &[
        Kind::Monitor,
        Kind::MonitorSet,
        Kind::NotificationProvider,
        Kind::NotificationPolicy,
        Kind::StatusPage,
        Kind::MaintenanceWindow,
        Kind::Silence,
        Kind::LocalUser,
        Kind::ApiKey,
        Kind::YuptimeSettings,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Monitor => "Monitor",
            Kind::MonitorSet => "MonitorSet",
            Kind::NotificationProvider => "NotificationProvider",
            Kind::NotificationPolicy => "NotificationPolicy",
            Kind::StatusPage => "StatusPage",
            Kind::MaintenanceWindow => "MaintenanceWindow",
            Kind::Silence => "Silence",
            Kind::LocalUser => "LocalUser",
            Kind::ApiKey => "ApiKey",
            Kind::YuptimeSettings => "YuptimeSettings",
        }
    }
}

/// Typed, tagged union of the documents the cache can hold (Design Notes §9:
/// parse at the boundary, work on tagged unions downstream rather than `any`).
#[derive(Clone, Debug)]
pub enum ResourceDocument {
    Monitor(Arc<Monitor>),
    MonitorSet(Arc<MonitorSet>),
    NotificationProvider(Arc<NotificationProvider>),
    NotificationPolicy(Arc<NotificationPolicy>),
    StatusPage(Arc<StatusPage>),
    MaintenanceWindow(Arc<MaintenanceWindow>),
    Silence(Arc<Silence>),
    LocalUser(Arc<LocalUser>),
    ApiKey(Arc<ApiKey>),
    YuptimeSettings(Arc<YuptimeSettings>),
}

impl ResourceDocument {
    pub fn kind(&self) -> Kind {
        match self {
            ResourceDocument::Monitor(_) => Kind::Monitor,
            ResourceDocument::MonitorSet(_) => Kind::MonitorSet,
            ResourceDocument::NotificationProvider(_) => Kind::NotificationProvider,
            ResourceDocument::NotificationPolicy(_) => Kind::NotificationPolicy,
            ResourceDocument::StatusPage(_) => Kind::StatusPage,
            ResourceDocument::MaintenanceWindow(_) => Kind::MaintenanceWindow,
            ResourceDocument::Silence(_) => Kind::Silence,
            ResourceDocument::LocalUser(_) => Kind::LocalUser,
            ResourceDocument::ApiKey(_) => Kind::ApiKey,
            ResourceDocument::YuptimeSettings(_) => Kind::YuptimeSettings,
        }
    }

    pub fn as_monitor(&self) -> Option<&Arc<Monitor>> {
        match self {
            ResourceDocument::Monitor(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_silence(&self) -> Option<&Arc<Silence>> {
        match self {
            ResourceDocument::Silence(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_maintenance_window(&self) -> Option<&Arc<MaintenanceWindow>> {
        match self {
            ResourceDocument::MaintenanceWindow(w) => Some(w),
            _ => None,
        }
    }

    pub fn as_notification_policy(&self) -> Option<&Arc<NotificationPolicy>> {
        match self {
            ResourceDocument::NotificationPolicy(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_notification_provider(&self) -> Option<&Arc<NotificationProvider>> {
        match self {
            ResourceDocument::NotificationProvider(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_settings(&self) -> Option<&Arc<YuptimeSettings>> {
        match self {
            ResourceDocument::YuptimeSettings(s) => Some(s),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    pub kind: Kind,
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(kind: Kind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn id(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

impl Eq for Kind {}

#[derive(Clone, Debug)]
pub struct ChangeEvent {
    pub key: ObjectKey,
    pub old: Option<ResourceDocument>,
    pub new: Option<ResourceDocument>,
}

struct Entry {
    resource_version: Option<String>,
    document: ResourceDocument,
}

#[derive(Default)]
struct Inner {
    objects: HashMap<ObjectKey, Entry>,
}

pub struct ResourceCache {
    inner: RwLock<Inner>,
    events_tx: broadcast::Sender<ChangeEvent>,
}

impl ResourceCache {
    pub fn new() -> Arc<Self> {
        let (events_tx, _rx) = broadcast::channel(1024);
        Arc::new(Self {
            inner: RwLock::new(Inner::default()),
            events_tx,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.events_tx.subscribe()
    }

    /// Last-writer-wins on `resourceVersion` monotonicity (§4.A). A missing
    /// `resource_version` (e.g. in tests) always wins.
    pub async fn upsert(
        &self,
        key: ObjectKey,
        resource_version: Option<String>,
        document: ResourceDocument,
    ) {
        let mut inner = self.inner.write().await;
        let old = inner.objects.get(&key).map(|e| e.document.clone());
        if let (Some(existing), Some(new_rv)) = (inner.objects.get(&key), &resource_version) {
            if let Some(old_rv) = &existing.resource_version {
                if !is_newer_or_equal(new_rv, old_rv) {
                    return;
                }
            }
        }
        inner.objects.insert(
            key.clone(),
            Entry {
                resource_version,
                document: document.clone(),
            },
        );
        drop(inner);
        let _ = self.events_tx.send(ChangeEvent {
            key,
            old,
            new: Some(document),
        });
    }

    pub async fn remove(&self, key: ObjectKey) {
        let mut inner = self.inner.write().await;
        let old = inner.objects.remove(&key).map(|e| e.document);
        drop(inner);
        if old.is_some() {
            let _ = self.events_tx.send(ChangeEvent {
                key,
                old,
                new: None,
            });
        }
    }

    pub async fn get(&self, key: &ObjectKey) -> Option<ResourceDocument> {
        self.inner.read().await.objects.get(key).map(|e| e.document.clone())
    }

    pub async fn list_by_kind(&self, kind: Kind) -> Vec<(ObjectKey, ResourceDocument)> {
        self.inner
            .read()
            .await
            .objects
            .iter()
            .filter(|(k, _)| k.kind == kind)
            .map(|(k, e)| (k.clone(), e.document.clone()))
            .collect()
    }
}

/// Numeric `resourceVersion` comparison with a lexicographic fallback for
/// opaque/non-numeric version strings (Kubernetes does not guarantee the
/// numeric format, only monotonicity within a given resource).
fn is_newer_or_equal(new: &str, old: &str) -> bool {
    match (new.parse::<u64>(), old.parse::<u64>()) {
        (Ok(n), Ok(o)) => n >= o,
        _ => new >= old,
    }
}

/// A small TTL cache used for the secret resolver (§9 Design Notes).
pub struct TtlCache<V> {
    ttl: Duration,
    entries: RwLock<HashMap<String, (Instant, V)>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, key: &str) -> Option<V> {
        let entries = self.entries.read().await;
        entries.get(key).and_then(|(inserted, v)| {
            if inserted.elapsed() < self.ttl {
                Some(v.clone())
            } else {
                None
            }
        })
    }

    pub async fn insert(&self, key: String, value: V) {
        self.entries.write().await.insert(key, (Instant::now(), value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::Resource;
    use std::sync::Arc as StdArc;
    use yuptime_crd::{Monitor, MonitorSpec, ProbeKind, ProbeTarget, Schedule, TcpTarget};

    fn test_monitor(name: &str) -> Monitor {
        let mut m = Monitor::new(
            name,
            MonitorSpec {
                type_: ProbeKind::Tcp,
                target: ProbeTarget::Tcp(TcpTarget {
                    host: "db".into(),
                    port: 5432,
                }),
                schedule: Schedule {
                    interval_sec: 30,
                    timeout_sec: 5,
                    retries: 0,
                    initial_delay_sec: 0,
                    jitter_percent: 0,
                },
                success_criteria: None,
                labels: None,
                tags: None,
                enabled: None,
                alertmanager_url: None,
            },
        );
        m.meta_mut().namespace = Some("default".into());
        m
    }

    #[tokio::test]
    async fn upsert_then_get_roundtrips() {
        let cache = ResourceCache::new();
        let key = ObjectKey::new(Kind::Monitor, "default", "m1");
        let doc = ResourceDocument::Monitor(StdArc::new(test_monitor("m1")));
        cache.upsert(key.clone(), Some("1".into()), doc).await;
        assert!(cache.get(&key).await.is_some());
    }

    #[tokio::test]
    async fn stale_resource_version_is_ignored() {
        let cache = ResourceCache::new();
        let key = ObjectKey::new(Kind::Monitor, "default", "m1");
        cache
            .upsert(
                key.clone(),
                Some("5".into()),
                ResourceDocument::Monitor(StdArc::new(test_monitor("m1"))),
            )
            .await;
        cache
            .upsert(
                key.clone(),
                Some("2".into()),
                ResourceDocument::Monitor(StdArc::new(test_monitor("m1"))),
            )
            .await;
        let mut rx = cache.subscribe();
        cache.remove(key.clone()).await;
        let ev = rx.recv().await.unwrap();
        assert!(ev.old.is_some());
    }

    #[tokio::test]
    async fn remove_emits_change_event_with_no_new() {
        let cache = ResourceCache::new();
        let key = ObjectKey::new(Kind::Monitor, "default", "m1");
        let mut rx = cache.subscribe();
        cache
            .upsert(
                key.clone(),
                None,
                ResourceDocument::Monitor(StdArc::new(test_monitor("m1"))),
            )
            .await;
        let _ = rx.recv().await.unwrap();
        cache.remove(key.clone()).await;
        let ev = rx.recv().await.unwrap();
        assert!(ev.new.is_none());
        assert!(ev.old.is_some());
    }
}
