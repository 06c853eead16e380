//! **(AMBIENT)** The external `deliver()` capability (§6) and the secret
//! resolver (§9) are modeled as trait objects so the delivery worker and
//! the reconciler can be driven in tests with fakes, the same shape the
//! teacher uses for its mocked `kube::Client` in `tower-test`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::cache::TtlCache;
use crate::error::{Error, Result};

pub struct DeliveryOutcome {
    pub sent_at: DateTime<Utc>,
}

/// `deliver(provider, title, body) -> {success, sentAt?, error?}` (§6).
#[async_trait]
pub trait DeliverySink: Send + Sync {
    async fn deliver(&self, provider: &str, title: &str, body: &str) -> Result<DeliveryOutcome>;
}

/// `reqwest`-backed sink for providers whose `config` names a webhook URL.
/// Transport-specific formatting per notifier (chat/email/webhook) is out
/// of scope (§1); this issues a generic JSON POST of `{title, body}`.
pub struct HttpDeliverySink {
    client: reqwest::Client,
}

impl Default for HttpDeliverySink {
    fn default() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl DeliverySink for HttpDeliverySink {
    async fn deliver(&self, provider: &str, title: &str, body: &str) -> Result<DeliveryOutcome> {
        let response = self
            .client
            .post(provider)
            .json(&serde_json::json!({ "title": title, "body": body }))
            .send()
            .await
            .map_err(|e| Error::Delivery(e.to_string()))?;
        if !response.status().is_success() {
            return Err(Error::Delivery(format!("non-2xx response: {}", response.status())));
        }
        Ok(DeliveryOutcome { sent_at: Utc::now() })
    }
}

/// `(namespace, name, key) -> bytes` (§9), with a TTL cache in front.
/// No secret value ever leaves the process through a `tracing` field.
#[async_trait]
pub trait SecretBackend: Send + Sync {
    async fn fetch(&self, namespace: &str, name: &str, key: &str) -> Result<Vec<u8>>;
}

pub struct SecretResolver {
    backend: Arc<dyn SecretBackend>,
    cache: TtlCache<Vec<u8>>,
}

impl SecretResolver {
    pub fn new(backend: Arc<dyn SecretBackend>, ttl: Duration) -> Self {
        Self {
            backend,
            cache: TtlCache::new(ttl),
        }
    }

    pub async fn resolve(&self, namespace: &str, name: &str, key: &str) -> Result<Vec<u8>> {
        let cache_key = format!("{namespace}/{name}#{key}");
        if let Some(value) = self.cache.get(&cache_key).await {
            return Ok(value);
        }
        let value = self.backend.fetch(namespace, name, key).await?;
        self.cache.insert(cache_key, value.clone()).await;
        Ok(value)
    }
}

pub struct KubeSecretBackend {
    client: kube::Client,
}

impl KubeSecretBackend {
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SecretBackend for KubeSecretBackend {
    async fn fetch(&self, namespace: &str, name: &str, key: &str) -> Result<Vec<u8>> {
        use k8s_openapi::api::core::v1::Secret;
        use kube::api::Api;

        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let secret = api.get(name).await?;
        secret
            .data
            .and_then(|mut data| data.remove(key))
            .map(|b| b.0)
            .ok_or_else(|| Error::Validation(format!("secret {namespace}/{name} missing key {key}")))
    }
}
