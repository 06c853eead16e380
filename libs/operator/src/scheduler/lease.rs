//! The cluster-wide singleton lease (§4.E, §6 "acquire()→bool, renew(),
//! release()"), grounded on `kube-runtime`'s own `Lease` object and its
//! `Elector` acquire/renew contract, simplified to the narrower shape this
//! scheduler needs: a single replica either holds the lease or doesn't,
//! and liveness (not correctness) of the queue depends on it (§4.E, §5).

use chrono::{DateTime, Duration, Utc};
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use kube::api::{Api, Patch, PatchParams, PostParams};
use tracing::{debug, warn};

use crate::error::Result;

pub struct LeaseGuard {
    api: Api<Lease>,
    name: String,
    identity: String,
    duration: Duration,
    held: bool,
}

impl LeaseGuard {
    pub fn new(api: Api<Lease>, name: impl Into<String>, identity: impl Into<String>, duration_sec: i64) -> Self {
        Self {
            api,
            name: name.into(),
            identity: identity.into(),
            duration: Duration::seconds(duration_sec),
            held: false,
        }
    }

    /// True if acquired (either freshly or because this identity already
    /// holds an unexpired lease).
    pub async fn acquire(&mut self) -> Result<bool> {
        let now = Utc::now();
        match self.api.get_opt(&self.name).await? {
            None => {
                let lease = Lease {
                    metadata: kube::api::ObjectMeta {
                        name: Some(self.name.clone()),
                        ..Default::default()
                    },
                    spec: Some(self.new_spec(now)),
                };
                self.api.create(&PostParams::default(), &lease).await?;
                self.held = true;
                Ok(true)
            }
            Some(existing) => {
                if self.is_expired_or_ours(&existing, now) {
                    self.patch_spec(self.new_spec(now)).await?;
                    self.held = true;
                    Ok(true)
                } else {
                    self.held = false;
                    Ok(false)
                }
            }
        }
    }

    pub async fn renew(&mut self) -> Result<()> {
        if !self.held {
            return Ok(());
        }
        let now = Utc::now();
        match self.api.get_opt(&self.name).await? {
            Some(existing) if self.is_expired_or_ours(&existing, now) => {
                self.patch_spec(self.new_spec(now)).await?;
                Ok(())
            }
            _ => {
                warn!(lease = %self.name, "lost scheduler lease during renewal");
                self.held = false;
                Err(crate::error::Error::LeaseLost)
            }
        }
    }

    pub async fn release(&mut self) -> Result<()> {
        if !self.held {
            return Ok(());
        }
        if let Some(mut existing) = self.api.get_opt(&self.name).await? {
            if let Some(spec) = existing.spec.as_mut() {
                if spec.holder_identity.as_deref() == Some(self.identity.as_str()) {
                    spec.renew_time = None;
                    let patch = Patch::Merge(serde_json::json!({ "spec": { "holderIdentity": null } }));
                    self.api.patch(&self.name, &PatchParams::default(), &patch).await?;
                }
            }
        }
        self.held = false;
        debug!(lease = %self.name, "released scheduler lease");
        Ok(())
    }

    pub fn is_held(&self) -> bool {
        self.held
    }

    fn is_expired_or_ours(&self, lease: &Lease, now: DateTime<Utc>) -> bool {
        let Some(spec) = &lease.spec else { return true };
        if spec.holder_identity.as_deref() == Some(self.identity.as_str()) {
            return true;
        }
        let renewed_at = spec
            .renew_time
            .as_ref()
            .map(|t| t.0)
            .unwrap_or_else(|| now - self.duration - Duration::seconds(1));
        let lease_duration = spec
            .lease_duration_seconds
            .map(|s| Duration::seconds(s as i64))
            .unwrap_or(self.duration);
        now > renewed_at + lease_duration
    }

    fn new_spec(&self, now: DateTime<Utc>) -> LeaseSpec {
        LeaseSpec {
            holder_identity: Some(self.identity.clone()),
            lease_duration_seconds: Some(self.duration.num_seconds() as i32),
            renew_time: Some(k8s_openapi::apimachinery::pkg::apis::meta::v1::MicroTime(now)),
            acquire_time: Some(k8s_openapi::apimachinery::pkg::apis::meta::v1::MicroTime(now)),
            lease_transitions: None,
            preferred_holder: None,
            strategy: None,
        }
    }

    async fn patch_spec(&self, spec: LeaseSpec) -> Result<()> {
        let patch = Patch::Merge(serde_json::json!({ "spec": spec }));
        self.api.patch(&self.name, &PatchParams::default(), &patch).await?;
        Ok(())
    }
}
