use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::condition::Condition;

/// Minimum allowed `intervalSec` absent an overriding `YuptimeSettings` (§3).
pub const DEFAULT_MIN_INTERVAL_SEC: u32 = 20;

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "yuptime.io",
    version = "v1",
    kind = "Monitor",
    namespaced,
    status = "MonitorStatus",
    shortname = "mon"
)]
pub struct MonitorSpec {
    #[serde(rename = "type")]
    pub type_: ProbeKind,
    pub target: ProbeTarget,
    pub schedule: Schedule,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_criteria: Option<SuccessCriteria>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// Defaults to enabled when absent (§4.B: "if disabled or deleted, remove it").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Alertmanager bridge mode target (§6).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alertmanager_url: Option<String>,
}

impl MonitorSpec {
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum ProbeKind {
    Http,
    Tcp,
    Dns,
    Icmp,
    WebSocket,
    Grpc,
    Push,
    GameServer,
    KubernetesResource,
}

/// Type-discriminated union of probe targets (§3, Design Notes §9).
/// Only the executor contract (§6) is implemented downstream; the shape
/// here exists so the reconciler can validate "exactly one target variant
/// consistent with the type tag".
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum ProbeTarget {
    Http(HttpTarget),
    Tcp(TcpTarget),
    Dns(DnsTarget),
    Icmp(IcmpTarget),
    WebSocket(WebSocketTarget),
    Grpc(GrpcTarget),
    Push(PushTarget),
    GameServer(GameServerTarget),
    KubernetesResource(KubernetesResourceTarget),
}

impl ProbeTarget {
    /// The `ProbeKind` this target variant corresponds to.
    pub fn kind(&self) -> ProbeKind {
        match self {
            ProbeTarget::Http(_) => ProbeKind::Http,
            ProbeTarget::Tcp(_) => ProbeKind::Tcp,
            ProbeTarget::Dns(_) => ProbeKind::Dns,
            ProbeTarget::Icmp(_) => ProbeKind::Icmp,
            ProbeTarget::WebSocket(_) => ProbeKind::WebSocket,
            ProbeTarget::Grpc(_) => ProbeKind::Grpc,
            ProbeTarget::Push(_) => ProbeKind::Push,
            ProbeTarget::GameServer(_) => ProbeKind::GameServer,
            ProbeTarget::KubernetesResource(_) => ProbeKind::KubernetesResource,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
pub struct HttpTarget {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
pub struct TcpTarget {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
pub struct DnsTarget {
    pub hostname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolver: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_type: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
pub struct IcmpTarget {
    pub host: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
pub struct WebSocketTarget {
    pub url: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
pub struct GrpcTarget {
    pub host: String,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
pub struct PushTarget {
    /// Identifier the push client authenticates with; no address to dial.
    pub push_token: String,
    pub grace_period_sec: u32,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
pub struct GameServerTarget {
    pub host: String,
    pub port: u16,
    pub protocol: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
pub struct KubernetesResourceTarget {
    pub api_version: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
pub struct SuccessCriteria {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_status_codes: Option<Vec<u16>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_contains: Option<String>,
}

/// `{intervalSec >= 20, timeoutSec < intervalSec, retries, initialDelaySec,
/// jitterPercent in [0,100]}` (§3).
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
pub struct Schedule {
    pub interval_sec: u32,
    pub timeout_sec: u32,
    #[serde(default)]
    pub retries: u32,
    #[serde(default)]
    pub initial_delay_sec: u32,
    #[serde(default)]
    pub jitter_percent: u8,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
pub struct MonitorStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_kind_matches_variant() {
        let t = ProbeTarget::Tcp(TcpTarget {
            host: "db".into(),
            port: 5432,
        });
        assert_eq!(t.kind(), ProbeKind::Tcp);
    }

    #[test]
    fn enabled_defaults_true() {
        let spec = MonitorSpec {
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
                jitter_percent: 10,
            },
            success_criteria: None,
            labels: None,
            tags: None,
            enabled: None,
            alertmanager_url: None,
        };
        assert!(spec.is_enabled());
    }
}
