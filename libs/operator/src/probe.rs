//! Component F: the probe executor contract (§6). Only the contract is
//! implemented here -- the HTTP/TCP/DNS/ICMP/WebSocket/gRPC/push/
//! gameserver/Kubernetes-resource probe bodies are out of scope (§1).

use async_trait::async_trait;

use crate::store::MonitorState;
use yuptime_crd::Monitor;

#[derive(Clone, Debug)]
pub struct ProbeResult {
    pub state: MonitorState,
    pub latency_ms: f64,
    pub reason: String,
    pub message: String,
}

impl ProbeResult {
    /// Exceeding `timeout` must produce `state=down, reason=TIMEOUT` (§6).
    pub fn timeout(elapsed_ms: f64) -> Self {
        Self {
            state: MonitorState::Down,
            latency_ms: elapsed_ms,
            reason: "TIMEOUT".to_string(),
            message: "probe exceeded its configured timeout".to_string(),
        }
    }
}

/// `execute(monitor, timeout) -> ProbeResult` (§6). Implementations are an
/// external collaborator; this crate only drives the contract from the
/// scheduler's dispatch path.
#[async_trait]
pub trait ProbeExecutor: Send + Sync {
    async fn execute(&self, monitor: &Monitor, timeout_sec: u32) -> ProbeResult;
}
