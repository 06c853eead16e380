//! Error taxonomy (§7). Reconciler and worker errors never escape past
//! the boundary that catches them -- they are mapped to `status.conditions`
//! or to a delivery record, never propagated to the process. Only
//! [`Error::ConfigFatal`] aborts the process (exit code `1`).

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Any error originating from the `kube-rs` crate talking to the API server.
    #[error("Kubernetes reported error: {0}")]
    KubeError(#[source] kube::Error),

    /// ValidationError (§7): rejects a reconciliation, surfaced via `Valid=False`.
    #[error("invalid resource: {0}")]
    Validation(String),

    /// TransientExternalError (§7): logged, retried on the next tick.
    #[error("transient error talking to an external system: {0}")]
    Transient(String),

    /// DeliveryFailure (§7): recorded on the delivery record, never propagated.
    #[error("delivery failed: {0}")]
    Delivery(String),

    /// LeaseLost (§7): structural, not fatal -- the driver stops popping.
    #[error("scheduler lease lost")]
    LeaseLost,

    /// ConfigFatal (§7): invalid process configuration at startup.
    #[error("fatal configuration error: {0}")]
    ConfigFatal(String),

    #[error("monitor {0} is missing a namespace")]
    MissingNamespace(String),

    #[error("invalid trace id")]
    InvalidTraceId,

    #[error("store error: {0}")]
    Store(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl From<kube::Error> for Error {
    fn from(e: kube::Error) -> Self {
        Error::KubeError(e)
    }
}

impl Error {
    /// Coarse label safe to attach to a Prometheus metric (never the full message,
    /// which may embed request paths or other high-cardinality detail).
    pub fn metric_label(&self) -> String {
        match self {
            Error::KubeError(_) => "kube".to_string(),
            Error::Validation(_) => "validation".to_string(),
            Error::Transient(_) => "transient".to_string(),
            Error::Delivery(_) => "delivery".to_string(),
            Error::LeaseLost => "lease_lost".to_string(),
            Error::ConfigFatal(_) => "config_fatal".to_string(),
            Error::MissingNamespace(_) => "missing_namespace".to_string(),
            Error::InvalidTraceId => "invalid_trace_id".to_string(),
            Error::Store(_) => "store".to_string(),
        }
    }
}
