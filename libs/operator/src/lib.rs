//! Business logic crate for the yuptime operator: reconcilers, the probe
//! scheduler, the alert/suppression/delivery pipeline and the pluggable
//! persistence layer. The binary crate wires these modules to concrete
//! `kube::runtime::Controller`s and an HTTP surface; this crate only
//! depends on `yuptime-crd` and `yuptime-k8s-util` plus the runtime
//! libraries each component needs.

pub mod alert;
pub mod alertmanager;
pub mod cache;
pub mod context;
pub mod delivery;
pub mod error;
pub mod heartbeat;
pub mod metrics;
pub mod probe;
pub mod reconcile;
pub mod retention;
pub mod scheduler;
pub mod sink;
pub mod store;
pub mod suppression;
pub mod telemetry;

pub use context::OperatorContext;
pub use error::{Error, Result};
