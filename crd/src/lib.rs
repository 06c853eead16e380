//! Typed custom resource definitions for the yuptime operator.
//!
//! Kept as a separate crate so that tooling which only needs the wire
//! shape of our CRDs -- CLI helpers, CRD-generation binaries,
//! integration tests -- does not have to pull in the full reconciler,
//! scheduler and alert-pipeline dependency graph.

pub mod condition;
pub mod maintenance_window;
pub mod misc;
pub mod monitor;
pub mod notification;
pub mod selector;
pub mod settings;
pub mod silence;

pub use condition::{Condition, ConditionStatus};
pub use maintenance_window::{MaintenanceWindow, MaintenanceWindowSpec, MaintenanceWindowStatus};
pub use misc::{ApiKey, LocalUser, MonitorSet, PassthroughStatus, StatusPage};
pub use monitor::{Monitor, MonitorSpec, MonitorStatus, ProbeKind, ProbeTarget, Schedule};
pub use notification::{
    NotificationPolicy, NotificationPolicySpec, NotificationPolicyStatus, NotificationProvider,
    NotificationProviderSpec, NotificationProviderStatus,
};
pub use selector::{LabelExpression, LabelOperator, Selector};
pub use settings::{YuptimeSettings, YuptimeSettingsSpec, YuptimeSettingsStatus};
pub use silence::{Silence, SilenceSpec, SilenceStatus};

/// Name reserved for the single cluster-wide `YuptimeSettings` object.
pub const SETTINGS_SINGLETON_NAME: &str = "cluster";

/// Common `metadata.name` validation rule shared by every kind (§4.B):
/// `^[a-z0-9]([-a-z0-9]*[a-z0-9])?$`.
pub fn is_valid_resource_name(name: &str) -> bool {
    let bytes = name.as_bytes();
    if bytes.is_empty() {
        return false;
    }
    let is_alnum = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    if !is_alnum(bytes[0]) || !is_alnum(bytes[bytes.len() - 1]) {
        return false;
    }
    bytes
        .iter()
        .all(|&b| is_alnum(b) || b == b'-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_simple_names() {
        assert!(is_valid_resource_name("db-primary"));
        assert!(is_valid_resource_name("a"));
        assert!(is_valid_resource_name("a1-b2"));
    }

    #[test]
    fn rejects_invalid_names() {
        assert!(!is_valid_resource_name(""));
        assert!(!is_valid_resource_name("-leading"));
        assert!(!is_valid_resource_name("trailing-"));
        assert!(!is_valid_resource_name("Upper"));
        assert!(!is_valid_resource_name("has_underscore"));
    }
}
