//! The common validation rule shared by every kind (§4.B): a valid
//! `metadata.name` and a present `spec`. `spec` presence is guaranteed by
//! the Kubernetes API server schema for required fields, so in practice
//! this module only checks the name rule; kind-specific reconcilers layer
//! their own invariants on top.

use crate::error::{Error, Result};

pub fn validate_name(name: &str) -> Result<()> {
    if yuptime_crd::is_valid_resource_name(name) {
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "metadata.name {name:?} does not match ^[a-z0-9]([-a-z0-9]*[a-z0-9])?$"
        )))
    }
}
