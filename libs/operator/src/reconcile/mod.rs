//! Per-kind reconcilers (§4.B). Each submodule exposes a `reconcile()` /
//! `error_policy()` pair with the signature `kube::runtime::Controller`
//! expects; the binary crate wires one `Controller` per kind against
//! these pairs, all sharing the same `Arc<OperatorContext>`.

pub mod condition;
pub mod maintenance_window;
pub mod monitor;
pub mod notification;
pub mod settings;
pub mod silence;
pub mod validation;
