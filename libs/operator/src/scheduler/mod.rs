//! The probe scheduler (§4.C/D/E): a singleton job registry, a priority
//! queue on `nextRunAt`, a cluster lease gating which replica drives it,
//! and the driver loop itself.

pub mod driver;
pub mod job;
pub mod lease;
pub mod queue;
