//! Core services: post lifecycle and guest registry.

pub mod guests;
pub mod lifecycle;

pub use guests::GuestRegistry;
pub use lifecycle::{PostLifecycleManager, ReconcileReport, SweepReport};
