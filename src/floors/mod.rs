//! Adaptive Price Floors
//!
//! `engine` decides which floors go out with each request; `reconcile` folds
//! collector responses back into stored config.

pub mod engine;
pub mod reconcile;

pub use engine::{PrepareOutcome, PriceFloorEngine};
pub use reconcile::{FloorReconciler, ReconcileSummary};
