//! Auction Correlation
//! Mission: Turn the host's event stream into per-auction and per-impression reports
//!
//! `state` holds one auction's requests and responses, `lifecycle` owns the
//! set of live auctions and the current-auction pointer, and `correlator`
//! drives both from incoming events.

pub mod correlator;
pub mod lifecycle;
pub mod state;

pub use correlator::{CorrelatedReport, CorrelatorConfig, EventCorrelator};
pub use lifecycle::LifecycleTracker;
pub use state::AuctionState;
