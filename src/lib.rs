//! Floorwatch Library
//!
//! Auction event correlation and adaptive price floors for header-bidding
//! hosts. The host drives `FloorAnalytics` with ad units (`prepare`) and
//! auction events (`on_event`); finished correlations are reported to a
//! remote collector whose replies re-arm per-bidder floors.

pub mod analytics;
pub mod auction;
pub mod config;
pub mod error;
pub mod floors;
pub mod models;
pub mod session;
pub mod storage;
pub mod transport;

pub use analytics::{Dispatched, FloorAnalytics};
pub use config::AppConfig;
pub use error::TrackerError;
