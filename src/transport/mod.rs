//! Report Transport
//! Mission: Deliver report envelopes to the collector and hand back its floor updates
//!
//! Delivery is fire-and-forget from the auction path: the dispatcher spawns
//! each send and applies whatever reconciliation the collector returns.

pub mod dispatcher;
pub mod http;

use anyhow::Result;

use crate::models::{ReconcilePayload, ReportEnvelope};

pub use dispatcher::ReportDispatcher;
pub use http::HttpReportTransport;

#[async_trait::async_trait]
pub trait ReportTransport: Send + Sync {
    /// POST one report. `Ok(None)` when the collector answered with no body.
    async fn send(&self, report: &ReportEnvelope) -> Result<Option<ReconcilePayload>>;
}
