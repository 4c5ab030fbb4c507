//! Background report delivery
//!
//! Each report is sent on its own task. Failures are logged and dropped:
//! no retries, no queueing, the next auction simply reports again.

use anyhow::Result;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::ReportTransport;
use crate::floors::{FloorReconciler, ReconcileSummary};
use crate::models::ReportEnvelope;

#[derive(Clone)]
pub struct ReportDispatcher {
    transport: Arc<dyn ReportTransport>,
    reconciler: FloorReconciler,
}

impl ReportDispatcher {
    pub fn new(transport: Arc<dyn ReportTransport>, reconciler: FloorReconciler) -> Self {
        Self {
            transport,
            reconciler,
        }
    }

    /// Send one report and apply the collector's reconciliation, if any
    pub async fn deliver(&self, report: &ReportEnvelope) -> Result<Option<ReconcileSummary>> {
        let Some(payload) = self.transport.send(report).await? else {
            debug!("Collector returned no floor update");
            return Ok(None);
        };
        Ok(Some(self.reconciler.apply(&payload)))
    }

    /// Deliver in the background. Must be called within a tokio runtime.
    pub fn dispatch(&self, report: ReportEnvelope) -> JoinHandle<()> {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            if let Err(e) = dispatcher.deliver(&report).await {
                warn!(
                    error = %e,
                    kind = ?report.event_stack_type,
                    events = report.events.len(),
                    "Report delivery failed"
                );
            }
        })
    }
}
