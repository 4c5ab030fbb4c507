//! Floor Analytics Facade
//! Mission: Single subscription surface the host drives with events and ad units
//!
//! Ties the pieces together per host call:
//! - `prepare` injects floors into outgoing ad units
//! - `on_event` correlates, wraps finished correlations into a report
//!   envelope, records it in the history and dispatches it in the background
//! - collector replies are reconciled into the floor store by the dispatch task

use anyhow::{Context, Result};
use chrono::Utc;
use reqwest::Url;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::auction::{CorrelatedReport, CorrelatorConfig, EventCorrelator};
use crate::config::AppConfig;
use crate::error::TrackerError;
use crate::floors::{PrepareOutcome, PriceFloorEngine, ReconcileSummary};
use crate::models::{AdUnit, AuctionEvent, ReconcilePayload, ReportEnvelope};
use crate::session::{SessionTracker, UtmTracker};
use crate::storage::{EventHistory, FloorConfigStore, KvStore};
use crate::transport::{ReportDispatcher, ReportTransport};

/// A report handed to the transport
pub struct Dispatched {
    pub report: ReportEnvelope,
    /// Completes once delivery and reconciliation are done (or failed)
    pub delivery: JoinHandle<()>,
}

pub struct FloorAnalytics {
    engine: PriceFloorEngine,
    correlator: EventCorrelator,
    history: EventHistory,
    dispatcher: ReportDispatcher,
    store: FloorConfigStore,
    sessions: SessionTracker,
    utm: UtmTracker,
    page_url: Option<Url>,
    attach_history: bool,
}

impl FloorAnalytics {
    pub fn new(
        config: &AppConfig,
        kv: Arc<dyn KvStore>,
        transport: Arc<dyn ReportTransport>,
    ) -> Self {
        let prefix = config.key_prefix.as_str();
        let store = FloorConfigStore::new(kv.clone(), prefix);
        let engine = PriceFloorEngine::new(store.clone());
        let dispatcher = ReportDispatcher::new(transport, engine.reconciler());

        Self {
            correlator: EventCorrelator::new(CorrelatorConfig {
                stale_window_ms: config.stale_window_ms,
            }),
            history: EventHistory::new(
                kv.clone(),
                prefix,
                config.history_window_ms,
                config.history_cap,
            ),
            sessions: SessionTracker::new(kv.clone(), prefix, config.session_timeout_ms),
            utm: UtmTracker::new(kv, prefix, config.utm_timeout_ms),
            engine,
            dispatcher,
            store,
            page_url: None,
            attach_history: config.attach_history,
        }
    }

    /// Page the host is running on; enables session and campaign attribution
    pub fn set_page_url(&mut self, page_url: &str) -> Result<()> {
        let url = Url::parse(page_url).with_context(|| format!("Invalid page URL: {}", page_url))?;
        self.page_url = Some(url);
        Ok(())
    }

    pub fn prepare(&mut self, ad_units: &mut [AdUnit]) -> PrepareOutcome {
        self.engine.prepare(ad_units)
    }

    /// Apply a collector payload received out of band
    pub fn reconcile(&self, payload: &ReconcilePayload) -> ReconcileSummary {
        self.engine.reconcile(payload)
    }

    pub fn on_event(&mut self, event: &AuctionEvent) -> Result<Option<Dispatched>, TrackerError> {
        self.on_event_at(event, Utc::now().timestamp_millis())
    }

    /// Same as `on_event` with an explicit wall clock. Must be called within
    /// a tokio runtime when the event completes a report.
    pub fn on_event_at(
        &mut self,
        event: &AuctionEvent,
        now_ms: i64,
    ) -> Result<Option<Dispatched>, TrackerError> {
        let engine = &mut self.engine;
        let Some(correlated) = self.correlator.handle(event, || engine.begin_round())? else {
            return Ok(None);
        };

        let report = self.envelope(correlated, now_ms);
        self.history.push(&report, now_ms);
        debug!(
            kind = ?report.event_stack_type,
            events = report.events.len(),
            "Dispatching report"
        );
        let delivery = self.dispatcher.dispatch(report.clone());
        Ok(Some(Dispatched { report, delivery }))
    }

    fn envelope(&self, correlated: CorrelatedReport, now_ms: i64) -> ReportEnvelope {
        let event_history = self.attach_history.then(|| self.history.load_at(now_ms));
        let (session_id, utm_tag_data) = match &self.page_url {
            Some(url) => (
                Some(self.sessions.current(now_ms)),
                Some(self.utm.resolve(Some(url), now_ms)),
            ),
            None => (None, None),
        };

        ReportEnvelope {
            time: now_ms,
            info_string: self.store.info_string(),
            price_floor_settings: correlated
                .floor_settings
                .unwrap_or_else(|| self.engine.snapshot()),
            events: correlated.events,
            event_stack_type: correlated.kind,
            session_id,
            utm_tag_data,
            event_history,
        }
    }

    pub fn correlator(&self) -> &EventCorrelator {
        &self.correlator
    }

    pub fn store(&self) -> &FloorConfigStore {
        &self.store
    }

    pub fn history(&self) -> &EventHistory {
        &self.history
    }
}
