//! Event History
//! Mission: Keep a bounded, time-windowed log of dispatched reports
//!
//! Stored as one JSON array under a single key. Every append drops entries
//! older than the window and keeps only the newest `max_size`.

use std::collections::VecDeque;
use std::sync::Arc;
use tracing::warn;

use super::KvStore;
use crate::models::ReportEnvelope;

pub struct EventHistory {
    kv: Arc<dyn KvStore>,
    key: String,
    window_ms: i64,
    max_size: usize,
}

impl EventHistory {
    pub fn new(kv: Arc<dyn KvStore>, prefix: &str, window_ms: i64, max_size: usize) -> Self {
        Self {
            kv,
            key: format!("{}history", prefix),
            window_ms,
            max_size,
        }
    }

    /// Stored history, oldest first; empty when absent or unreadable
    pub fn load(&self) -> Vec<ReportEnvelope> {
        match self.kv.get(&self.key) {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(error = %e, "Corrupt event history, starting fresh");
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(error = %e, "Event history read failed");
                Vec::new()
            }
        }
    }

    /// Stored history still inside the window at `now_ms`
    pub fn load_at(&self, now_ms: i64) -> Vec<ReportEnvelope> {
        self.prune(self.load().into(), now_ms)
    }

    /// Append a report (without its own attached history) and persist the
    /// pruned log. Returns the log as stored.
    pub fn push(&self, report: &ReportEnvelope, now_ms: i64) -> Vec<ReportEnvelope> {
        let mut entry = report.clone();
        entry.event_history = None;

        let mut history: VecDeque<ReportEnvelope> = self.load().into();
        history.push_back(entry);
        let history = self.prune(history, now_ms);

        match serde_json::to_string(&history) {
            Ok(raw) => {
                if let Err(e) = self.kv.set(&self.key, &raw) {
                    warn!(error = %e, "Event history write failed");
                }
            }
            Err(e) => warn!(error = %e, "Failed to serialize event history"),
        }

        history
    }

    fn prune(&self, mut history: VecDeque<ReportEnvelope>, now_ms: i64) -> Vec<ReportEnvelope> {
        history.retain(|r| now_ms - r.time <= self.window_ms);
        while history.len() > self.max_size {
            history.pop_front();
        }
        history.into()
    }
}
