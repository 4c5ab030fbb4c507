//! Auction Lifecycle Tracker
//!
//! Owns every per-auction state and the single "current auction" pointer used
//! to attribute events that carry no auction id. States live from
//! `auction-init` until they go stale; finalized states stay readable so a
//! late `bid-won` still correlates.

use std::collections::HashMap;
use tracing::{debug, warn};

use super::state::AuctionState;
use crate::error::TrackerError;
use crate::models::FloorSettings;

pub struct LifecycleTracker {
    auctions: HashMap<String, AuctionState>,
    current: Option<String>,
    stale_window_ms: i64,
}

impl LifecycleTracker {
    pub fn new(stale_window_ms: i64) -> Self {
        Self {
            auctions: HashMap::new(),
            current: None,
            stale_window_ms,
        }
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn contains(&self, auction_id: &str) -> bool {
        self.auctions.contains_key(auction_id)
    }

    /// Current auction id, if its state is still active
    fn active_current(&self) -> Option<&str> {
        let current = self.current.as_deref()?;
        self.auctions
            .get(current)
            .filter(|s| s.is_active())
            .map(|_| current)
    }

    /// Start tracking an auction. Purges stale states first, then refuses to
    /// replace an unfinished current auction. `floor_settings` runs only once
    /// the auction is accepted.
    pub fn begin<F>(
        &mut self,
        auction_id: &str,
        timestamp: i64,
        floor_settings: F,
    ) -> Result<&mut AuctionState, TrackerError>
    where
        F: FnOnce() -> FloorSettings,
    {
        self.purge_stale(timestamp);

        if let Some(current) = self.active_current() {
            return Err(TrackerError::AuctionConflict {
                current: current.to_string(),
                incoming: auction_id.to_string(),
            });
        }
        if self.auctions.contains_key(auction_id) {
            return Err(TrackerError::AuctionConflict {
                current: auction_id.to_string(),
                incoming: auction_id.to_string(),
            });
        }

        debug!(auction_id, timestamp, "Auction started");
        self.current = Some(auction_id.to_string());
        let state = AuctionState::new(auction_id, timestamp, floor_settings());
        Ok(self.auctions.entry(auction_id.to_string()).or_insert(state))
    }

    /// Resolve the auction an event belongs to. An explicit id that differs
    /// from an active current auction is a protocol violation.
    pub fn resolve(
        &self,
        explicit: Option<&str>,
        kind: &'static str,
    ) -> Result<Option<String>, TrackerError> {
        match (explicit, self.active_current()) {
            (Some(id), Some(current)) if id != current => Err(TrackerError::ForeignAuctionEvent {
                kind,
                current: current.to_string(),
                incoming: id.to_string(),
            }),
            (Some(id), _) => Ok(Some(id.to_string())),
            (None, _) => Ok(self.current.clone()),
        }
    }

    pub fn get(&self, auction_id: &str) -> Option<&AuctionState> {
        self.auctions.get(auction_id)
    }

    pub fn get_mut(&mut self, auction_id: &str) -> Option<&mut AuctionState> {
        self.auctions.get_mut(auction_id)
    }

    /// Mark an auction finished and release the current pointer
    pub fn finish(&mut self, auction_id: &str) -> Option<&AuctionState> {
        if self.current.as_deref() == Some(auction_id) {
            self.current = None;
        }
        let state = self.auctions.get_mut(auction_id)?;
        state.finalize();
        Some(&*state)
    }

    /// Drop every auction that started `stale_window_ms` or more before `now_ms`
    pub fn purge_stale(&mut self, now_ms: i64) -> usize {
        let window = self.stale_window_ms;
        let before = self.auctions.len();
        self.auctions.retain(|_, s| !s.is_stale(now_ms, window));
        let purged = before - self.auctions.len();

        if let Some(current) = self.current.as_deref() {
            if !self.auctions.contains_key(current) {
                warn!(auction_id = current, "Current auction went stale without auction-end");
                self.current = None;
            }
        }
        if purged > 0 {
            debug!(purged, remaining = self.auctions.len(), "Purged stale auctions");
        }
        purged
    }
}
