//! Auction Event Correlator
//! Mission: Join bid requests and responses per auction and placement into reports
//!
//! Per auction: `absent -> active -> finalized`.
//! - `auction-init` creates the state and purges stale ones
//! - `bid-requested` / `bid-response` accumulate while active, in any
//!   cross-bidder order
//! - `auction-end` emits one auction summary per requested placement
//! - `bid-response` naming a finalized auction emits a late-bid report
//! - `bid-won` emits an impression at any time, independent of `auction-end`

use tracing::{debug, info, warn};

use super::lifecycle::LifecycleTracker;
use crate::error::TrackerError;
use crate::models::{
    normalize_code, AuctionEnd, AuctionEvent, AuctionInit, BidOutcome, BidRequested,
    BidResponse, BidWon, EventStackType, FloorSettings, ImpressionInfo, ImpressionSummary,
    LateBidSummary, ReportEvent, Size,
};

/// Configuration for event correlation
#[derive(Debug, Clone)]
pub struct CorrelatorConfig {
    /// Auctions older than this at the next `auction-init` are purged
    pub stale_window_ms: i64,
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            stale_window_ms: 36_000,
        }
    }
}

/// Finished correlation, ready to be wrapped into a report envelope
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelatedReport {
    pub kind: EventStackType,
    pub events: Vec<ReportEvent>,
    /// Floors of the auction the report belongs to; None when the auction is unknown
    pub floor_settings: Option<FloorSettings>,
}

pub struct EventCorrelator {
    tracker: LifecycleTracker,
}

impl EventCorrelator {
    pub fn new(config: CorrelatorConfig) -> Self {
        Self {
            tracker: LifecycleTracker::new(config.stale_window_ms),
        }
    }

    pub fn tracker(&self) -> &LifecycleTracker {
        &self.tracker
    }

    /// Feed one host event. `floors_at_start` is only called for
    /// `auction-init`, to capture the floors in effect for the new auction.
    pub fn handle<F>(
        &mut self,
        event: &AuctionEvent,
        floors_at_start: F,
    ) -> Result<Option<CorrelatedReport>, TrackerError>
    where
        F: FnOnce() -> FloorSettings,
    {
        match event {
            AuctionEvent::AuctionInit(e) => {
                self.on_auction_init(e, floors_at_start)?;
                Ok(None)
            }
            AuctionEvent::BidRequested(e) => {
                self.on_bid_requested(e)?;
                Ok(None)
            }
            AuctionEvent::BidResponse(e) => self.on_bid_response(e),
            AuctionEvent::AuctionEnd(e) => self.on_auction_end(e),
            AuctionEvent::BidWon(e) => Ok(Some(self.on_bid_won(e))),
        }
    }

    pub fn on_auction_init<F>(
        &mut self,
        event: &AuctionInit,
        floor_settings: F,
    ) -> Result<(), TrackerError>
    where
        F: FnOnce() -> FloorSettings,
    {
        self.tracker
            .begin(&event.auction_id, event.timestamp, floor_settings)?;
        Ok(())
    }

    pub fn on_bid_requested(&mut self, event: &BidRequested) -> Result<(), TrackerError> {
        let Some(state_id) = self.active_target(event.auction_id.as_deref(), "bid-requested")?
        else {
            return Ok(());
        };
        let Some(state) = self.tracker.get_mut(&state_id) else {
            return Ok(());
        };

        let bidder = normalize_code(&event.bidder_code);
        for bid in &event.bids {
            state.record_request(&normalize_code(&bid.placement_code), &bidder);
        }
        debug!(
            auction_id = %state_id,
            bidder = %bidder,
            placements = event.bids.len(),
            "Bid requested"
        );
        Ok(())
    }

    /// Record a response. Returns a late-bid report when the response names
    /// an auction that has already ended.
    pub fn on_bid_response(
        &mut self,
        event: &BidResponse,
    ) -> Result<Option<CorrelatedReport>, TrackerError> {
        if let Some(report) = self.on_late_bid(event) {
            return Ok(Some(report));
        }
        let Some(state_id) = self.active_target(event.auction_id.as_deref(), "bid-response")?
        else {
            return Ok(None);
        };
        let Some(state) = self.tracker.get_mut(&state_id) else {
            return Ok(None);
        };

        let placement = normalize_code(&event.placement_code);
        let bidder = normalize_code(&event.bidder_code);
        if !state.requested_bidders(&placement).contains(&bidder) {
            debug!(
                auction_id = %state_id,
                placement = %placement,
                bidder = %bidder,
                "Response from a bidder that was never requested"
            );
        }
        state.record_response(
            &placement,
            &bidder,
            BidOutcome::new(event.cpm, event.width, event.height),
        );
        Ok(None)
    }

    fn on_late_bid(&mut self, event: &BidResponse) -> Option<CorrelatedReport> {
        let auction_id = event.auction_id.as_deref()?;
        let state = self.tracker.get_mut(auction_id).filter(|s| !s.is_active())?;

        let placement = normalize_code(&event.placement_code);
        let bid = ImpressionInfo {
            bidder_code: normalize_code(&event.bidder_code),
            cpm: event.cpm,
            size: Size::new(event.width, event.height),
        };
        let bids_after_timeout = state.record_late_bid(&placement, bid.clone()).to_vec();

        info!(
            auction_id,
            placement = %placement,
            bidder = %bid.bidder_code,
            cpm = bid.cpm,
            "⏰ Bid after timeout"
        );
        Some(CorrelatedReport {
            kind: EventStackType::BidAfterTimeout,
            events: vec![ReportEvent::LateBid(LateBidSummary {
                auction_id: auction_id.to_string(),
                auction_info: state.placement_outcomes(&placement),
                ad_unit_code: placement,
                bid_after_timeout: bid,
                bids_after_timeout,
            })],
            floor_settings: Some(state.floor_settings().clone()),
        })
    }

    pub fn on_auction_end(
        &mut self,
        event: &AuctionEnd,
    ) -> Result<Option<CorrelatedReport>, TrackerError> {
        let Some(state_id) = self.active_target(event.auction_id.as_deref(), "auction-end")? else {
            return Ok(None);
        };
        let Some(state) = self.tracker.finish(&state_id) else {
            return Ok(None);
        };

        let summaries = state.summaries();
        if summaries.is_empty() {
            debug!(auction_id = %state_id, "Auction ended without requests, nothing to report");
            return Ok(None);
        }

        info!(
            auction_id = %state_id,
            placements = summaries.len(),
            "🏁 Auction correlated"
        );
        Ok(Some(CorrelatedReport {
            kind: EventStackType::Auction,
            events: summaries.into_iter().map(ReportEvent::Auction).collect(),
            floor_settings: Some(state.floor_settings().clone()),
        }))
    }

    /// Build the impression for a won bid from whatever state exists for its
    /// auction; without state, the winner is the only known bidder.
    pub fn on_bid_won(&mut self, event: &BidWon) -> CorrelatedReport {
        let placement = normalize_code(&event.placement_code);
        let bidder = normalize_code(&event.bidder_code);
        let auction_id = event
            .auction_id
            .clone()
            .or_else(|| self.tracker.current().map(str::to_string));

        let impression_info = ImpressionInfo {
            bidder_code: bidder.clone(),
            cpm: event.cpm,
            size: Size::new(event.width, event.height),
        };

        let state = auction_id.as_deref().and_then(|id| self.tracker.get(id));
        let (auction_info, floor_settings) = match state {
            Some(state) => (
                state.placement_outcomes(&placement),
                Some(state.floor_settings().clone()),
            ),
            None => {
                warn!(
                    auction_id = ?auction_id,
                    placement = %placement,
                    "bid-won without auction state, reporting winner only"
                );
                let mut info = std::collections::BTreeMap::new();
                info.insert(
                    bidder.clone(),
                    BidOutcome::new(event.cpm, event.width, event.height),
                );
                (info, None)
            }
        };

        info!(
            auction_id = ?auction_id,
            placement = %placement,
            bidder = %bidder,
            cpm = event.cpm,
            "💰 Impression correlated"
        );
        CorrelatedReport {
            kind: EventStackType::Impression,
            events: vec![ReportEvent::Impression(ImpressionSummary {
                auction_id,
                ad_unit_code: placement,
                impression_info,
                auction_info,
            })],
            floor_settings,
        }
    }

    /// Auction an accumulating event applies to: must resolve and still be
    /// active. Unknown or finished auctions are dropped, not errors.
    fn active_target(
        &self,
        explicit: Option<&str>,
        kind: &'static str,
    ) -> Result<Option<String>, TrackerError> {
        let Some(id) = self.tracker.resolve(explicit, kind)? else {
            debug!(kind, "Event without auction context dropped");
            return Ok(None);
        };
        match self.tracker.get(&id) {
            Some(state) if state.is_active() => Ok(Some(id)),
            Some(_) => {
                debug!(kind, auction_id = %id, "Late event for finished auction ignored");
                Ok(None)
            }
            None => {
                warn!(kind, auction_id = %id, "Event for unknown auction dropped");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FloorEntry, PlacementFloorConfig, RequestedBid};

    fn correlator() -> EventCorrelator {
        EventCorrelator::new(CorrelatorConfig::default())
    }

    fn init(id: &str, ts: i64) -> AuctionEvent {
        AuctionEvent::AuctionInit(AuctionInit {
            auction_id: id.to_string(),
            timestamp: ts,
        })
    }

    fn requested(id: Option<&str>, bidder: &str, placements: &[&str]) -> AuctionEvent {
        AuctionEvent::BidRequested(BidRequested {
            auction_id: id.map(str::to_string),
            bidder_code: bidder.to_string(),
            bids: placements
                .iter()
                .enumerate()
                .map(|(i, p)| RequestedBid {
                    placement_code: p.to_string(),
                    request_id: format!("r{}", i),
                })
                .collect(),
            timeout: Some(1000),
        })
    }

    fn response(id: Option<&str>, placement: &str, bidder: &str, cpm: f64) -> AuctionEvent {
        AuctionEvent::BidResponse(BidResponse {
            auction_id: id.map(str::to_string),
            request_id: "r0".to_string(),
            placement_code: placement.to_string(),
            bidder_code: bidder.to_string(),
            cpm,
            width: 300,
            height: 250,
        })
    }

    fn won(id: Option<&str>, placement: &str, bidder: &str, cpm: f64) -> AuctionEvent {
        AuctionEvent::BidWon(BidWon {
            auction_id: id.map(str::to_string),
            request_id: String::new(),
            placement_code: placement.to_string(),
            bidder_code: bidder.to_string(),
            cpm,
            width: 300,
            height: 250,
        })
    }

    fn end(id: Option<&str>) -> AuctionEvent {
        AuctionEvent::AuctionEnd(AuctionEnd {
            auction_id: id.map(str::to_string),
        })
    }

    fn feed(c: &mut EventCorrelator, events: &[AuctionEvent]) -> Vec<CorrelatedReport> {
        events
            .iter()
            .filter_map(|e| c.handle(e, FloorSettings::new).unwrap())
            .collect()
    }

    fn auction_info(report: &CorrelatedReport, idx: usize) -> &crate::models::AuctionSummary {
        match &report.events[idx] {
            ReportEvent::Auction(a) => a,
            other => panic!("expected auction summary, got {:?}", other),
        }
    }

    #[test]
    fn test_single_bidder_scenario() {
        let mut c = correlator();
        let reports = feed(
            &mut c,
            &[
                init("a1", 1000),
                requested(Some("a1"), "x", &["p1"]),
                response(Some("a1"), "p1", "x", 0.5),
                end(Some("a1")),
            ],
        );

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].kind, EventStackType::Auction);
        let summary = auction_info(&reports[0], 0);
        assert_eq!(summary.ad_unit_code, "p1");
        assert_eq!(summary.auction_info.len(), 1);
        assert_eq!(summary.auction_info["x"], BidOutcome::new(0.5, 300, 250));
    }

    #[test]
    fn test_all_requested_bidders_listed() {
        let mut c = correlator();
        let reports = feed(
            &mut c,
            &[
                init("a1", 0),
                requested(None, "b1", &["p1"]),
                requested(None, "b2", &["p1"]),
                requested(None, "b3", &["p1", "p2"]),
                response(None, "p1", "b1", 1.0),
                end(None),
            ],
        );

        let report = &reports[0];
        assert_eq!(report.events.len(), 2);
        let p1 = auction_info(report, 0);
        assert_eq!(p1.auction_info.len(), 3);
        assert!(!p1.auction_info["b1"].is_no_bid());
        assert!(p1.auction_info["b2"].is_no_bid());
        assert!(p1.auction_info["b3"].is_no_bid());
        let p2 = auction_info(report, 1);
        assert_eq!(p2.ad_unit_code, "p2");
    }

    #[test]
    fn test_responses_before_requests_still_join() {
        let mut c = correlator();
        let reports = feed(
            &mut c,
            &[
                init("a1", 0),
                response(None, "P1", "B2", 0.7),
                requested(None, "B1", &["P1"]),
                requested(None, "B2", &["P1"]),
                end(None),
            ],
        );

        let p1 = auction_info(&reports[0], 0);
        assert_eq!(p1.auction_info["b2"].cpm, 0.7);
        assert!(p1.auction_info["b1"].is_no_bid());
    }

    #[test]
    fn test_auction_without_requests_reports_nothing() {
        let mut c = correlator();
        let reports = feed(&mut c, &[init("a1", 0), end(None)]);
        assert!(reports.is_empty());
        assert_eq!(c.tracker().current(), None);
    }

    #[test]
    fn test_floor_snapshot_travels_with_auction() {
        let mut c = correlator();
        let mut floors = FloorSettings::new();
        let mut config = PlacementFloorConfig::new();
        config.insert("x".to_string(), FloorEntry::new("floor", 1.5, 2));
        floors.insert("p1".to_string(), config);

        c.handle(&init("a1", 0), || floors.clone()).unwrap();
        c.handle(&requested(None, "x", &["p1"]), FloorSettings::new)
            .unwrap();
        let report = c
            .handle(&end(None), FloorSettings::new)
            .unwrap()
            .unwrap();
        assert_eq!(report.floor_settings, Some(floors));
    }

    #[test]
    fn test_late_bid_won_uses_finalized_state() {
        let mut c = correlator();
        feed(
            &mut c,
            &[
                init("a1", 0),
                requested(None, "x", &["p1"]),
                requested(None, "y", &["p1"]),
                response(None, "p1", "x", 0.9),
                response(None, "p1", "y", 0.4),
                end(None),
            ],
        );

        let report = c
            .handle(&won(Some("a1"), "p1", "x", 0.9), FloorSettings::new)
            .unwrap()
            .unwrap();
        assert_eq!(report.kind, EventStackType::Impression);
        match &report.events[0] {
            ReportEvent::Impression(imp) => {
                assert_eq!(imp.impression_info.bidder_code, "x");
                assert_eq!(imp.auction_info.len(), 2);
                assert_eq!(imp.auction_info["y"].cpm, 0.4);
            }
            other => panic!("expected impression, got {:?}", other),
        }
    }

    #[test]
    fn test_response_after_end_reported_as_late_bid() {
        let mut c = correlator();
        feed(
            &mut c,
            &[
                init("a1", 0),
                requested(None, "x", &["p1"]),
                requested(None, "y", &["p1"]),
                response(None, "p1", "x", 0.9),
                end(None),
                init("a2", 500),
            ],
        );

        let first = c
            .handle(&response(Some("a1"), "P1", "Y", 0.4), FloorSettings::new)
            .unwrap()
            .unwrap();
        let second = c
            .handle(&response(Some("a1"), "p1", "y", 0.6), FloorSettings::new)
            .unwrap()
            .unwrap();

        assert_eq!(first.kind, EventStackType::BidAfterTimeout);
        match &second.events[0] {
            ReportEvent::LateBid(late) => {
                assert_eq!(late.auction_id, "a1");
                assert_eq!(late.bid_after_timeout.cpm, 0.6);
                assert_eq!(late.bids_after_timeout.len(), 2);
                assert!(late.auction_info["y"].is_no_bid());
            }
            other => panic!("expected late bid, got {:?}", other),
        }
        // a2 keeps accumulating normally
        assert_eq!(c.tracker().current(), Some("a2"));
    }

    #[test]
    fn test_bid_won_without_state_reports_winner_only() {
        let mut c = correlator();
        let report = c
            .handle(&won(Some("nope"), "p1", "x", 2.0), FloorSettings::new)
            .unwrap()
            .unwrap();
        assert!(report.floor_settings.is_none());
        match &report.events[0] {
            ReportEvent::Impression(imp) => {
                assert_eq!(imp.auction_info.len(), 1);
                assert_eq!(imp.auction_info["x"].cpm, 2.0);
            }
            other => panic!("expected impression, got {:?}", other),
        }
    }

    #[test]
    fn test_bid_won_during_active_auction_keeps_it_current() {
        let mut c = correlator();
        feed(&mut c, &[init("a1", 0), requested(None, "x", &["p1"])]);
        c.handle(&won(None, "p1", "x", 1.0), FloorSettings::new)
            .unwrap();

        assert_eq!(c.tracker().current(), Some("a1"));
        let reports = feed(&mut c, &[end(None)]);
        assert_eq!(reports.len(), 1);
    }

    #[test]
    fn test_foreign_event_is_protocol_violation() {
        let mut c = correlator();
        feed(&mut c, &[init("a1", 0)]);
        let err = c
            .handle(&response(Some("a2"), "p1", "x", 1.0), FloorSettings::new)
            .unwrap_err();
        assert!(matches!(err, TrackerError::ForeignAuctionEvent { .. }));

        let err = c.handle(&init("a2", 10), FloorSettings::new).unwrap_err();
        assert!(matches!(err, TrackerError::AuctionConflict { .. }));
    }

    #[test]
    fn test_stale_auction_does_not_leak() {
        let mut c = correlator();
        feed(
            &mut c,
            &[
                init("a1", 0),
                requested(None, "x", &["p1"]),
                response(None, "p1", "x", 5.0),
            ],
        );

        let reports = feed(
            &mut c,
            &[
                init("a2", 36_000),
                requested(None, "y", &["p1"]),
                end(None),
            ],
        );

        assert!(!c.tracker().contains("a1"));
        let p1 = auction_info(&reports[0], 0);
        assert_eq!(p1.auction_id, "a2");
        assert_eq!(p1.auction_info.len(), 1);
        assert!(p1.auction_info["y"].is_no_bid());
    }

    #[test]
    fn test_events_without_context_are_dropped() {
        let mut c = correlator();
        let reports = feed(
            &mut c,
            &[
                requested(None, "x", &["p1"]),
                response(Some("ghost"), "p1", "x", 1.0),
                end(None),
            ],
        );
        assert!(reports.is_empty());
    }
}
