//! Per-auction working state

use std::collections::BTreeMap;

use crate::models::{AuctionSummary, BidOutcome, FloorSettings, ImpressionInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuctionPhase {
    Active,
    Finalized,
}

#[derive(Debug, Clone)]
pub struct AuctionState {
    pub auction_id: String,
    /// Host timestamp of `auction-init`, milliseconds
    pub started_at: i64,
    phase: AuctionPhase,
    /// placement -> bidders asked, in request order
    requested: BTreeMap<String, Vec<String>>,
    /// placement -> bidder -> best response seen
    responses: BTreeMap<String, BTreeMap<String, BidOutcome>>,
    /// placement -> responses received after `auction-end`, in arrival order
    late_bids: BTreeMap<String, Vec<ImpressionInfo>>,
    /// Floors in effect when the auction started
    floor_settings: FloorSettings,
}

impl AuctionState {
    pub fn new(auction_id: impl Into<String>, started_at: i64, floor_settings: FloorSettings) -> Self {
        Self {
            auction_id: auction_id.into(),
            started_at,
            phase: AuctionPhase::Active,
            requested: BTreeMap::new(),
            responses: BTreeMap::new(),
            late_bids: BTreeMap::new(),
            floor_settings,
        }
    }

    pub fn is_active(&self) -> bool {
        self.phase == AuctionPhase::Active
    }

    pub fn finalize(&mut self) {
        self.phase = AuctionPhase::Finalized;
    }

    pub fn is_stale(&self, now_ms: i64, window_ms: i64) -> bool {
        now_ms - self.started_at >= window_ms
    }

    pub fn floor_settings(&self) -> &FloorSettings {
        &self.floor_settings
    }

    pub fn record_request(&mut self, placement: &str, bidder: &str) {
        let bidders = self.requested.entry(placement.to_string()).or_default();
        if !bidders.iter().any(|b| b == bidder) {
            bidders.push(bidder.to_string());
        }
    }

    /// Keep the highest cpm per (placement, bidder). Returns true when the
    /// recorded outcome changed.
    pub fn record_response(&mut self, placement: &str, bidder: &str, outcome: BidOutcome) -> bool {
        let by_bidder = self.responses.entry(placement.to_string()).or_default();
        let keep_existing = by_bidder
            .get(bidder)
            .map_or(false, |existing| existing.cpm >= outcome.cpm);
        if keep_existing {
            return false;
        }
        by_bidder.insert(bidder.to_string(), outcome);
        true
    }

    /// Late responses never change the outcomes already reported
    pub fn record_late_bid(&mut self, placement: &str, bid: ImpressionInfo) -> &[ImpressionInfo] {
        let bids = self.late_bids.entry(placement.to_string()).or_default();
        bids.push(bid);
        bids
    }

    pub fn requested_bidders(&self, placement: &str) -> &[String] {
        self.requested
            .get(placement)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn response(&self, placement: &str, bidder: &str) -> Option<&BidOutcome> {
        self.responses.get(placement).and_then(|r| r.get(bidder))
    }

    /// Every requested bidder of a placement with its outcome (sentinel when
    /// it never responded). Responses from bidders never requested are not
    /// listed.
    pub fn placement_outcomes(&self, placement: &str) -> BTreeMap<String, BidOutcome> {
        self.requested_bidders(placement)
            .iter()
            .map(|bidder| {
                let outcome = self
                    .response(placement, bidder)
                    .copied()
                    .unwrap_or_else(BidOutcome::no_bid);
                (bidder.clone(), outcome)
            })
            .collect()
    }

    /// One summary per requested placement
    pub fn summaries(&self) -> Vec<AuctionSummary> {
        self.requested
            .keys()
            .map(|placement| AuctionSummary {
                auction_id: self.auction_id.clone(),
                ad_unit_code: placement.clone(),
                auction_info: self.placement_outcomes(placement),
            })
            .collect()
    }
}
