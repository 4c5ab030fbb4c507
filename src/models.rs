//! Auction Event Models
//! Mission: Typed wire shapes for host events, floor configuration and outbound reports
//!
//! Wire names are camelCase; event kinds are kebab-case (`auction-init`, `bid-won`, ...).

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// CPM recorded for a requested bidder that never responded
pub const NO_BID_CPM: f64 = -1.0;

/// Placement and bidder codes are compared lowercased everywhere.
#[inline]
pub fn normalize_code(code: &str) -> String {
    code.to_lowercase()
}

// ============================================================================
// Inbound host events
// ============================================================================

/// Event stream emitted by the host auction engine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum AuctionEvent {
    AuctionInit(AuctionInit),
    BidRequested(BidRequested),
    BidResponse(BidResponse),
    BidWon(BidWon),
    AuctionEnd(AuctionEnd),
}

impl AuctionEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AuctionInit(_) => "auction-init",
            Self::BidRequested(_) => "bid-requested",
            Self::BidResponse(_) => "bid-response",
            Self::BidWon(_) => "bid-won",
            Self::AuctionEnd(_) => "auction-end",
        }
    }

    /// Explicit auction id carried by the event, if any
    pub fn auction_id(&self) -> Option<&str> {
        match self {
            Self::AuctionInit(e) => Some(e.auction_id.as_str()),
            Self::BidRequested(e) => e.auction_id.as_deref(),
            Self::BidResponse(e) => e.auction_id.as_deref(),
            Self::BidWon(e) => e.auction_id.as_deref(),
            Self::AuctionEnd(e) => e.auction_id.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuctionInit {
    pub auction_id: String,
    /// Host timestamp in milliseconds
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BidRequested {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auction_id: Option<String>,
    pub bidder_code: String,
    #[serde(default)]
    pub bids: Vec<RequestedBid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RequestedBid {
    pub placement_code: String,
    #[serde(default)]
    pub request_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BidResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auction_id: Option<String>,
    #[serde(default)]
    pub request_id: String,
    pub placement_code: String,
    pub bidder_code: String,
    pub cpm: f64,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BidWon {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auction_id: Option<String>,
    #[serde(default)]
    pub request_id: String,
    pub placement_code: String,
    pub bidder_code: String,
    pub cpm: f64,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuctionEnd {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auction_id: Option<String>,
}

// ============================================================================
// Bid outcomes
// ============================================================================

/// Creative size, serialized as `"300x250"`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Size {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .split_once('x')
            .ok_or_else(|| format!("invalid size '{}': expected WIDTHxHEIGHT", s))?;
        let width = w
            .trim()
            .parse()
            .map_err(|_| format!("invalid width in size '{}'", s))?;
        let height = h
            .trim()
            .parse()
            .map_err(|_| format!("invalid height in size '{}'", s))?;
        Ok(Self { width, height })
    }
}

impl Serialize for Size {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Size {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Best response seen for one (placement, bidder)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BidOutcome {
    pub cpm: f64,
    pub size: Size,
}

impl BidOutcome {
    pub fn new(cpm: f64, width: u32, height: u32) -> Self {
        Self {
            cpm,
            size: Size::new(width, height),
        }
    }

    /// Sentinel for a requested bidder that never responded
    pub fn no_bid() -> Self {
        Self {
            cpm: NO_BID_CPM,
            size: Size::default(),
        }
    }

    pub fn is_no_bid(&self) -> bool {
        self.cpm == NO_BID_CPM && self.size == Size::default()
    }
}

// ============================================================================
// Price floors
// ============================================================================

/// Floor configured for one bidder on one placement
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FloorEntry {
    /// Bid parameter name the floor is written to
    pub key: String,
    pub value: f64,
    /// Auctions left before the entry expires (older collectors call this `ttl`)
    #[serde(alias = "ttl")]
    pub uses_remaining: i64,
}

impl FloorEntry {
    pub fn new(key: impl Into<String>, value: f64, uses_remaining: i64) -> Self {
        Self {
            key: key.into(),
            value,
            uses_remaining,
        }
    }
}

/// bidder -> floor entry, for one placement
pub type PlacementFloorConfig = BTreeMap<String, FloorEntry>;

/// placement -> bidder -> floor entry
pub type FloorSettings = BTreeMap<String, PlacementFloorConfig>;

/// Ad slot about to be requested, as handed over by the host
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AdUnit {
    pub code: String,
    #[serde(default)]
    pub bids: Vec<AdUnitBid>,
}

/// One bidder's outgoing request parameters for an ad unit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AdUnitBid {
    pub bidder: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl AdUnitBid {
    pub fn new(bidder: impl Into<String>) -> Self {
        Self {
            bidder: bidder.into(),
            params: Map::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

// ============================================================================
// Outbound reports
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EventStackType {
    Auction,
    Impression,
    /// Response that arrived after its auction ended
    #[serde(rename = "bidAfterTimeout")]
    BidAfterTimeout,
}

/// Per-placement outcome of a finished auction
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuctionSummary {
    pub auction_id: String,
    pub ad_unit_code: String,
    pub auction_info: BTreeMap<String, BidOutcome>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImpressionInfo {
    pub bidder_code: String,
    pub cpm: f64,
    pub size: Size,
}

/// Winning bid plus the placement's full bidder outcome map for context
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImpressionSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auction_id: Option<String>,
    pub ad_unit_code: String,
    pub impression_info: ImpressionInfo,
    pub auction_info: BTreeMap<String, BidOutcome>,
}

/// Bid received after `auction-end`, with every late bid seen so far for
/// the placement and the outcomes reported at `auction-end`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LateBidSummary {
    pub auction_id: String,
    pub ad_unit_code: String,
    pub bid_after_timeout: ImpressionInfo,
    pub bids_after_timeout: Vec<ImpressionInfo>,
    pub auction_info: BTreeMap<String, BidOutcome>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ReportEvent {
    Impression(ImpressionSummary),
    LateBid(LateBidSummary),
    Auction(AuctionSummary),
}

/// POST body delivered to the remote collector
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReportEnvelope {
    /// Wall-clock milliseconds at report creation
    pub time: i64,
    pub info_string: String,
    pub price_floor_settings: FloorSettings,
    pub events: Vec<ReportEvent>,
    pub event_stack_type: EventStackType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_tag_data: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_history: Option<Vec<ReportEnvelope>>,
}

/// Collector response body applied by reconciliation
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReconcilePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info_string: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<BTreeMap<String, BTreeMap<String, FloorEntry>>>,
}
