//! Price-Floor Engine
//! Mission: Inject per-bidder floors into outgoing requests and age them out
//!
//! Rules applied by `prepare`, per placement:
//! - a configured bidder gets `{key: value}` written into its bid params,
//!   unless the caller already set that key (caller wins, no use consumed)
//! - every applied bidder loses one use; entries reaching zero are dropped
//!   after being honored for this request
//! - the placement's config is rewritten in full, or deleted when empty
//!
//! Applications are grouped in rounds. A round ends when an auction starts
//! (`begin_round`). Preparing the same units twice in one round is a no-op
//! for bidders already applied; a floor injected in an earlier round is
//! stripped and decided afresh.

use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info};

use super::reconcile::{FloorReconciler, ReconcileSummary};
use crate::models::{
    normalize_code, AdUnit, FloorEntry, FloorSettings, PlacementFloorConfig, ReconcilePayload,
};
use crate::storage::FloorConfigStore;

/// Counts from one `prepare` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrepareOutcome {
    /// Bidders that consumed a use (injected or explicit zero floor)
    pub applied: usize,
    /// Bidders whose caller-supplied param kept precedence
    pub overridden: usize,
    /// Entries that ran out of uses and were dropped
    pub expired: usize,
}

#[derive(Debug, Clone)]
struct AppliedFloor {
    entry: FloorEntry,
    /// false when `value <= 0`: applied as "no floor", nothing written
    injected: bool,
    round: u64,
}

impl AppliedFloor {
    fn still_in_place(&self, params: &serde_json::Map<String, Value>) -> bool {
        if self.injected {
            params.get(&self.entry.key) == Some(&floor_param(self.entry.value))
        } else {
            !params.contains_key(&self.entry.key)
        }
    }
}

pub struct PriceFloorEngine {
    store: FloorConfigStore,
    /// placement -> bidder -> floor currently in effect
    applied: HashMap<String, HashMap<String, AppliedFloor>>,
    round: u64,
}

impl PriceFloorEngine {
    pub fn new(store: FloorConfigStore) -> Self {
        Self {
            store,
            applied: HashMap::new(),
            round: 0,
        }
    }

    pub fn store(&self) -> &FloorConfigStore {
        &self.store
    }

    pub fn reconciler(&self) -> FloorReconciler {
        FloorReconciler::new(self.store.clone())
    }

    /// Merge a collector response into stored config
    pub fn reconcile(&self, payload: &ReconcilePayload) -> ReconcileSummary {
        self.reconciler().apply(payload)
    }

    pub fn prepare(&mut self, ad_units: &mut [AdUnit]) -> PrepareOutcome {
        let mut outcome = PrepareOutcome::default();

        for ad_unit in ad_units.iter_mut() {
            let placement = normalize_code(&ad_unit.code);
            let mut config = self.store.get(&placement);
            let mut consumed: BTreeSet<String> = BTreeSet::new();

            for bid in ad_unit.bids.iter_mut() {
                let bidder = normalize_code(&bid.bidder);

                if let Some(previous) = self.applied_floor(&placement, &bidder) {
                    if previous.round == self.round && previous.still_in_place(&bid.params) {
                        continue;
                    }
                    let previous = previous.clone();
                    if previous.injected && previous.still_in_place(&bid.params) {
                        bid.params.remove(&previous.entry.key);
                    }
                    self.forget(&placement, &bidder);
                }

                let Some(entry) = config.get(&bidder) else {
                    continue;
                };

                if bid.params.contains_key(&entry.key) {
                    debug!(
                        placement = %placement,
                        bidder = %bidder,
                        key = %entry.key,
                        "Caller-supplied floor param kept"
                    );
                    outcome.overridden += 1;
                    continue;
                }

                let injected = entry.value > 0.0;
                if injected {
                    bid.params
                        .insert(entry.key.clone(), floor_param(entry.value));
                }
                // Snapshot reports the count left after this application
                let mut in_effect = entry.clone();
                in_effect.uses_remaining -= 1;
                self.applied.entry(placement.clone()).or_default().insert(
                    bidder.clone(),
                    AppliedFloor {
                        entry: in_effect,
                        injected,
                        round: self.round,
                    },
                );
                consumed.insert(bidder);
            }

            outcome.applied += consumed.len();
            outcome.expired += consume_uses(&mut config, &consumed);
            self.store.set(&placement, &config);
        }

        if outcome.applied > 0 || outcome.expired > 0 {
            info!(
                applied = outcome.applied,
                overridden = outcome.overridden,
                expired = outcome.expired,
                "🎯 Price floors prepared"
            );
        }
        outcome
    }

    /// Close the current round and return the floors in effect for it
    pub fn begin_round(&mut self) -> FloorSettings {
        let snapshot = self.snapshot();
        self.round += 1;
        snapshot
    }

    /// Floors currently in effect per placement/bidder
    pub fn snapshot(&self) -> FloorSettings {
        self.applied
            .iter()
            .map(|(placement, bidders)| {
                let config: PlacementFloorConfig = bidders
                    .iter()
                    .map(|(bidder, applied)| (bidder.clone(), applied.entry.clone()))
                    .collect();
                (placement.clone(), config)
            })
            .collect()
    }

    fn applied_floor(&self, placement: &str, bidder: &str) -> Option<&AppliedFloor> {
        self.applied.get(placement).and_then(|b| b.get(bidder))
    }

    fn forget(&mut self, placement: &str, bidder: &str) {
        if let Some(bidders) = self.applied.get_mut(placement) {
            bidders.remove(bidder);
            if bidders.is_empty() {
                self.applied.remove(placement);
            }
        }
    }
}

/// Decrement uses for consumed bidders, dropping exhausted entries.
/// Returns the number dropped.
fn consume_uses(config: &mut PlacementFloorConfig, consumed: &BTreeSet<String>) -> usize {
    let mut expired = 0;
    for bidder in consumed {
        let Some(entry) = config.get_mut(bidder) else {
            continue;
        };
        entry.uses_remaining -= 1;
        if entry.uses_remaining <= 0 {
            config.remove(bidder);
            expired += 1;
        }
    }
    expired
}

fn floor_param(value: f64) -> Value {
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}
