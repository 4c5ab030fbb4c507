//! Server-pushed floor reconciliation
//!
//! Merges a collector response into stored floor config. Entries present in the
//! payload overwrite the stored bidder entry; other bidders are untouched.
//! Last write wins per placement: a reconciliation racing with a later
//! `prepare` simply merges into whatever is stored when it lands.

use tracing::{debug, info};

use crate::models::{normalize_code, ReconcilePayload};
use crate::storage::FloorConfigStore;

/// What a reconciliation changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub info_string_updated: bool,
    pub placements: usize,
    pub entries_armed: usize,
    pub entries_removed: usize,
}

#[derive(Clone)]
pub struct FloorReconciler {
    store: FloorConfigStore,
}

impl FloorReconciler {
    pub fn new(store: FloorConfigStore) -> Self {
        Self { store }
    }

    pub fn apply(&self, payload: &ReconcilePayload) -> ReconcileSummary {
        let mut summary = ReconcileSummary::default();

        if let Some(info) = &payload.info_string {
            self.store.set_info_string(info);
            summary.info_string_updated = true;
        }

        let Some(config) = &payload.config else {
            return summary;
        };

        for (raw_placement, bidders) in config {
            let placement = normalize_code(raw_placement);
            let mut stored = self.store.get(&placement);

            for (raw_bidder, entry) in bidders {
                let bidder = normalize_code(raw_bidder);
                if entry.uses_remaining <= 0 {
                    if stored.remove(&bidder).is_some() {
                        summary.entries_removed += 1;
                    }
                    debug!(placement = %placement, bidder = %bidder, "Collector expired floor entry");
                    continue;
                }
                stored.insert(bidder, entry.clone());
                summary.entries_armed += 1;
            }

            self.store.set(&placement, &stored);
            summary.placements += 1;
        }

        info!(
            placements = summary.placements,
            armed = summary.entries_armed,
            removed = summary.entries_removed,
            "🔄 Floor config reconciled"
        );
        summary
    }
}
