//! Floor Config Store
//!
//! Typed access to per-placement floor configuration and the rolling info
//! string. Pure data access: unreadable or failing storage reads as "no floor
//! configured", failed writes are logged and dropped.

use std::sync::Arc;
use tracing::warn;

use super::KvStore;
use crate::models::PlacementFloorConfig;

#[derive(Clone)]
pub struct FloorConfigStore {
    kv: Arc<dyn KvStore>,
    prefix: String,
}

impl FloorConfigStore {
    pub fn new(kv: Arc<dyn KvStore>, prefix: impl Into<String>) -> Self {
        Self {
            kv,
            prefix: prefix.into(),
        }
    }

    pub fn kv(&self) -> Arc<dyn KvStore> {
        self.kv.clone()
    }

    #[inline]
    pub fn config_key(&self, placement: &str) -> String {
        format!("{}cfg:{}", self.prefix, placement)
    }

    #[inline]
    fn info_key(&self) -> String {
        format!("{}info", self.prefix)
    }

    /// Stored config for a placement, empty when absent or unreadable
    pub fn get(&self, placement: &str) -> PlacementFloorConfig {
        let key = self.config_key(placement);
        let raw = match self.kv.get(&key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return PlacementFloorConfig::new(),
            Err(e) => {
                warn!(placement, error = %e, "Floor config read failed, treating as empty");
                return PlacementFloorConfig::new();
            }
        };

        match serde_json::from_str::<PlacementFloorConfig>(&raw) {
            Ok(mut config) => {
                config.retain(|_, entry| entry.uses_remaining > 0);
                config
            }
            Err(e) => {
                warn!(placement, error = %e, "Corrupt floor config, treating as empty");
                PlacementFloorConfig::new()
            }
        }
    }

    /// Rewrite a placement's config in full; an empty map deletes the key.
    /// Entries without remaining uses are never persisted.
    pub fn set(&self, placement: &str, config: &PlacementFloorConfig) {
        let live: PlacementFloorConfig = config
            .iter()
            .filter(|(_, entry)| entry.uses_remaining > 0)
            .map(|(bidder, entry)| (bidder.clone(), entry.clone()))
            .collect();

        if live.is_empty() {
            self.remove(placement);
            return;
        }

        let raw = match serde_json::to_string(&live) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(placement, error = %e, "Failed to serialize floor config");
                return;
            }
        };
        if let Err(e) = self.kv.set(&self.config_key(placement), &raw) {
            warn!(placement, error = %e, "Floor config write failed");
        }
    }

    pub fn remove(&self, placement: &str) {
        if let Err(e) = self.kv.remove(&self.config_key(placement)) {
            warn!(placement, error = %e, "Floor config removal failed");
        }
    }

    /// Opaque string from the last reconciliation, empty if never set
    pub fn info_string(&self) -> String {
        match self.kv.get(&self.info_key()) {
            Ok(value) => value.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "Info string read failed");
                String::new()
            }
        }
    }

    pub fn set_info_string(&self, info: &str) {
        if let Err(e) = self.kv.set(&self.info_key(), info) {
            warn!(error = %e, "Info string write failed");
        }
    }
}
