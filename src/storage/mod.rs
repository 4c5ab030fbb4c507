//! Persistent Key/Value Storage
//! Mission: Keep floor configuration, info string, history and attribution across auctions
//!
//! Everything above this layer sees a plain string key/value capability.

pub mod floor_store;
pub mod history;
pub mod memory;
pub mod sqlite;

use anyhow::Result;

pub use floor_store::FloorConfigStore;
pub use history::EventHistory;
pub use memory::MemoryKvStore;
pub use sqlite::SqliteKvStore;

/// String key/value capability backing all persisted state
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}
