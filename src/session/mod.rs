//! Visitor Attribution
//! Mission: Tag reports with a rolling session id and the visit's campaign tags
//!
//! Both values live in the key/value store with their own freshness
//! timestamp. Reading a fresh value re-arms it, so an active visitor keeps
//! the same session indefinitely.

pub mod utm;

use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::storage::KvStore;

pub use utm::{UtmTracker, UTM_TAGS};

pub struct SessionTracker {
    kv: Arc<dyn KvStore>,
    id_key: String,
    timestamp_key: String,
    timeout_ms: i64,
}

impl SessionTracker {
    pub fn new(kv: Arc<dyn KvStore>, prefix: &str, timeout_ms: i64) -> Self {
        Self {
            kv,
            id_key: format!("{}session_id", prefix),
            timestamp_key: format!("{}session_timeout", prefix),
            timeout_ms,
        }
    }

    /// Session id for a report created at `now_ms`
    pub fn current(&self, now_ms: i64) -> String {
        if let Some(id) = self.read(&self.id_key) {
            if self.is_fresh(now_ms) {
                self.arm(&id, now_ms);
                return id;
            }
            debug!(session_id = %id, "Session expired");
        }

        let id = Uuid::new_v4().to_string();
        debug!(session_id = %id, "New session");
        self.arm(&id, now_ms);
        id
    }

    /// A missing timestamp counts as fresh
    fn is_fresh(&self, now_ms: i64) -> bool {
        match self
            .read(&self.timestamp_key)
            .and_then(|ts| ts.parse::<i64>().ok())
        {
            Some(ts) => now_ms - ts <= self.timeout_ms,
            None => true,
        }
    }

    fn arm(&self, id: &str, now_ms: i64) {
        let result = self
            .kv
            .set(&self.id_key, id)
            .and_then(|_| self.kv.set(&self.timestamp_key, &now_ms.to_string()));
        if let Err(e) = result {
            warn!(error = %e, "Failed to persist session id");
        }
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.kv.get(key) {
            Ok(v) => v.filter(|v| !v.is_empty()),
            Err(e) => {
                warn!(key, error = %e, "Failed to read session state");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryKvStore;

    #[test]
    fn test_session_reused_while_fresh() {
        let kv = Arc::new(MemoryKvStore::new());
        let sessions = SessionTracker::new(kv.clone(), "t_", 1_000);

        let first = sessions.current(0);
        assert_eq!(sessions.current(900), first);
        // Re-armed at 900, so still alive at 1_800
        assert_eq!(sessions.current(1_800), first);
        assert_eq!(kv.get("t_session_timeout").unwrap().as_deref(), Some("1800"));
    }

    #[test]
    fn test_session_rotates_after_timeout() {
        let sessions = SessionTracker::new(Arc::new(MemoryKvStore::new()), "t_", 1_000);
        let first = sessions.current(0);
        let second = sessions.current(1_001);
        assert_ne!(first, second);
        assert!(Uuid::parse_str(&second).is_ok());
    }

    #[test]
    fn test_missing_timestamp_keeps_stored_id() {
        let kv = Arc::new(MemoryKvStore::new());
        kv.set("t_session_id", "legacy").unwrap();
        let sessions = SessionTracker::new(kv, "t_", 1_000);
        assert_eq!(sessions.current(50_000), "legacy");
    }
}
