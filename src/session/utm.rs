//! Campaign (UTM) tags
//!
//! Tags found on the landing URL win and are persisted. Without any on the
//! URL, the stored tags are used while fresh.

use reqwest::Url;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::storage::KvStore;

pub const UTM_TAGS: [&str; 5] = [
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
];

pub struct UtmTracker {
    kv: Arc<dyn KvStore>,
    prefix: String,
    timestamp_key: String,
    timeout_ms: i64,
}

impl UtmTracker {
    pub fn new(kv: Arc<dyn KvStore>, prefix: &str, timeout_ms: i64) -> Self {
        Self {
            kv,
            prefix: prefix.to_string(),
            timestamp_key: format!("{}utm_timeout", prefix),
            timeout_ms,
        }
    }

    fn tag_key(&self, tag: &str) -> String {
        format!("{}{}", self.prefix, tag)
    }

    /// Campaign tags for a report created at `now_ms`. Empty when the URL
    /// carries none and nothing fresh is stored.
    pub fn resolve(&self, page_url: Option<&Url>, now_ms: i64) -> BTreeMap<String, String> {
        if let Some(tags) = page_url.and_then(from_url) {
            debug!(source = %tags["utm_source"], "Campaign tags detected on page URL");
            self.persist(&tags, now_ms);
            return tags;
        }

        if !self.is_fresh(now_ms) {
            return BTreeMap::new();
        }
        let stored = self.load();
        if stored.values().all(String::is_empty) {
            return BTreeMap::new();
        }
        self.touch(now_ms);
        stored
    }

    fn is_fresh(&self, now_ms: i64) -> bool {
        self.read(&self.timestamp_key)
            .and_then(|ts| ts.parse::<i64>().ok())
            .map_or(false, |ts| now_ms - ts <= self.timeout_ms)
    }

    fn load(&self) -> BTreeMap<String, String> {
        UTM_TAGS
            .iter()
            .map(|tag| {
                let value = self.read(&self.tag_key(tag)).unwrap_or_default();
                (tag.to_string(), value)
            })
            .collect()
    }

    fn persist(&self, tags: &BTreeMap<String, String>, now_ms: i64) {
        for (tag, value) in tags {
            if let Err(e) = self.kv.set(&self.tag_key(tag), value) {
                warn!(tag = %tag, error = %e, "Failed to persist campaign tag");
            }
        }
        self.touch(now_ms);
    }

    fn touch(&self, now_ms: i64) {
        if let Err(e) = self.kv.set(&self.timestamp_key, &now_ms.to_string()) {
            warn!(error = %e, "Failed to persist campaign tag timestamp");
        }
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.kv.get(key) {
            Ok(v) => v,
            Err(e) => {
                warn!(key, error = %e, "Failed to read campaign tags");
                None
            }
        }
    }
}

/// All five tags when at least one is present and non-empty
fn from_url(url: &Url) -> Option<BTreeMap<String, String>> {
    let mut tags: BTreeMap<String, String> = UTM_TAGS
        .iter()
        .map(|tag| (tag.to_string(), String::new()))
        .collect();

    let mut detected = false;
    for (name, value) in url.query_pairs() {
        if let Some(slot) = tags.get_mut(name.as_ref()) {
            if !value.is_empty() {
                detected = true;
            }
            *slot = value.into_owned();
        }
    }
    detected.then_some(tags)
}
