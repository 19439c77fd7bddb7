//! Entry Cache and Fallback Cache. Both are parameterized by concrete
//! value types and backed by `dashmap`, which gives the many-readers/
//! occasional-writer access pattern these caches want: per-key atomic
//! replacement, no coarse lock.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::device::Device;

/// Per-entry authoritative device list. Writes are full replacements;
/// there is no TTL, a value lives until the next refresh overwrites it.
#[derive(Default)]
pub struct EntryCache {
    inner: DashMap<String, Arc<Vec<Device>>>,
}

impl EntryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the stored device list for `domain` atomically.
    pub fn insert(&self, domain: String, devices: Vec<Device>) {
        self.inner.insert(domain, Arc::new(devices));
    }

    /// Returns the stored device list for `domain`, if present.
    pub fn get(&self, domain: &str) -> Option<Arc<Vec<Device>>> {
        self.inner.get(domain).map(|r| Arc::clone(r.value()))
    }

    pub fn contains(&self, domain: &str) -> bool {
        self.inner.contains_key(domain)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// A cached ad-hoc lookup for a domain that isn't a configured entry.
#[derive(Clone)]
pub struct FallbackRecord {
    pub devices: Arc<Vec<Device>>,
    pub expires_at: Instant,
}

impl FallbackRecord {
    pub fn is_expired(&self, now: Instant) -> bool {
        self.expires_at <= now
    }
}

/// TTL-bounded cache for domains outside the configured entry set.
/// Expiry is checked on read and swept explicitly once per refresh tick,
/// rather than delegated to a background eviction thread, so "never
/// returns an expired record" is enforced deterministically on the read
/// path.
#[derive(Default)]
pub struct FallbackCache {
    inner: DashMap<String, FallbackRecord>,
}

impl FallbackCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached record for `domain` if present and not expired
    /// as of `now`.
    pub fn get(&self, domain: &str, now: Instant) -> Option<Arc<Vec<Device>>> {
        let entry = self.inner.get(domain)?;
        if entry.is_expired(now) {
            return None;
        }
        Some(Arc::clone(&entry.devices))
    }

    pub fn insert(&self, domain: String, devices: Vec<Device>, ttl: Duration, now: Instant) {
        self.inner.insert(
            domain,
            FallbackRecord {
                devices: Arc::new(devices),
                expires_at: now + ttl,
            },
        );
    }

    /// Removes every record whose `expires_at <= now`.
    pub fn sweep(&self, now: Instant) {
        self.inner.retain(|_, record| !record.is_expired(now));
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

/// Concatenates results across all targets of an entry and deduplicates
/// by `ip`, preserving first occurrence. Empty IPs collapse together,
/// which is permitted.
pub fn dedup_by_ip(devices: Vec<Device>) -> Vec<Device> {
    let mut seen = std::collections::HashSet::with_capacity(devices.len());
    let mut out = Vec::with_capacity(devices.len());
    for device in devices {
        if seen.insert(device.ip.clone()) {
            out.push(device);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::empty_for_tests;

    fn device(ip: &str) -> Device {
        Device {
            ip: ip.to_string(),
            ..empty_for_tests()
        }
    }

    #[test]
    fn entry_cache_round_trips() {
        let cache = EntryCache::new();
        assert!(cache.get("a.example").is_none());
        cache.insert("a.example".to_string(), vec![device("10.0.0.1")]);
        let got = cache.get("a.example").unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].ip, "10.0.0.1");
    }

    #[test]
    fn entry_cache_write_is_full_replacement() {
        let cache = EntryCache::new();
        cache.insert("a.example".to_string(), vec![device("10.0.0.1")]);
        cache.insert("a.example".to_string(), vec![device("10.0.0.2")]);
        let got = cache.get("a.example").unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].ip, "10.0.0.2");
    }

    #[test]
    fn fallback_cache_never_returns_expired_record() {
        let cache = FallbackCache::new();
        let now = Instant::now();
        cache.insert(
            "unknown.example".to_string(),
            vec![device("10.0.0.1")],
            Duration::from_secs(10),
            now,
        );
        assert!(cache.get("unknown.example", now).is_some());
        let later = now + Duration::from_secs(11);
        assert!(cache.get("unknown.example", later).is_none());
    }

    #[test]
    fn fallback_cache_sweep_removes_expired_only() {
        let cache = FallbackCache::new();
        let now = Instant::now();
        cache.insert(
            "expired.example".to_string(),
            vec![],
            Duration::from_secs(1),
            now,
        );
        cache.insert(
            "fresh.example".to_string(),
            vec![],
            Duration::from_secs(1000),
            now,
        );
        let later = now + Duration::from_secs(2);
        cache.sweep(later);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("fresh.example", later).is_some());
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let devices = vec![device("10.0.0.1"), device("10.0.0.2"), device("10.0.0.1")];
        let deduped = dedup_by_ip(devices);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].ip, "10.0.0.1");
        assert_eq!(deduped[1].ip, "10.0.0.2");
    }

    #[test]
    fn dedup_collapses_empty_ips() {
        let devices = vec![device(""), device("")];
        let deduped = dedup_by_ip(devices);
        assert_eq!(deduped.len(), 1);
    }
}
