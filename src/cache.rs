use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde_json::Value;

struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

/// Keyed store with per-entry expiration. Stale entries are evicted
/// lazily, on the read that discovers them.
pub struct TtlCache<V> {
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn set(&self, key: &str, value: V, ttl: Duration) {
        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + ttl,
        };
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), entry);
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn len(&self) -> usize {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.len()
    }
}

/// One shared cache instance per process, injected through AppState.
/// Holds one store per query family plus the global on/off switch:
/// when disabled every read is a miss, but writes still land so that
/// re-enabling picks up fresh entries transparently.
pub struct CacheService {
    fires: TtlCache<Value>,
    stats: TtlCache<Value>,
    enabled: AtomicBool,
    default_ttl: Duration,
}

impl CacheService {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            fires: TtlCache::new(),
            stats: TtlCache::new(),
            enabled: AtomicBool::new(true),
            default_ttl,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Relaxed);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }

    pub fn get_fires(&self, key: &str) -> Option<Value> {
        if !self.is_enabled() {
            return None;
        }
        self.fires.get(key)
    }

    pub fn set_fires(&self, key: &str, value: Value) {
        self.fires.set(key, value, self.default_ttl);
    }

    pub fn get_stats(&self, key: &str) -> Option<Value> {
        if !self.is_enabled() {
            return None;
        }
        self.stats.get(key)
    }

    pub fn set_stats(&self, key: &str, value: Value) {
        self.stats.set(key, value, self.default_ttl);
    }

    // Both locks are held for the duration of the clear so no reader
    // can observe one store emptied while the other still serves. This
    // is the only place that takes both locks.
    pub fn clear_all(&self) {
        let mut fires = self.fires.entries.lock().unwrap_or_else(|e| e.into_inner());
        let mut stats = self.stats.entries.lock().unwrap_or_else(|e| e.into_inner());
        fires.clear();
        stats.clear();
    }
}

// Key builders. One per query family; keys from logically identical
// queries must be byte-identical, so every builder encodes its fields
// in a fixed order and stats_key sorts its pairs before encoding.

pub fn area_key(source: &str, area: &str, day_range: u32, date: &str) -> String {
    format!("area:{}:{}:{}:{}", source, area, day_range, date)
}

pub fn listing_key(date: &str, day_range: u32, time_range: Option<(&str, &str)>) -> String {
    match time_range {
        Some((start, end)) => format!("fires:{}:{}:{}-{}", date, day_range, start, end),
        None => format!("fires:{}:{}", date, day_range),
    }
}

pub fn stats_key(prefix: &str, params: &[(String, String)]) -> String {
    let mut pairs: Vec<&(String, String)> = params.iter().collect();
    pairs.sort();
    let encoded: Vec<String> = pairs.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    format!("stats:{}:{}", prefix, encoded.join("&"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_then_get() {
        let cache: TtlCache<i32> = TtlCache::new();
        cache.set("k", 42, Duration::from_secs(60));
        assert_eq!(cache.get("k"), Some(42));
    }

    #[test]
    fn test_expired_entry_is_miss_and_evicted() {
        let cache: TtlCache<i32> = TtlCache::new();
        cache.set("k", 1, Duration::from_millis(10));
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(cache.get("k"), None);
        assert_eq!(cache.len(), 0); // evicted by the read, not left behind
    }

    #[test]
    fn test_missing_key_is_none() {
        let cache: TtlCache<i32> = TtlCache::new();
        assert_eq!(cache.get("nope"), None);
    }

    #[test]
    fn test_disabled_service_reads_miss_but_writes_land() {
        let service = CacheService::new(Duration::from_secs(60));
        service.disable();
        service.set_fires("k", json!([1, 2]));
        assert!(service.get_fires("k").is_none());

        service.enable();
        assert_eq!(service.get_fires("k"), Some(json!([1, 2])));
    }

    #[test]
    fn test_clear_all_empties_every_store() {
        let service = CacheService::new(Duration::from_secs(60));
        service.set_fires("f", json!(1));
        service.set_stats("s", json!(2));
        service.clear_all();
        assert!(service.get_fires("f").is_none());
        assert!(service.get_stats("s").is_none());
    }

    #[test]
    fn test_listing_key_with_and_without_time_range() {
        let with = listing_key("2024-06-06", 1, Some(("08:00", "18:00")));
        let without = listing_key("2024-06-06", 1, None);
        assert_eq!(with, "fires:2024-06-06:1:08:00-18:00");
        assert_eq!(without, "fires:2024-06-06:1");
        assert_ne!(with, without);
    }

    #[test]
    fn test_stats_key_is_order_independent() {
        let a = stats_key(
            "weekly",
            &[
                ("dt".to_string(), "2024-06-06".to_string()),
                ("dr".to_string(), "7".to_string()),
            ],
        );
        let b = stats_key(
            "weekly",
            &[
                ("dr".to_string(), "7".to_string()),
                ("dt".to_string(), "2024-06-06".to_string()),
            ],
        );
        assert_eq!(a, b);
    }

    #[test]
    fn test_stats_key_differs_for_different_values() {
        let a = stats_key("s", &[("dr".to_string(), "1".to_string())]);
        let b = stats_key("s", &[("dr".to_string(), "2".to_string())]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_area_key_shape() {
        let key = area_key("VIIRS_NOAA20_NRT", "-61,-34,-57,-30", 2, "2024-06-06");
        assert_eq!(key, "area:VIIRS_NOAA20_NRT:-61,-34,-57,-30:2:2024-06-06");
    }
}
