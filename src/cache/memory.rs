//! Bounded in-memory LRU tier, keyed by `(source_url, cache_key)`.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::observability::Clock;

type Key = (String, String);

#[derive(Clone)]
struct Entry {
    bytes: Bytes,
    inserted_at: Instant,
    ttl: Duration,
}

struct State {
    entries: HashMap<Key, Entry>,
    order: VecDeque<Key>,
    used_bytes: u64,
}

impl State {
    fn touch(&mut self, key: &Key) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
        self.order.push_back(key.clone());
    }

    fn remove(&mut self, key: &Key) {
        if let Some(entry) = self.entries.remove(key) {
            self.used_bytes = self.used_bytes.saturating_sub(entry.bytes.len() as u64);
        }
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
    }
}

/// LRU cache tier with a byte budget. Single-lock rather than a lock-free
/// map because eviction needs a coordinated view of insertion order — the
/// concurrency model (spec §5) calls this out as "fine-grained locking or
/// a lock-free map"; a budgeted LRU needs the former.
pub struct MemoryTier {
    state: Mutex<State>,
    budget_bytes: u64,
    clock: Arc<dyn Clock>,
}

impl MemoryTier {
    pub fn new(budget_bytes: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(State { entries: HashMap::new(), order: VecDeque::new(), used_bytes: 0 }),
            budget_bytes,
            clock,
        }
    }

    /// `ttl_override` is the `CacheContext`-supplied max-age lens, when the
    /// caller set one; otherwise the entry's own stored TTL governs.
    pub fn get(&self, source: &str, key: &str, ttl_override: Option<Duration>) -> Option<Bytes> {
        let mut state = self.state.lock().unwrap();
        let composite = (source.to_string(), key.to_string());
        let entry = state.entries.get(&composite)?.clone();

        let effective_ttl = ttl_override.unwrap_or(entry.ttl);
        if self.clock.now().duration_since(entry.inserted_at) > effective_ttl {
            state.remove(&composite);
            return None;
        }

        state.touch(&composite);
        Some(entry.bytes)
    }

    pub fn set(&self, source: &str, key: &str, bytes: Bytes, ttl: Duration) {
        let mut state = self.state.lock().unwrap();
        let composite = (source.to_string(), key.to_string());
        let size = bytes.len() as u64;

        state.remove(&composite);
        state.entries.insert(composite.clone(), Entry { bytes, inserted_at: self.clock.now(), ttl });
        state.order.push_back(composite);
        state.used_bytes += size;

        while state.used_bytes > self.budget_bytes {
            let Some(oldest) = state.order.front().cloned() else { break };
            state.remove(&oldest);
        }
    }

    pub fn remove(&self, source: &str, key: &str) {
        let mut state = self.state.lock().unwrap();
        state.remove(&(source.to_string(), key.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::SystemClock;

    fn tier(budget: u64) -> MemoryTier {
        MemoryTier::new(budget, Arc::new(SystemClock))
    }

    #[test]
    fn set_then_get_returns_bytes() {
        let tier = tier(1024);
        tier.set("src", "k", Bytes::from_static(b"hello"), Duration::from_secs(60));
        assert_eq!(tier.get("src", "k", None), Some(Bytes::from_static(b"hello")));
    }

    #[test]
    fn keys_are_scoped_by_source() {
        let tier = tier(1024);
        tier.set("src-a", "k", Bytes::from_static(b"a"), Duration::from_secs(60));
        assert_eq!(tier.get("src-b", "k", None), None);
    }

    #[test]
    fn expired_entry_is_a_miss() {
        let tier = tier(1024);
        tier.set("src", "k", Bytes::from_static(b"hello"), Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(tier.get("src", "k", None), None);
    }

    #[test]
    fn ttl_override_can_be_stricter_than_stored_ttl() {
        let tier = tier(1024);
        tier.set("src", "k", Bytes::from_static(b"hello"), Duration::from_secs(300));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(tier.get("src", "k", Some(Duration::from_millis(0))), None);
    }

    #[test]
    fn eviction_respects_byte_budget() {
        let tier = tier(10);
        tier.set("src", "a", Bytes::from_static(b"0123456789"), Duration::from_secs(60));
        tier.set("src", "b", Bytes::from_static(b"zzzzzzzzzz"), Duration::from_secs(60));
        assert_eq!(tier.get("src", "a", None), None);
        assert!(tier.get("src", "b", None).is_some());
    }
}
