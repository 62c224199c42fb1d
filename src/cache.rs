//! Time-to-live + least-recently-used result cache.
//!
//! One mutex guards the whole structure: lookups refresh recency, so even
//! the read path mutates. Expired entries are never returned; they are
//! dropped lazily on lookup or in bulk by [`StrategyCache::purge_expired`].

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;

use crate::config::CacheConfig;
use crate::query::{CacheKey, QueryResult};

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub result: QueryResult,
    pub inserted_at: Instant,
    /// Set on every copy handed out by a successful lookup.
    pub hit: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub size: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct Slot {
    entry: CacheEntry,
    tick: u64,
}

#[derive(Default)]
struct Inner {
    slots: HashMap<CacheKey, Slot>,
    /// Recency order: smallest tick is least recently used.
    order: BTreeMap<u64, CacheKey>,
    tick: u64,
    stats: CacheStats,
}

impl Inner {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn remove(&mut self, key: &CacheKey) -> Option<Slot> {
        let slot = self.slots.remove(key)?;
        self.order.remove(&slot.tick);
        Some(slot)
    }
}

pub struct StrategyCache {
    capacity: usize,
    ttl: Duration,
    inner: Mutex<Inner>,
}

impl StrategyCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        StrategyCache {
            capacity: capacity.max(1),
            ttl,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        StrategyCache::new(config.capacity, config.ttl())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Copy of a live entry, marked as a hit. Expired entries count as misses.
    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        let mut inner = self.inner.lock();

        let expired = match inner.slots.get(key) {
            Some(slot) => slot.entry.inserted_at.elapsed() >= self.ttl,
            None => {
                inner.stats.misses += 1;
                return None;
            }
        };
        if expired {
            inner.remove(key);
            inner.stats.expirations += 1;
            inner.stats.misses += 1;
            log::debug!("cache entry {} expired", key);
            return None;
        }

        let tick = inner.next_tick();
        let Inner { slots, order, stats, .. } = &mut *inner;
        let slot = slots.get_mut(key)?;
        order.remove(&slot.tick);
        order.insert(tick, *key);
        slot.tick = tick;
        slot.entry.hit = true;
        stats.hits += 1;

        Some(slot.entry.clone())
    }

    /// Insert or replace, evicting least-recently-used entries past capacity.
    pub fn insert(&self, key: CacheKey, result: QueryResult) {
        let mut inner = self.inner.lock();
        inner.remove(&key);

        let tick = inner.next_tick();
        inner.slots.insert(
            key,
            Slot {
                entry: CacheEntry {
                    result,
                    inserted_at: Instant::now(),
                    hit: false,
                },
                tick,
            },
        );
        inner.order.insert(tick, key);

        while inner.slots.len() > self.capacity {
            let oldest = match inner.order.iter().next() {
                Some((_, k)) => *k,
                None => break,
            };
            inner.remove(&oldest);
            inner.stats.evictions += 1;
            log::debug!("cache evicted {}", oldest);
        }
    }

    /// Drop every expired entry; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let mut inner = self.inner.lock();
        let expired: Vec<CacheKey> = inner
            .slots
            .iter()
            .filter(|(_, s)| s.entry.inserted_at.elapsed() >= self.ttl)
            .map(|(k, _)| *k)
            .collect();
        for key in &expired {
            inner.remove(key);
        }
        inner.stats.expirations += expired.len() as u64;
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.slots.clear();
        inner.order.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            size: inner.slots.len(),
            ..inner.stats
        }
    }
}
