use std::thread;
use std::time::Duration;

use gto_engine::cache::StrategyCache;
use gto_engine::config::CacheConfig;
use gto_engine::query::{canonical_key, Answer, CacheKey, QueryResult, QueryType, StrategyQuery};
use serde_json::json;

fn equity_result(equity: f64) -> QueryResult {
    QueryResult::new(QueryType::Equity, Answer::Equity { equity }, 0.75, 2)
}

#[test]
fn round_trip_marks_hit() {
    let cache = StrategyCache::from_config(&CacheConfig::default());
    let query = StrategyQuery::new(QueryType::Equity).with_param("hand_strength", 0.6);
    let key = canonical_key(&query, 2);

    assert!(cache.get(&key).is_none());
    cache.insert(key, equity_result(0.6));

    let entry = cache.get(&key).unwrap();
    assert!(entry.hit);
    assert_eq!(entry.result.answer, Some(Answer::Equity { equity: 0.6 }));
    assert_eq!(cache.stats().hits, 1);
    assert_eq!(cache.stats().misses, 1);
    assert!((cache.stats().hit_rate() - 0.5).abs() < 1e-12);
}

#[test]
fn entries_expire_after_ttl() {
    let cache = StrategyCache::new(16, Duration::from_millis(40));
    cache.insert(CacheKey(1), equity_result(0.5));
    assert!(cache.get(&CacheKey(1)).is_some());

    thread::sleep(Duration::from_millis(80));
    assert!(cache.get(&CacheKey(1)).is_none());
    assert!(cache.is_empty());
    assert_eq!(cache.stats().expirations, 1);
}

#[test]
fn purge_drops_only_expired() {
    let cache = StrategyCache::new(16, Duration::from_millis(60));
    cache.insert(CacheKey(1), equity_result(0.1));
    cache.insert(CacheKey(2), equity_result(0.2));
    thread::sleep(Duration::from_millis(100));
    cache.insert(CacheKey(3), equity_result(0.3));

    assert_eq!(cache.purge_expired(), 2);
    assert_eq!(cache.len(), 1);
    assert!(cache.get(&CacheKey(3)).is_some());
}

#[test]
fn capacity_bound_evicts_least_recent() {
    let cache = StrategyCache::new(3, Duration::from_secs(60));
    for i in 0..10 {
        cache.insert(CacheKey(i), equity_result(i as f64 / 10.0));
        assert!(cache.len() <= 3);
    }
    assert_eq!(cache.stats().evictions, 7);
    for i in 7..10 {
        assert!(cache.get(&CacheKey(i)).is_some());
    }
    assert!(cache.get(&CacheKey(0)).is_none());
}

#[test]
fn canonical_key_ignores_field_order_and_number_form() {
    let a = StrategyQuery::from_value(json!({
        "query_type": "ev",
        "game_state": {"street": "river", "board": {"texture": "dry", "paired": false}},
        "parameters": {"pot": 100, "bet": 50}
    }))
    .unwrap();
    let b = StrategyQuery::from_value(json!({
        "parameters": {"bet": 50.0, "pot": 100.0},
        "game_state": {"board": {"paired": false, "texture": "dry"}, "street": "river"},
        "query_type": "ev"
    }))
    .unwrap();

    assert_eq!(canonical_key(&a, 2), canonical_key(&b, 2));
    assert_ne!(canonical_key(&a, 2), canonical_key(&a, 3));

    let c = a.clone().with_param("bet", 60);
    assert_ne!(canonical_key(&a, 2), canonical_key(&c, 2));
}

#[test]
fn concurrent_access_is_safe() {
    let cache = StrategyCache::new(64, Duration::from_secs(60));
    thread::scope(|s| {
        for t in 0..4u64 {
            let cache = &cache;
            s.spawn(move || {
                for i in 0..100u64 {
                    let key = CacheKey(t * 1000 + i % 32);
                    cache.insert(key, equity_result(0.5));
                    let _ = cache.get(&key);
                }
            });
        }
    });
    assert!(cache.len() <= 64);
}
