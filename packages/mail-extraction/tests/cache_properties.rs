//! Property tests for the cache bound and the category state machine.

use chrono::Utc;
use mail_extraction::{
    CategoryHistory, CategoryStatus, MessageContent, QueryAttempt, SearchCache,
};
use proptest::prelude::*;

fn message(id: usize) -> MessageContent {
    MessageContent::new(format!("m{id}"), "Subject", "news@acme.com", Utc::now(), "Body")
}

proptest! {
    #[test]
    fn prop_cache_never_exceeds_capacity(
        capacity in 1usize..20,
        ids in prop::collection::vec(0usize..50, 0..100),
    ) {
        let mut cache = SearchCache::new(capacity);
        for id in ids {
            cache.insert(message(id));
            prop_assert!(cache.len() <= capacity);
        }
    }

    #[test]
    fn prop_fifo_keeps_latest_distinct_inserts(capacity in 1usize..20, n in 0usize..60) {
        let mut cache = SearchCache::new(capacity);
        for id in 0..n {
            cache.insert(message(id));
        }

        let expected: Vec<String> = (n.saturating_sub(capacity)..n).map(|i| format!("m{i}")).collect();
        let cached: Vec<String> = cache.cached_ids().map(str::to_string).collect();
        prop_assert_eq!(cached, expected);
    }

    #[test]
    fn prop_status_is_monotonic(
        records in prop::collection::vec(0usize..3, 1..12),
        max_attempts in 1usize..8,
    ) {
        let mut history = CategoryHistory::new("Acme");
        let mut terminal: Option<CategoryStatus> = None;

        for (i, found) in records.into_iter().enumerate() {
            let attempt = QueryAttempt::new(format!("q{i}"), vec![]).with_records_found(found);
            let result = history.record_attempt(attempt, max_attempts);

            match terminal {
                Some(status) => {
                    prop_assert!(result.is_err());
                    prop_assert_eq!(history.status(), status);
                }
                None => {
                    let status = result.unwrap();
                    if status.is_terminal() {
                        terminal = Some(status);
                    }
                }
            }
            prop_assert!(history.attempt_count() <= max_attempts);
        }
    }
}

#[test]
fn test_capacity_plus_one_evicts_first_entry() {
    let capacity = 200;
    let mut cache = SearchCache::new(capacity);
    for id in 0..=capacity {
        cache.insert(message(id));
    }

    assert_eq!(cache.len(), capacity);
    assert!(!cache.contains("m0"));
    assert!(cache.contains("m1"));
    assert!(cache.contains(&format!("m{capacity}")));
}
