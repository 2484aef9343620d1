//! Tests for Resolver
//!
//! These tests verify:
//! - Direct and accelerated lookups agree on every key
//! - Filtered misses never reach the store
//! - Store failures surface as errors, never as "not found"
//! - Rebuild validation, failure handling and rejection
//! - Counters

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use threatsieve::filter::IndexState;
use threatsieve::refresh::IndexRefresher;
use threatsieve::{
    Config, Deadline, IndicatorRecord, LookupMode, MemoryStore, RebuildOutcome, Resolution,
    Resolver, SieveError, Store, StoreError, StoreResult,
};

// =============================================================================
// Instrumented Store
// =============================================================================

/// In-memory store that counts calls and can be told to fail
#[derive(Default)]
struct CountingStore {
    records: BTreeMap<String, IndicatorRecord>,
    lookups: AtomicU64,
    enumerations: AtomicU64,
    fail_lookups: AtomicBool,
    /// Enumeration fails after yielding this many keys
    fail_enumeration_after: Mutex<Option<usize>>,
    /// Values reported as undecodable rows during enumeration
    malformed: Vec<String>,
    /// When set, enumeration blocks until released
    gate: Mutex<Option<(Sender<()>, Receiver<()>)>>,
}

impl CountingStore {
    fn with_values(values: &[&str]) -> Self {
        Self {
            records: values.iter().map(|v| (v.to_string(), record(v))).collect(),
            ..Default::default()
        }
    }

    fn lookups(&self) -> u64 {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl Store for CountingStore {
    type Keys = std::vec::IntoIter<StoreResult<String>>;

    fn point_lookup(&self, key: &str, deadline: Deadline) -> StoreResult<Option<IndicatorRecord>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        deadline.check()?;
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }
        Ok(self.records.get(key).cloned())
    }

    fn enumerate_keys(&self, _deadline: Deadline) -> StoreResult<Self::Keys> {
        self.enumerations.fetch_add(1, Ordering::SeqCst);

        let gate = self.gate.lock().clone();
        if let Some((started, release)) = gate {
            started.send(()).unwrap();
            release.recv().unwrap();
        }

        let mut items: Vec<StoreResult<String>> = self.records.keys().cloned().map(Ok).collect();
        for value in &self.malformed {
            items.push(Err(StoreError::MalformedRow(value.clone())));
        }
        if let Some(limit) = *self.fail_enumeration_after.lock() {
            items.truncate(limit);
            items.push(Err(StoreError::Unavailable("stream reset".to_string())));
        }
        Ok(items.into_iter())
    }
}

/// Memory store whose next enumeration or refresh can be made to fail
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    fail_next_enumeration: AtomicBool,
    fail_refresh: AtomicBool,
    /// When set, enumeration blocks until released
    gate: Mutex<Option<(Sender<()>, Receiver<()>)>>,
}

impl Store for FlakyStore {
    type Keys = <MemoryStore as Store>::Keys;

    fn point_lookup(&self, key: &str, deadline: Deadline) -> StoreResult<Option<IndicatorRecord>> {
        self.inner.point_lookup(key, deadline)
    }

    fn enumerate_keys(&self, deadline: Deadline) -> StoreResult<Self::Keys> {
        if self.fail_next_enumeration.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Unavailable("transient".to_string()));
        }
        let keys = self.inner.enumerate_keys(deadline)?;

        // Keys are snapshotted before blocking
        let gate = self.gate.lock().clone();
        if let Some((started, release)) = gate {
            started.send(()).unwrap();
            release.recv().unwrap();
        }
        Ok(keys)
    }

    fn refresh(&self) -> StoreResult<bool> {
        if self.fail_refresh.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("refresh refused".to_string()));
        }
        self.inner.refresh()
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn record(value: &str) -> IndicatorRecord {
    IndicatorRecord::new("botnet", "DE", value, "ip", "unit-test")
}

fn config() -> Config {
    Config::builder()
        .expected_count(1000)
        .false_positive_rate(0.01)
        .build()
}

fn known_values() -> Vec<String> {
    (0..300).map(|i| format!("198.51.{}.{}", i / 256, i % 256)).collect()
}

fn setup_resolver() -> (Arc<CountingStore>, Resolver<CountingStore>) {
    let values = known_values();
    let refs: Vec<&str> = values.iter().map(|s| s.as_str()).collect();
    let store = Arc::new(CountingStore::with_values(&refs));
    let resolver = Resolver::open(config(), Arc::clone(&store)).unwrap();
    (store, resolver)
}

// =============================================================================
// Resolution Tests
// =============================================================================

#[test]
fn test_open_builds_index() {
    let (store, resolver) = setup_resolver();

    assert_eq!(resolver.index().state(), IndexState::Ready);
    assert_eq!(store.enumerations.load(Ordering::SeqCst), 1);

    let stats = resolver.stats();
    assert_eq!(stats.index_generation, Some(1));
    assert_eq!(stats.index_keys, 300);
    assert_eq!(stats.rebuilds_completed, 1);
}

#[test]
fn test_open_rejects_invalid_params() {
    let store = Arc::new(CountingStore::default());
    let config = Config::builder().false_positive_rate(1.5).build();

    let err = Resolver::open(config, Arc::clone(&store)).err().unwrap();
    assert!(matches!(err, SieveError::Config(_)));
    assert_eq!(store.enumerations.load(Ordering::SeqCst), 0);
}

#[test]
fn test_known_value_found_both_ways() {
    let (_store, resolver) = setup_resolver();

    for value in known_values() {
        let direct = resolver.resolve_direct(&value).unwrap();
        let accelerated = resolver.resolve_accelerated(&value).unwrap();
        assert_eq!(direct, Resolution::Found(record(&value)));
        assert_eq!(accelerated, direct);
    }
}

#[test]
fn test_unknown_value_outcomes_agree() {
    let (_store, resolver) = setup_resolver();

    for i in 0..2000 {
        let value = format!("unknown-{}.example", i);
        let direct = resolver.resolve_direct(&value).unwrap();
        let accelerated = resolver.resolve_accelerated(&value).unwrap();

        assert_eq!(direct, Resolution::NotFoundConfirmed);
        assert!(!accelerated.is_found());
    }
}

#[test]
fn test_filtered_miss_skips_store() {
    let (store, resolver) = setup_resolver();

    let mut filtered = 0;
    for i in 0..1000 {
        let before = store.lookups();
        let resolution = resolver.resolve_accelerated(&format!("clean-{}.example", i)).unwrap();
        let calls = store.lookups() - before;

        match resolution {
            Resolution::NotFoundFiltered => {
                filtered += 1;
                assert_eq!(calls, 0, "filtered lookup touched the store");
            }
            Resolution::NotFoundConfirmed => assert_eq!(calls, 1),
            Resolution::Found(_) => panic!("unknown value found"),
        }
    }

    // 300 keys in a 1000-key filter: almost everything is filtered
    assert!(filtered > 950, "only {} filtered", filtered);
}

#[test]
fn test_direct_always_queries_store() {
    let (store, resolver) = setup_resolver();
    let before = store.lookups();

    for i in 0..50 {
        resolver.resolve_direct(&format!("clean-{}.example", i)).unwrap();
    }

    assert_eq!(store.lookups() - before, 50);
}

#[test]
fn test_same_answer_repeated() {
    let (_store, resolver) = setup_resolver();

    let first = resolver.resolve_accelerated("203.0.113.7").unwrap();
    for _ in 0..1000 {
        assert_eq!(resolver.resolve_accelerated("203.0.113.7").unwrap(), first);
    }
}

#[test]
fn test_resolve_dispatches_by_mode() {
    let (store, resolver) = setup_resolver();
    let values = known_values();
    let known = &values[0];

    let before = store.lookups();
    assert!(resolver.resolve(LookupMode::Direct, known).unwrap().is_found());
    assert!(resolver.resolve(LookupMode::Accelerated, known).unwrap().is_found());
    assert_eq!(store.lookups() - before, 2);

    let stats = resolver.stats();
    assert_eq!(stats.direct_lookups, 1);
    assert_eq!(stats.accelerated_lookups, 1);
}

#[test]
fn test_empty_key() {
    let (_store, resolver) = setup_resolver();
    assert_eq!(resolver.resolve_direct("").unwrap(), Resolution::NotFoundConfirmed);
    assert!(!resolver.resolve_accelerated("").unwrap().is_found());
}

#[test]
fn test_no_index_falls_back_to_store() {
    let store = Arc::new(CountingStore::with_values(&["1.2.3.4"]));
    let resolver = Resolver::new(config(), Arc::clone(&store));
    assert_eq!(resolver.index().state(), IndexState::Unbuilt);

    assert!(resolver.resolve_accelerated("1.2.3.4").unwrap().is_found());
    assert_eq!(
        resolver.resolve_accelerated("5.6.7.8").unwrap(),
        Resolution::NotFoundConfirmed
    );
    assert_eq!(store.lookups(), 2);
    assert_eq!(resolver.stats().unfiltered_lookups, 2);
}

// =============================================================================
// Store Failure Tests
// =============================================================================

#[test]
fn test_store_error_is_not_a_miss() {
    let (store, resolver) = setup_resolver();
    store.fail_lookups.store(true, Ordering::SeqCst);

    let values = known_values();
    let known = &values[0];
    let err = resolver.resolve_direct(known).unwrap_err();
    assert!(matches!(err, SieveError::Store(StoreError::Unavailable(_))));

    let err = resolver.resolve_accelerated(known).unwrap_err();
    assert!(matches!(err, SieveError::Store(StoreError::Unavailable(_))));

    assert_eq!(resolver.stats().store_errors, 2);
}

#[test]
fn test_filtered_miss_survives_store_outage() {
    let (store, resolver) = setup_resolver();
    store.fail_lookups.store(true, Ordering::SeqCst);

    // Find a value the index rules out; it must still answer without the store
    let filtered = (0..100)
        .map(|i| format!("clean-{}.example", i))
        .find(|v| !resolver.index().current().unwrap().test(v))
        .unwrap();

    assert_eq!(
        resolver.resolve_accelerated(&filtered).unwrap(),
        Resolution::NotFoundFiltered
    );
}

#[test]
fn test_deadline_surfaces_as_timeout() {
    let (_store, resolver) = setup_resolver();
    let values = known_values();
    let known = &values[0];

    let err = resolver
        .resolve_direct_with_deadline(known, Deadline::after(Duration::ZERO))
        .unwrap_err();
    assert!(matches!(err, SieveError::Store(StoreError::Timeout(_))));
}

// =============================================================================
// Rebuild Tests
// =============================================================================

#[test]
fn test_rebuild_validates_before_touching_store() {
    let (store, resolver) = setup_resolver();
    let enumerations = store.enumerations.load(Ordering::SeqCst);

    for (n, p) in [(0, 0.01), (1000, 0.0), (1000, 1.0), (1000, -1.0), (1000, f64::NAN)] {
        let err = resolver.rebuild_index(n, p).unwrap_err();
        assert!(matches!(err, SieveError::Config(_)), "n={} p={}", n, p);
    }

    assert_eq!(store.enumerations.load(Ordering::SeqCst), enumerations);
    assert_eq!(resolver.stats().index_generation, Some(1));
}

#[test]
fn test_rebuild_with_new_params() {
    let (_store, resolver) = setup_resolver();

    let outcome = resolver.rebuild_index(10_000, 0.001).unwrap();
    let RebuildOutcome::Rebuilt(report) = outcome else {
        panic!("expected Rebuilt");
    };

    assert_eq!(report.generation, 2);
    assert_eq!(report.keys_inserted, 300);
    let index = resolver.index().current().unwrap();
    assert_eq!(index.params().expected_count(), 10_000);
}

#[test]
fn test_failed_rebuild_keeps_serving_previous_index() {
    let (store, resolver) = setup_resolver();
    *store.fail_enumeration_after.lock() = Some(100);

    let err = resolver.rebuild_index(1000, 0.01).unwrap_err();
    assert!(matches!(err, SieveError::Build { inserted: 100, .. }));

    let stats = resolver.stats();
    assert_eq!(stats.index_generation, Some(1));
    assert_eq!(stats.rebuilds_failed, 1);
    assert_eq!(stats.index_state, IndexState::Ready);

    // Every known value is still reachable through the old index
    for value in known_values() {
        assert!(resolver.resolve_accelerated(&value).unwrap().is_found());
    }
}

#[test]
fn test_malformed_rows_skipped_by_default() {
    let mut store = CountingStore::with_values(&["a.example", "b.example"]);
    store.malformed = vec!["broken-1".to_string(), "broken-2".to_string()];
    let resolver = Resolver::new(config(), Arc::new(store));

    let RebuildOutcome::Rebuilt(report) = resolver.rebuild_index(1000, 0.01).unwrap() else {
        panic!("expected Rebuilt");
    };
    assert_eq!(report.keys_inserted, 2);
    assert_eq!(report.rows_skipped, 2);
}

#[test]
fn test_malformed_rows_abort_when_strict() {
    let mut store = CountingStore::with_values(&["a.example"]);
    store.malformed = vec!["broken".to_string()];
    let config = Config::builder()
        .expected_count(1000)
        .skip_malformed_rows(false)
        .build();

    let err = Resolver::open(config, Arc::new(store)).err().unwrap();
    assert!(matches!(
        err,
        SieveError::Build {
            source: StoreError::MalformedRow(_),
            ..
        }
    ));
}

#[test]
fn test_rebuild_picks_up_new_store_contents() {
    let store = Arc::new(MemoryStore::with_records(vec![record("1.1.1.1")]));
    let resolver = Resolver::open(config(), Arc::clone(&store)).unwrap();

    store.insert(record("2.2.2.2"));
    resolver.rebuild_index(1000, 0.01).unwrap();

    assert!(resolver.resolve_accelerated("2.2.2.2").unwrap().is_found());
    assert_eq!(resolver.stats().index_generation, Some(2));
}

#[test]
fn test_concurrent_rebuild_rejected() {
    let (store, resolver) = setup_resolver();
    let resolver = Arc::new(resolver);

    let (started_tx, started_rx) = channel::bounded(1);
    let (release_tx, release_rx) = channel::bounded(1);
    *store.gate.lock() = Some((started_tx, release_rx));

    let first = {
        let resolver = Arc::clone(&resolver);
        thread::spawn(move || resolver.rebuild_index(1000, 0.01))
    };

    started_rx.recv().unwrap();
    *store.gate.lock() = None;

    let second = resolver.rebuild_index(1000, 0.01).unwrap();
    assert_eq!(second, RebuildOutcome::AlreadyInProgress);
    assert_eq!(resolver.stats().index_state, IndexState::Building);

    // Lookups are served by the old index meanwhile
    assert!(resolver.resolve_accelerated(&known_values()[5]).unwrap().is_found());

    release_tx.send(()).unwrap();
    assert!(matches!(first.join().unwrap().unwrap(), RebuildOutcome::Rebuilt(_)));

    let stats = resolver.stats();
    assert_eq!(stats.rebuilds_rejected, 1);
    assert_eq!(stats.index_generation, Some(2));
    assert_eq!(stats.index_state, IndexState::Ready);
}

#[test]
fn test_lookups_during_rebuilds_never_miss_known_values() {
    let (_store, resolver) = setup_resolver();
    let resolver = Arc::new(resolver);
    let done = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..4)
        .map(|t| {
            let resolver = Arc::clone(&resolver);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let values = known_values();
                let mut i = t;
                while !done.load(Ordering::SeqCst) {
                    let value = &values[i % values.len()];
                    assert!(resolver.resolve_accelerated(value).unwrap().is_found());
                    i += 1;
                }
            })
        })
        .collect();

    for _ in 0..10 {
        resolver.rebuild_index(1000, 0.01).unwrap();
    }
    done.store(true, Ordering::SeqCst);

    for r in readers {
        r.join().unwrap();
    }
    assert_eq!(resolver.stats().index_generation, Some(11));
}

// =============================================================================
// Refresh Tests
// =============================================================================

#[test]
fn test_refresh_index_skips_unchanged_store() {
    let store = Arc::new(MemoryStore::with_records(vec![record("1.1.1.1")]));
    let resolver = Resolver::open(config(), Arc::clone(&store)).unwrap();

    // with_records leaves the store dirty; the first refresh consumes it
    assert!(resolver.refresh_index().unwrap().is_some());
    assert!(resolver.refresh_index().unwrap().is_none());

    store.insert(record("9.9.9.9"));
    assert!(resolver.refresh_index().unwrap().is_some());
    assert!(resolver.resolve_accelerated("9.9.9.9").unwrap().is_found());
    assert_eq!(store.lookup_count(), 1);
}

#[test]
fn test_refresh_retries_change_after_failed_build() {
    let store = Arc::new(FlakyStore::default());
    store.inner.insert(record("1.1.1.1"));
    let resolver = Resolver::open(config(), Arc::clone(&store)).unwrap();
    resolver.refresh_index().unwrap();

    store.inner.insert(record("7.7.7.7"));
    store.fail_next_enumeration.store(true, Ordering::SeqCst);

    let err = resolver.refresh_index().unwrap_err();
    assert!(matches!(err, SieveError::Build { inserted: 0, .. }));

    // The store no longer reports a change, but the failed build left it pending
    let outcome = resolver.refresh_index().unwrap();
    assert!(matches!(outcome, Some(RebuildOutcome::Rebuilt(_))));
    assert!(resolver.resolve_accelerated("7.7.7.7").unwrap().is_found());

    assert!(resolver.refresh_index().unwrap().is_none());
}

#[test]
fn test_refresh_retries_change_after_rejected_build() {
    let store = Arc::new(FlakyStore::default());
    store.inner.insert(record("1.1.1.1"));
    let resolver = Arc::new(Resolver::open(config(), Arc::clone(&store)).unwrap());
    resolver.refresh_index().unwrap();

    let (started_tx, started_rx) = channel::bounded(1);
    let (release_tx, release_rx) = channel::bounded(1);
    *store.gate.lock() = Some((started_tx, release_rx));

    // This build enumerates before the new value lands
    let slow = {
        let resolver = Arc::clone(&resolver);
        thread::spawn(move || resolver.rebuild_index(1000, 0.01).unwrap())
    };
    started_rx.recv().unwrap();
    *store.gate.lock() = None;

    store.inner.insert(record("7.7.7.7"));
    assert_eq!(
        resolver.refresh_index().unwrap(),
        Some(RebuildOutcome::AlreadyInProgress)
    );

    release_tx.send(()).unwrap();
    assert!(matches!(slow.join().unwrap(), RebuildOutcome::Rebuilt(_)));

    assert!(!resolver.index().current().unwrap().test("7.7.7.7"));

    let outcome = resolver.refresh_index().unwrap();
    assert!(matches!(outcome, Some(RebuildOutcome::Rebuilt(_))));
    assert!(resolver.resolve_accelerated("7.7.7.7").unwrap().is_found());
}

#[test]
fn test_refresh_failure_counts_as_failed_rebuild() {
    let store = Arc::new(FlakyStore::default());
    store.inner.insert(record("1.1.1.1"));
    let resolver = Resolver::open(config(), Arc::clone(&store)).unwrap();
    store.fail_refresh.store(true, Ordering::SeqCst);

    assert!(matches!(
        resolver.refresh_index().unwrap_err(),
        SieveError::Build { inserted: 0, .. }
    ));
    assert!(matches!(
        resolver.rebuild_index(1000, 0.01).unwrap_err(),
        SieveError::Build { inserted: 0, .. }
    ));

    let stats = resolver.stats();
    assert_eq!(stats.rebuilds_failed, 2);
    assert_eq!(stats.index_generation, Some(1));
}

#[test]
fn test_background_refresher_rebuilds_on_change() {
    let store = Arc::new(MemoryStore::with_records(vec![record("1.1.1.1")]));
    let resolver = Arc::new(Resolver::open(config(), Arc::clone(&store)).unwrap());

    let refresher = IndexRefresher::spawn(Arc::clone(&resolver), Duration::from_millis(10)).unwrap();
    store.insert(record("7.7.7.7"));

    let mut found = false;
    for _ in 0..200 {
        if resolver.index().current().unwrap().test("7.7.7.7") {
            found = true;
            break;
        }
        thread::sleep(Duration::from_millis(10));
    }
    refresher.stop();

    assert!(found, "refresher never rebuilt the index");
    assert!(resolver.stats().index_generation.unwrap() >= 2);
}

// =============================================================================
// Stats Tests
// =============================================================================

#[test]
fn test_stats_counters() {
    let (_store, resolver) = setup_resolver();
    let known = known_values()[0].clone();

    resolver.resolve_direct(&known).unwrap();
    resolver.resolve_direct("nope.example").unwrap();
    resolver.resolve_accelerated(&known).unwrap();
    for i in 0..100 {
        resolver.resolve_accelerated(&format!("clean-{}.example", i)).unwrap();
    }

    let stats = resolver.stats();
    assert_eq!(stats.direct_lookups, 2);
    assert_eq!(stats.accelerated_lookups, 101);
    assert_eq!(stats.found, 2);
    assert_eq!(stats.filtered + stats.false_positives, 100);
    assert_eq!(stats.not_found_confirmed, 1 + stats.false_positives);
    assert_eq!(stats.unfiltered_lookups, 0);
    assert_eq!(stats.store_errors, 0);
}

// =============================================================================
// Reference Scenario
// =============================================================================

#[test]
fn test_two_key_scenario() {
    let store = Arc::new(CountingStore::with_values(&["1.2.3.4", "5.6.7.8"]));
    let resolver = Resolver::new(config(), Arc::clone(&store));
    resolver.rebuild_index(1000, 0.01).unwrap();

    let index = resolver.index().current().unwrap();
    for _ in 0..1000 {
        assert!(index.test("1.2.3.4"));
    }

    let before = store.lookups();
    assert_eq!(
        resolver.resolve_accelerated("9.9.9.9").unwrap(),
        Resolution::NotFoundFiltered
    );
    assert_eq!(store.lookups(), before);

    // A store failure behind a passing test is an error, not a miss
    store.fail_lookups.store(true, Ordering::SeqCst);
    assert!(matches!(
        resolver.resolve_accelerated("5.6.7.8"),
        Err(SieveError::Store(_))
    ));
}
