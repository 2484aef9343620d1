//! Resolver Module
//!
//! The lookup dispatcher: answers "is this value a known indicator?" against
//! the store, optionally guarded by the membership index.
//!
//! ## Responsibilities
//! - Direct resolution (always asks the store)
//! - Accelerated resolution (asks the index first, skips the store on a
//!   definite miss)
//! - Index rebuilds on demand and on store changes
//! - Lookup counters

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{Result, SieveError};
use crate::filter::{IndexHandle, IndexParams, IndexState, RebuildOutcome, RowFailurePolicy};
use crate::store::{Deadline, IndicatorRecord, Store};

/// Outcome of one lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    /// The store holds a record for the value
    Found(IndicatorRecord),
    /// The store was asked and has no record
    NotFoundConfirmed,
    /// The index ruled the value out; the store was not asked
    NotFoundFiltered,
}

impl Resolution {
    pub fn is_found(&self) -> bool {
        matches!(self, Resolution::Found(_))
    }

    pub fn record(&self) -> Option<&IndicatorRecord> {
        match self {
            Resolution::Found(record) => Some(record),
            _ => None,
        }
    }
}

/// Which resolution path to take
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LookupMode {
    Direct,
    Accelerated,
}

#[derive(Default)]
struct Counters {
    direct_lookups: AtomicU64,
    accelerated_lookups: AtomicU64,
    found: AtomicU64,
    not_found_confirmed: AtomicU64,
    filtered: AtomicU64,
    false_positives: AtomicU64,
    unfiltered_lookups: AtomicU64,
    store_errors: AtomicU64,
    rebuilds_completed: AtomicU64,
    rebuilds_failed: AtomicU64,
    rebuilds_rejected: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Point-in-time view of resolver activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolverStats {
    pub direct_lookups: u64,
    pub accelerated_lookups: u64,
    pub found: u64,
    pub not_found_confirmed: u64,
    /// Accelerated lookups answered by the index alone
    pub filtered: u64,
    /// Accelerated lookups the index passed but the store had no record for
    pub false_positives: u64,
    /// Accelerated lookups served while no index was published
    pub unfiltered_lookups: u64,
    pub store_errors: u64,
    pub rebuilds_completed: u64,
    pub rebuilds_failed: u64,
    pub rebuilds_rejected: u64,
    pub index_state: IndexState,
    pub index_generation: Option<u64>,
    pub index_keys: u64,
}

/// The lookup dispatcher
///
/// ## Concurrency Model
///
/// - **Lookups**: fully concurrent, `&self` only. The index is read through
///   an `Arc` snapshot; store concurrency is bounded by the store's pool.
/// - **Rebuilds**: serialized by the [`IndexHandle`]; lookups keep using the
///   previous index until the new one is swapped in.
pub struct Resolver<S: Store> {
    /// Resolver configuration
    config: Config,

    /// Authoritative store
    store: Arc<S>,

    /// Published membership index
    index: IndexHandle,

    /// Activity counters (lock-free)
    counters: Counters,

    /// Store change seen by `refresh()` that no published index covers yet
    pending_change: AtomicBool,
}

impl<S: Store> Resolver<S> {
    /// Create a resolver with no index yet
    ///
    /// Accelerated lookups go straight to the store until the first
    /// successful [`rebuild_index`](Self::rebuild_index).
    pub fn new(config: Config, store: Arc<S>) -> Self {
        Self {
            config,
            store,
            index: IndexHandle::new(),
            counters: Counters::default(),
            pending_change: AtomicBool::new(false),
        }
    }

    /// Create a resolver and build its first index from `config`
    ///
    /// Fails if the configured parameters are invalid or the build fails.
    pub fn open(config: Config, store: Arc<S>) -> Result<Self> {
        let params = config.index_params()?;
        let resolver = Self::new(config, store);
        resolver.build_now(params)?;
        Ok(resolver)
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    /// Resolve by the requested path, using the configured lookup deadline
    pub fn resolve(&self, mode: LookupMode, key: &str) -> Result<Resolution> {
        let deadline = self.config.lookup_deadline();
        match mode {
            LookupMode::Direct => self.resolve_direct_with_deadline(key, deadline),
            LookupMode::Accelerated => self.resolve_accelerated_with_deadline(key, deadline),
        }
    }

    /// Always query the store
    pub fn resolve_direct(&self, key: &str) -> Result<Resolution> {
        self.resolve_direct_with_deadline(key, self.config.lookup_deadline())
    }

    /// Always query the store, giving up at `deadline`
    pub fn resolve_direct_with_deadline(&self, key: &str, deadline: Deadline) -> Result<Resolution> {
        Counters::bump(&self.counters.direct_lookups);
        self.lookup_store(key, deadline)
    }

    /// Query the index, and the store only if the index cannot rule `key` out
    pub fn resolve_accelerated(&self, key: &str) -> Result<Resolution> {
        self.resolve_accelerated_with_deadline(key, self.config.lookup_deadline())
    }

    /// Accelerated resolution giving up at `deadline`
    pub fn resolve_accelerated_with_deadline(
        &self,
        key: &str,
        deadline: Deadline,
    ) -> Result<Resolution> {
        Counters::bump(&self.counters.accelerated_lookups);

        let Some(index) = self.index.current() else {
            Counters::bump(&self.counters.unfiltered_lookups);
            return self.lookup_store(key, deadline);
        };

        if !index.test(key) {
            Counters::bump(&self.counters.filtered);
            tracing::trace!(key, generation = index.generation(), "Filtered by membership index");
            return Ok(Resolution::NotFoundFiltered);
        }
        drop(index);

        let resolution = self.lookup_store(key, deadline)?;
        if resolution == Resolution::NotFoundConfirmed {
            Counters::bump(&self.counters.false_positives);
        }
        Ok(resolution)
    }

    /// Single store round trip; errors pass through untouched
    fn lookup_store(&self, key: &str, deadline: Deadline) -> Result<Resolution> {
        match self.store.point_lookup(key, deadline) {
            Ok(Some(record)) => {
                Counters::bump(&self.counters.found);
                Ok(Resolution::Found(record))
            }
            Ok(None) => {
                Counters::bump(&self.counters.not_found_confirmed);
                Ok(Resolution::NotFoundConfirmed)
            }
            Err(e) => {
                Counters::bump(&self.counters.store_errors);
                tracing::debug!(key, error = %e, "Store lookup failed");
                Err(SieveError::Store(e))
            }
        }
    }

    // =========================================================================
    // Index Maintenance
    // =========================================================================

    /// Rebuild the index with new parameters
    ///
    /// Parameters are validated before anything else happens. The store is
    /// refreshed first so externally added data is included. A request made
    /// while another build runs returns [`RebuildOutcome::AlreadyInProgress`].
    pub fn rebuild_index(&self, expected_count: u64, false_positive_rate: f64) -> Result<RebuildOutcome> {
        let params = IndexParams::new(expected_count, false_positive_rate)?;
        self.refresh_store()?;
        self.build_now(params)
    }

    /// Rebuild with the configured parameters if the store reports a change
    ///
    /// A change stays pending until an index built after it is published, so
    /// a failed or rejected build is retried on the next call. Returns `None`
    /// when nothing is pending.
    pub fn refresh_index(&self) -> Result<Option<RebuildOutcome>> {
        let params = self.config.index_params()?;
        self.refresh_store()?;

        let pending = self.pending_change.load(Ordering::SeqCst);
        if !pending && self.index.current().is_some() {
            return Ok(None);
        }

        self.build_now(params).map(Some)
    }

    /// Pick up external store changes, remembering them until a build covers them
    fn refresh_store(&self) -> Result<()> {
        match self.store.refresh() {
            Ok(true) => {
                self.pending_change.store(true, Ordering::SeqCst);
                Ok(())
            }
            Ok(false) => Ok(()),
            Err(e) => {
                Counters::bump(&self.counters.rebuilds_failed);
                tracing::error!(error = %e, "Store refresh failed; keeping current index");
                Err(SieveError::Build {
                    inserted: 0,
                    source: e,
                })
            }
        }
    }

    /// Build from a fresh key enumeration and publish
    fn build_now(&self, params: IndexParams) -> Result<RebuildOutcome> {
        let policy = RowFailurePolicy::from_skip(self.config.skip_malformed_rows);
        let deadline = self.config.build_deadline();
        let pending = &self.pending_change;

        // Runs only once the build lock is held: the enumeration that follows
        // covers every change flagged before this point
        let mut claimed = false;
        let outcome = self.index.rebuild_with(params, policy, || {
            claimed = pending.swap(false, Ordering::SeqCst);
            self.store.enumerate_keys(deadline)
        });

        match &outcome {
            Ok(RebuildOutcome::Rebuilt(_)) => Counters::bump(&self.counters.rebuilds_completed),
            Ok(RebuildOutcome::AlreadyInProgress) => Counters::bump(&self.counters.rebuilds_rejected),
            Err(e) => {
                if claimed {
                    pending.store(true, Ordering::SeqCst);
                }
                Counters::bump(&self.counters.rebuilds_failed);
                tracing::error!(error = %e, "Index build failed; keeping current index");
            }
        }

        outcome
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Snapshot of the counters and index state
    pub fn stats(&self) -> ResolverStats {
        let c = &self.counters;
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        let index = self.index.current();

        ResolverStats {
            direct_lookups: load(&c.direct_lookups),
            accelerated_lookups: load(&c.accelerated_lookups),
            found: load(&c.found),
            not_found_confirmed: load(&c.not_found_confirmed),
            filtered: load(&c.filtered),
            false_positives: load(&c.false_positives),
            unfiltered_lookups: load(&c.unfiltered_lookups),
            store_errors: load(&c.store_errors),
            rebuilds_completed: load(&c.rebuilds_completed),
            rebuilds_failed: load(&c.rebuilds_failed),
            rebuilds_rejected: load(&c.rebuilds_rejected),
            index_state: self.index.state(),
            index_generation: index.as_ref().map(|i| i.generation()),
            index_keys: index.as_ref().map(|i| i.keys_inserted()).unwrap_or(0),
        }
    }

    /// The published index slot
    pub fn index(&self) -> &IndexHandle {
        &self.index
    }

    /// The backing store
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}
