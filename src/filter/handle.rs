//! Published index slot
//!
//! Holds the current [`MembershipIndex`] and owns the build lifecycle:
//!
//! ```text
//!   Unbuilt ──build──► Building ──ok──► Ready ──rebuild──► Building ──ok──► Ready
//!                          │                                  │
//!                          └─err──► Unbuilt                   └─err──► Ready (previous index)
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SieveError, StoreResult};

use super::index::{BuildReport, MembershipIndex, RowFailurePolicy};
use super::params::IndexParams;

/// Lifecycle state of the published slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexState {
    /// Nothing has been published yet
    Unbuilt,
    /// A build is running (a previous index may still be serving)
    Building,
    /// An index is published and no build is running
    Ready,
}

/// Result of a rebuild request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RebuildOutcome {
    /// A new index was built and published
    Rebuilt(BuildReport),
    /// Another build held the slot; nothing was done
    AlreadyInProgress,
}

/// Shared handle to the current membership index
///
/// ## Concurrency:
/// - `published`: RwLock around an `Arc`; readers clone the `Arc` and drop the
///   lock before testing, the writer holds it only for the pointer swap
/// - `build_lock`: at most one build at a time; contenders are turned away
/// - `building`: lock-free flag for state reporting
#[derive(Default)]
pub struct IndexHandle {
    /// Currently served index, if any
    published: RwLock<Option<Arc<MembershipIndex>>>,

    /// Serializes builds against the slot
    build_lock: Mutex<()>,

    /// Set while a build is draining its key source
    building: AtomicBool,
}

/// Clears the building flag even if the key source panics
struct BuildingGuard<'a>(&'a AtomicBool);

impl<'a> BuildingGuard<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for BuildingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl IndexHandle {
    /// Create an empty (Unbuilt) slot
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the published index
    #[inline]
    pub fn current(&self) -> Option<Arc<MembershipIndex>> {
        self.published.read().clone()
    }

    /// Current lifecycle state
    pub fn state(&self) -> IndexState {
        if self.building.load(Ordering::SeqCst) {
            IndexState::Building
        } else if self.published.read().is_some() {
            IndexState::Ready
        } else {
            IndexState::Unbuilt
        }
    }

    /// Build a new index from `source` and publish it on success
    ///
    /// `source` is only invoked once the build lock is held, so a rejected
    /// request never opens a key enumeration. On any error the previously
    /// published index stays in place.
    pub fn rebuild_with<F, I>(
        &self,
        params: IndexParams,
        policy: RowFailurePolicy,
        source: F,
    ) -> Result<RebuildOutcome>
    where
        F: FnOnce() -> StoreResult<I>,
        I: IntoIterator<Item = StoreResult<String>>,
    {
        let Some(_build_guard) = self.build_lock.try_lock() else {
            tracing::debug!("Index rebuild already in progress; request ignored");
            return Ok(RebuildOutcome::AlreadyInProgress);
        };

        let generation = self.current().map(|i| i.generation() + 1).unwrap_or(1);
        let _building = BuildingGuard::enter(&self.building);

        tracing::info!(
            generation,
            expected_count = params.expected_count(),
            false_positive_rate = params.false_positive_rate(),
            size_bits = params.size_bits(),
            hash_count = params.hash_count(),
            "Building membership index"
        );

        let keys = source().map_err(|e| SieveError::Build {
            inserted: 0,
            source: e,
        })?;
        let (index, report) = MembershipIndex::build(params, keys, policy, generation)?;

        // Old index is released after the write guard is gone
        let previous = self.published.write().replace(Arc::new(index));
        drop(previous);

        tracing::info!(
            generation,
            keys = report.keys_inserted,
            skipped = report.rows_skipped,
            elapsed = ?report.elapsed,
            "Membership index published"
        );

        Ok(RebuildOutcome::Rebuilt(report))
    }
}
