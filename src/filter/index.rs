//! Membership Index
//!
//! An immutable Bloom filter built in one pass over the store's key set.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SieveError, StoreResult};

use super::bloom::BloomFilter;
use super::params::IndexParams;

/// What a build does with a row the store could not decode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowFailurePolicy {
    /// Log, count in [`BuildReport::rows_skipped`], keep going
    Skip,
    /// Abort the build with [`SieveError::Build`]
    Abort,
}

impl RowFailurePolicy {
    pub fn from_skip(skip: bool) -> Self {
        if skip {
            RowFailurePolicy::Skip
        } else {
            RowFailurePolicy::Abort
        }
    }
}

/// Summary of a successful build
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildReport {
    /// Generation number of the index this build produced
    pub generation: u64,
    /// Keys inserted (duplicates counted)
    pub keys_inserted: u64,
    /// Rows skipped under [`RowFailurePolicy::Skip`]
    pub rows_skipped: u64,
    /// Bit array size (m)
    pub size_bits: u64,
    /// Hash functions (k)
    pub hash_count: u32,
    /// Wall time spent draining the key source
    pub elapsed: Duration,
}

/// Read-only probabilistic set over indicator values
///
/// Never mutated after [`MembershipIndex::build`] returns; share it behind an
/// `Arc` and call [`test`](Self::test) from any thread.
#[derive(Debug)]
pub struct MembershipIndex {
    filter: BloomFilter,
    params: IndexParams,
    generation: u64,
}

impl MembershipIndex {
    /// Drain `keys` into a freshly allocated filter
    ///
    /// Fatal store errors (and row errors under [`RowFailurePolicy::Abort`])
    /// drop the partially filled filter and return [`SieveError::Build`].
    pub fn build<I>(
        params: IndexParams,
        keys: I,
        policy: RowFailurePolicy,
        generation: u64,
    ) -> Result<(Self, BuildReport)>
    where
        I: IntoIterator<Item = StoreResult<String>>,
    {
        let started = Instant::now();
        let mut filter = BloomFilter::with_params(&params);
        let mut rows_skipped = 0u64;

        for item in keys {
            match item {
                Ok(key) => filter.insert(key.as_bytes()),
                Err(e) if e.is_row_level() && policy == RowFailurePolicy::Skip => {
                    rows_skipped += 1;
                    tracing::warn!(generation, error = %e, "Skipping unreadable row during index build");
                }
                Err(e) => {
                    return Err(SieveError::Build {
                        inserted: filter.inserted(),
                        source: e,
                    });
                }
            }
        }

        let report = BuildReport {
            generation,
            keys_inserted: filter.inserted(),
            rows_skipped,
            size_bits: filter.size_bits(),
            hash_count: filter.hash_count(),
            elapsed: started.elapsed(),
        };

        if report.keys_inserted > params.expected_count() {
            tracing::warn!(
                keys = report.keys_inserted,
                expected = params.expected_count(),
                "Index holds more keys than expected_count; false-positive rate will exceed target"
            );
        }

        let index = Self {
            filter,
            params,
            generation,
        };

        Ok((index, report))
    }

    /// `false`: `key` was certainly not in the build-time key set.
    /// `true`: present, or a false positive.
    #[inline]
    pub fn test(&self, key: &str) -> bool {
        self.filter.contains(key.as_bytes())
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn params(&self) -> &IndexParams {
        &self.params
    }

    pub fn keys_inserted(&self) -> u64 {
        self.filter.inserted()
    }

    /// False-positive rate implied by the actual bit fill
    pub fn estimated_fpr(&self) -> f64 {
        self.filter.fill_fpr()
    }

    pub fn memory_bytes(&self) -> usize {
        self.filter.memory_bytes()
    }
}
