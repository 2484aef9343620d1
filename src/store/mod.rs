//! Store Module
//!
//! The authoritative indicator store and the adapter trait the rest of the
//! crate consumes.
//!
//! ## Responsibilities
//! - Point lookup of an indicator record by value
//! - Single-pass enumeration of every known value (filter builds)
//! - Bounded concurrent access through a connection pool
//!
//! ## Implementations
//! - [`TableStore`]: directory of immutable indicator table files
//! - [`MemoryStore`]: in-process map, for embedding and tests

mod manager;
mod memory;
mod pool;
mod table;

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

pub use manager::{KeyStream, TableStore};
pub use memory::MemoryStore;
pub use pool::{ConnectionPool, ManageConnection, PoolState, PooledConnection};
pub use table::{TableBuilder, TableCursor, TableIterator, TableMeta, TableReader};

// =============================================================================
// Indicator Record
// =============================================================================

/// One known threat indicator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorRecord {
    /// Threat category tag (e.g. "botnet", "phishing")
    pub category: String,
    /// Geographic tag
    pub geo: String,
    /// The indicator itself; this is the lookup key
    pub value: String,
    /// Indicator type tag (e.g. "ip", "domain")
    #[serde(rename = "type")]
    pub kind: String,
    /// Feed the indicator came from
    pub source: String,
}

impl IndicatorRecord {
    pub fn new(
        category: impl Into<String>,
        geo: impl Into<String>,
        value: impl Into<String>,
        kind: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            category: category.into(),
            geo: geo.into(),
            value: value.into(),
            kind: kind.into(),
            source: source.into(),
        }
    }
}

// =============================================================================
// Deadline
// =============================================================================

/// Caller-supplied time budget carried into store calls
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Deadline {
    /// (expiry instant, original budget); None = unbounded
    expires: Option<(Instant, Duration)>,
}

impl Deadline {
    /// No deadline
    pub fn none() -> Self {
        Self { expires: None }
    }

    /// Expire `budget` from now
    pub fn after(budget: Duration) -> Self {
        Self {
            expires: Some((Instant::now() + budget, budget)),
        }
    }

    /// `0` means no deadline
    pub fn from_millis(ms: u64) -> Self {
        match ms {
            0 => Self::none(),
            ms => Self::after(Duration::from_millis(ms)),
        }
    }

    /// Time left; `None` if unbounded
    pub fn remaining(&self) -> Option<Duration> {
        self.expires
            .map(|(at, _)| at.saturating_duration_since(Instant::now()))
    }

    pub fn is_expired(&self) -> bool {
        matches!(self.remaining(), Some(d) if d.is_zero())
    }

    /// `Err(Timeout)` once the deadline has passed
    pub fn check(&self) -> StoreResult<()> {
        match self.expires {
            Some((_, budget)) if self.is_expired() => Err(StoreError::Timeout(budget)),
            _ => Ok(()),
        }
    }

    /// The error to report when this deadline runs out
    pub fn timeout_error(&self) -> StoreError {
        StoreError::Timeout(self.expires.map(|(_, b)| b).unwrap_or_default())
    }
}

// =============================================================================
// Store Adapter
// =============================================================================

/// Access to the authoritative indicator data
///
/// Implementations are shared across lookup threads and must bound their own
/// concurrent resource use (see [`ConnectionPool`]).
pub trait Store: Send + Sync {
    /// Finite, single-pass stream of every indicator value
    type Keys: Iterator<Item = StoreResult<String>> + Send;

    /// Fetch the record whose `value` equals `key`
    ///
    /// `Ok(None)` is a confirmed absence; errors are never folded into it.
    fn point_lookup(&self, key: &str, deadline: Deadline) -> StoreResult<Option<IndicatorRecord>>;

    /// Start enumerating every indicator value
    ///
    /// Items that are `Err` with [`StoreError::is_row_level`] affect one row
    /// only; any other error ends the stream.
    fn enumerate_keys(&self, deadline: Deadline) -> StoreResult<Self::Keys>;

    /// Pick up changes made outside this process
    ///
    /// Returns whether the key set may have changed since the last call.
    fn refresh(&self) -> StoreResult<bool> {
        Ok(true)
    }
}
