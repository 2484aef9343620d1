//! Filter Module
//!
//! Probabilistic membership pre-check over indicator values.
//!
//! ## Responsibilities
//! - Size a Bloom filter from (expected count, false-positive rate)
//! - Build it in one pass over the store's key enumeration
//! - Answer "definitely absent" / "possibly present" without I/O
//! - Publish rebuilt filters atomically while lookups continue
//!
//! ## Guarantees
//! - No false negatives for keys enumerated at build time
//! - A partially built filter is never visible to readers

mod bloom;
mod handle;
mod hash;
mod index;
mod params;

pub use bloom::BloomFilter;
pub use handle::{IndexHandle, IndexState, RebuildOutcome};
pub use index::{BuildReport, MembershipIndex, RowFailurePolicy};
pub use params::{estimate_fpr, IndexParams, MAX_FILTER_BITS, MAX_HASH_COUNT};
