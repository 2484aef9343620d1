//! # ThreatSieve
//!
//! Threat indicator lookups with a probabilistic pre-check:
//! - Authoritative store of indicator records (immutable table files)
//! - Bloom-filter membership index that answers most misses without I/O
//! - Atomic index rebuilds while lookups keep running
//! - TCP-based client protocol
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      TCP Server                              │
//! │                  (Multiple Clients)                          │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                      Resolver                                │
//! │            (direct / accelerated lookups)                    │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐  maybe   ┌─────────────┐
//!   │ Membership  │ ───────► │    Store    │
//!   │   Index     │          │ (pooled)    │
//!   └──────▲──────┘          └──────┬──────┘
//!          │      build: all keys   │
//!          └────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod filter;
pub mod store;
pub mod resolver;
pub mod refresh;
pub mod network;
pub mod protocol;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use config::Config;
pub use error::{Result, SieveError, StoreError, StoreResult};
pub use filter::{IndexHandle, IndexParams, MembershipIndex, RebuildOutcome};
pub use resolver::{LookupMode, Resolution, Resolver, ResolverStats};
pub use store::{Deadline, IndicatorRecord, MemoryStore, Store, TableStore};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of ThreatSieve
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
