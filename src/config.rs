//! Configuration for ThreatSieve
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::Result;
use crate::filter::IndexParams;
use crate::store::Deadline;

/// Main configuration for a ThreatSieve instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Store Configuration
    // -------------------------------------------------------------------------
    /// Root directory for indicator table files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── table_000001.itb
    ///     └── table_000002.itb
    pub data_dir: PathBuf,

    /// Upper bound on simultaneously open store sessions
    pub max_open_connections: usize,

    /// Idle store sessions kept around for reuse
    pub max_idle_connections: usize,

    /// Deadline for a single store lookup (milliseconds, 0 = none)
    pub lookup_timeout_ms: u64,

    // -------------------------------------------------------------------------
    // Membership Index Configuration
    // -------------------------------------------------------------------------
    /// Estimated number of distinct indicator values
    pub expected_count: u64,

    /// Target false-positive probability, in (0, 1)
    pub false_positive_rate: f64,

    /// Skip rows that fail to decode during a build instead of aborting it
    pub skip_malformed_rows: bool,

    /// Deadline for a full key enumeration (milliseconds, 0 = none)
    pub build_timeout_ms: u64,

    /// Periodic rebuild interval (seconds, 0 = disabled)
    pub refresh_interval_secs: u64,

    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// TCP listen address
    pub listen_addr: String,

    /// Max concurrent client connections
    pub max_connections: usize,

    /// Connection read timeout (milliseconds)
    pub read_timeout_ms: u64,

    /// Connection write timeout (milliseconds)
    pub write_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./threatsieve_data"),
            max_open_connections: 100,
            max_idle_connections: 10,
            lookup_timeout_ms: 0,
            expected_count: 2_000_000,
            false_positive_rate: 0.01,
            skip_malformed_rows: true,
            build_timeout_ms: 0,
            refresh_interval_secs: 0,
            listen_addr: "127.0.0.1:8080".to_string(),
            max_connections: 1024,
            read_timeout_ms: 5000,
            write_timeout_ms: 5000,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Validated filter parameters
    pub fn index_params(&self) -> Result<IndexParams> {
        IndexParams::new(self.expected_count, self.false_positive_rate)
    }

    /// Deadline for one store lookup starting now
    pub fn lookup_deadline(&self) -> Deadline {
        Deadline::from_millis(self.lookup_timeout_ms)
    }

    /// Deadline for one full build starting now
    pub fn build_deadline(&self) -> Deadline {
        Deadline::from_millis(self.build_timeout_ms)
    }

    /// Refresh interval, if periodic rebuilds are enabled
    pub fn refresh_interval(&self) -> Option<Duration> {
        match self.refresh_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for indicator tables)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the maximum number of open store sessions
    pub fn max_open_connections(mut self, count: usize) -> Self {
        self.config.max_open_connections = count;
        self
    }

    /// Set the maximum number of idle store sessions
    pub fn max_idle_connections(mut self, count: usize) -> Self {
        self.config.max_idle_connections = count;
        self
    }

    /// Set the per-lookup store deadline (in milliseconds)
    pub fn lookup_timeout_ms(mut self, ms: u64) -> Self {
        self.config.lookup_timeout_ms = ms;
        self
    }

    /// Set the expected indicator count for the filter
    pub fn expected_count(mut self, count: u64) -> Self {
        self.config.expected_count = count;
        self
    }

    /// Set the target false-positive rate for the filter
    pub fn false_positive_rate(mut self, rate: f64) -> Self {
        self.config.false_positive_rate = rate;
        self
    }

    /// Skip (true) or abort on (false) malformed rows during builds
    pub fn skip_malformed_rows(mut self, skip: bool) -> Self {
        self.config.skip_malformed_rows = skip;
        self
    }

    /// Set the build enumeration deadline (in milliseconds)
    pub fn build_timeout_ms(mut self, ms: u64) -> Self {
        self.config.build_timeout_ms = ms;
        self
    }

    /// Set the periodic rebuild interval (in seconds, 0 disables)
    pub fn refresh_interval_secs(mut self, secs: u64) -> Self {
        self.config.refresh_interval_secs = secs;
        self
    }

    /// Set the TCP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the maximum number of concurrent connections
    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.max_connections = count;
        self
    }

    /// Set the read timeout (in milliseconds)
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    /// Set the write timeout (in milliseconds)
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
