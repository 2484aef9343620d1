//! Command definitions
//!
//! Represents commands from clients.

use crate::resolver::LookupMode;

/// Command types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandType {
    ResolveDirect = 0x01,
    ResolveAccelerated = 0x02,
    Rebuild = 0x03,
    Ping = 0x04,
    Stats = 0x05,
}

/// A parsed command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Look up an indicator value
    Resolve { mode: LookupMode, key: String },

    /// Rebuild the membership index with new parameters
    Rebuild {
        expected_count: u64,
        false_positive_rate: f64,
    },

    /// Ping (health check)
    Ping,

    /// Resolver counters
    Stats,
}

impl Command {
    /// Direct lookup of `key`
    pub fn resolve_direct(key: impl Into<String>) -> Self {
        Command::Resolve {
            mode: LookupMode::Direct,
            key: key.into(),
        }
    }

    /// Accelerated lookup of `key`
    pub fn resolve_accelerated(key: impl Into<String>) -> Self {
        Command::Resolve {
            mode: LookupMode::Accelerated,
            key: key.into(),
        }
    }

    /// Get the command type
    pub fn command_type(&self) -> CommandType {
        match self {
            Command::Resolve {
                mode: LookupMode::Direct,
                ..
            } => CommandType::ResolveDirect,
            Command::Resolve {
                mode: LookupMode::Accelerated,
                ..
            } => CommandType::ResolveAccelerated,
            Command::Rebuild { .. } => CommandType::Rebuild,
            Command::Ping => CommandType::Ping,
            Command::Stats => CommandType::Stats,
        }
    }
}
