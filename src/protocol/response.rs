//! Response definitions
//!
//! Represents responses to clients.

use crate::error::{Result, SieveError};
use crate::resolver::Resolution;
use crate::store::IndicatorRecord;

/// Response status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    /// Command succeeded (ping, rebuild, stats)
    Ok = 0x00,
    /// Indicator found; payload is the bincode-encoded record
    Found = 0x01,
    /// Store confirmed the value is unknown
    NotFound = 0x02,
    /// Membership index ruled the value out
    Filtered = 0x03,
    /// Command failed; payload is the error message
    Error = 0x04,
}

impl Status {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Status::Ok),
            0x01 => Some(Status::Found),
            0x02 => Some(Status::NotFound),
            0x03 => Some(Status::Filtered),
            0x04 => Some(Status::Error),
            _ => None,
        }
    }
}

/// A response to send to client
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Status code
    pub status: Status,

    /// Optional payload (record for FOUND, message for ERROR, body for OK)
    pub payload: Option<Vec<u8>>,
}

impl Response {
    /// Create an OK response with optional payload
    pub fn ok(payload: Option<Vec<u8>>) -> Self {
        Self {
            status: Status::Ok,
            payload,
        }
    }

    /// Create a FOUND response carrying `record`
    pub fn found(record: &IndicatorRecord) -> Result<Self> {
        Ok(Self {
            status: Status::Found,
            payload: Some(bincode::serialize(record)?),
        })
    }

    /// Create a NOT_FOUND response
    pub fn not_found() -> Self {
        Self {
            status: Status::NotFound,
            payload: None,
        }
    }

    /// Create a FILTERED response
    pub fn filtered() -> Self {
        Self {
            status: Status::Filtered,
            payload: None,
        }
    }

    /// Create an ERROR response
    pub fn error(message: &str) -> Self {
        Self {
            status: Status::Error,
            payload: Some(message.as_bytes().to_vec()),
        }
    }

    /// Render a lookup outcome
    pub fn from_resolution(resolution: &Resolution) -> Result<Self> {
        match resolution {
            Resolution::Found(record) => Self::found(record),
            Resolution::NotFoundConfirmed => Ok(Self::not_found()),
            Resolution::NotFoundFiltered => Ok(Self::filtered()),
        }
    }

    /// Interpret a lookup reply; ERROR and OK become errors
    pub fn into_resolution(self) -> Result<Resolution> {
        match self.status {
            Status::Found => {
                let payload = self.payload.unwrap_or_default();
                Ok(Resolution::Found(bincode::deserialize(&payload)?))
            }
            Status::NotFound => Ok(Resolution::NotFoundConfirmed),
            Status::Filtered => Ok(Resolution::NotFoundFiltered),
            Status::Error => Err(SieveError::Remote(self.error_message())),
            Status::Ok => Err(SieveError::Protocol(
                "expected a lookup result, got OK".to_string(),
            )),
        }
    }

    /// Payload as UTF-8 text (lossy)
    pub fn error_message(&self) -> String {
        self.payload
            .as_deref()
            .map(|p| String::from_utf8_lossy(p).into_owned())
            .unwrap_or_default()
    }
}
