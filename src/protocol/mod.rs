//! Protocol Module
//!
//! Defines the wire protocol between the lookup service and its clients.
//!
//! ## Protocol Format (V1 - Simple Binary)
//!
//! ### Request Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │ Cmd (1)  │ Len (4)  │         Payload             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! ### Commands
//! - 0x01: RESOLVE_DIRECT      - Payload: key
//! - 0x02: RESOLVE_ACCELERATED - Payload: key
//! - 0x03: REBUILD             - Payload: expected_count + false_positive_rate
//! - 0x04: PING                - Payload: empty
//! - 0x05: STATS               - Payload: empty
//!
//! ### Response Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │Status(1) │ Len (4)  │         Payload             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! ### Status Codes
//! - 0x00: OK
//! - 0x01: FOUND
//! - 0x02: NOT_FOUND (store confirmed)
//! - 0x03: FILTERED  (index ruled out, store not asked)
//! - 0x04: ERROR

mod codec;
mod command;
mod response;

pub use codec::{
    decode_command, decode_response, encode_command, encode_response, read_command,
    read_response, write_command, write_response, HEADER_SIZE, MAX_PAYLOAD_SIZE,
};
pub use command::{Command, CommandType};
pub use response::{Response, Status};
