//! Connection Handler
//!
//! Handles individual client connections.

use std::io::{BufReader, BufWriter, ErrorKind};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Result, SieveError};
use crate::filter::RebuildOutcome;
use crate::protocol::{read_command, write_response, Command, Response};
use crate::resolver::Resolver;
use crate::store::Store;

/// Handles a single client connection
pub struct Connection<S: Store> {
    /// TCP stream reader (buffered for efficiency)
    reader: BufReader<TcpStream>,

    /// TCP stream writer (buffered for efficiency)
    writer: BufWriter<TcpStream>,

    /// Shared lookup dispatcher
    resolver: Arc<Resolver<S>>,

    /// Peer address for logging
    peer_addr: String,
}

/// Errors that mean the peer went away rather than something broke
fn is_disconnect(e: &SieveError) -> bool {
    match e {
        SieveError::Io(io) => matches!(
            io.kind(),
            ErrorKind::UnexpectedEof
                | ErrorKind::ConnectionReset
                | ErrorKind::ConnectionAborted
                | ErrorKind::BrokenPipe
                // Read timeout (Windows reports TimedOut instead of WouldBlock)
                | ErrorKind::WouldBlock
                | ErrorKind::TimedOut
        ),
        _ => false,
    }
}

impl<S: Store> Connection<S> {
    /// Create a new connection handler
    pub fn new(stream: TcpStream, resolver: Arc<Resolver<S>>) -> Result<Self> {
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;

        let read_stream = stream.try_clone()?;

        Ok(Self {
            reader: BufReader::new(read_stream),
            writer: BufWriter::new(stream),
            resolver,
            peer_addr,
        })
    }

    /// Configure connection timeouts (0 = none)
    pub fn set_timeouts(&mut self, read_ms: u64, write_ms: u64) -> Result<()> {
        if read_ms > 0 {
            self.reader
                .get_ref()
                .set_read_timeout(Some(Duration::from_millis(read_ms)))?;
        }
        if write_ms > 0 {
            self.writer
                .get_ref()
                .set_write_timeout(Some(Duration::from_millis(write_ms)))?;
        }
        Ok(())
    }

    /// Handle the connection (blocking until closed)
    ///
    /// Reads commands in a loop and sends responses.
    /// Returns when the client disconnects or an error occurs.
    pub fn handle(&mut self) -> Result<()> {
        tracing::debug!("Connection established from {}", self.peer_addr);

        loop {
            let command = match read_command(&mut self.reader) {
                Ok(cmd) => cmd,
                Err(e) if is_disconnect(&e) => {
                    tracing::debug!("Client {} disconnected: {}", self.peer_addr, e);
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!("Error reading from {}: {}", self.peer_addr, e);
                    let _ = self.send_response(Response::error(&e.to_string()));
                    return Err(e);
                }
            };

            tracing::trace!("Received command from {}: {:?}", self.peer_addr, command);

            let response = self.execute_command(command);

            if let Err(e) = self.send_response(response) {
                if is_disconnect(&e) {
                    tracing::debug!(
                        "Client {} disconnected before response could be sent: {}",
                        self.peer_addr,
                        e
                    );
                    return Ok(());
                }
                tracing::warn!("Error writing to {}: {}", self.peer_addr, e);
                return Err(e);
            }
        }
    }

    /// Execute a command and return a response
    ///
    /// Failures become ERROR responses; they are never reported as NOT_FOUND.
    fn execute_command(&self, command: Command) -> Response {
        let result = match command {
            Command::Resolve { mode, key } => self
                .resolver
                .resolve(mode, &key)
                .and_then(|resolution| Response::from_resolution(&resolution)),
            Command::Rebuild {
                expected_count,
                false_positive_rate,
            } => self
                .resolver
                .rebuild_index(expected_count, false_positive_rate)
                .and_then(|outcome: RebuildOutcome| Ok(Response::ok(Some(bincode::serialize(&outcome)?)))),
            Command::Ping => Ok(Response::ok(Some(b"PONG".to_vec()))),
            Command::Stats => bincode::serialize(&self.resolver.stats())
                .map(|body| Response::ok(Some(body)))
                .map_err(SieveError::from),
        };

        result.unwrap_or_else(|e| Response::error(&e.to_string()))
    }

    /// Send a response to the client
    fn send_response(&mut self, response: Response) -> Result<()> {
        write_response(&mut self.writer, &response)
    }

    /// Get the peer address string
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }
}
