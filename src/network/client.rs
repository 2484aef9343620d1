//! Blocking client
//!
//! One TCP connection, one request at a time.

use std::io::{BufReader, BufWriter};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::error::{Result, SieveError};
use crate::filter::RebuildOutcome;
use crate::protocol::{read_response, write_command, Command, Response, Status};
use crate::resolver::{LookupMode, Resolution, ResolverStats};

/// Client for a running lookup server
pub struct Client {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
}

impl Client {
    /// Connect to `addr`
    pub fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .map_err(|e| SieveError::Network(format!("connect failed: {}", e)))?;
        stream.set_nodelay(true)?;
        let read_stream = stream.try_clone()?;

        Ok(Self {
            reader: BufReader::new(read_stream),
            writer: BufWriter::new(stream),
        })
    }

    /// Bound how long a single reply may take
    pub fn set_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        self.reader.get_ref().set_read_timeout(timeout)?;
        self.writer.get_ref().set_write_timeout(timeout)?;
        Ok(())
    }

    /// Send one command and wait for its response
    pub fn request(&mut self, command: &Command) -> Result<Response> {
        write_command(&mut self.writer, command)?;
        read_response(&mut self.reader)
    }

    /// Look up `key` using `mode`
    pub fn resolve(&mut self, mode: LookupMode, key: &str) -> Result<Resolution> {
        let command = Command::Resolve {
            mode,
            key: key.to_string(),
        };
        self.request(&command)?.into_resolution()
    }

    /// Ask the server to rebuild its membership index
    pub fn rebuild(&mut self, expected_count: u64, false_positive_rate: f64) -> Result<RebuildOutcome> {
        let response = self.request(&Command::Rebuild {
            expected_count,
            false_positive_rate,
        })?;
        let body = Self::expect_ok(response)?;
        Ok(bincode::deserialize(&body)?)
    }

    /// Fetch resolver counters
    pub fn stats(&mut self) -> Result<ResolverStats> {
        let body = Self::expect_ok(self.request(&Command::Stats)?)?;
        Ok(bincode::deserialize(&body)?)
    }

    /// Health check
    pub fn ping(&mut self) -> Result<()> {
        Self::expect_ok(self.request(&Command::Ping)?).map(|_| ())
    }

    fn expect_ok(response: Response) -> Result<Vec<u8>> {
        match response.status {
            Status::Ok => Ok(response.payload.unwrap_or_default()),
            Status::Error => Err(SieveError::Remote(response.error_message())),
            other => Err(SieveError::Protocol(format!(
                "unexpected response status {:?}",
                other
            ))),
        }
    }
}
