//! Network Module
//!
//! TCP transport in front of the resolver.
//!
//! ## Architecture
//! - Single acceptor thread with a shutdown flag
//! - One handler thread per connection, capped at `max_connections`
//! - Commands routed through the Resolver

mod client;
mod connection;
mod server;

pub use client::Client;
pub use connection::Connection;
pub use server::Server;
