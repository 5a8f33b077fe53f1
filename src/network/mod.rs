//! Network Module
//!
//! TCP server and per-connection handling.
//!
//! ## Architecture
//! - Single acceptor loop (non-blocking listener, polls the shutdown flag)
//! - One thread per client connection
//! - Commands routed through the Dispatcher

mod server;
mod connection;

pub use server::Server;
pub use connection::Connection;
