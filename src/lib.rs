//! # RadishKV
//!
//! A minimal Redis-style key-value store with:
//! - RESP wire codec with incremental, size-guarded decoding
//! - Thread-per-connection TCP server over a single locked store
//! - Blocking client connections and a bounded connection pool
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────┐          ┌──────────────────────────────┐
//! │      ConnectionPool      │          │          TCP Server          │
//! │  idle ◄──► leased guards │          │   accept loop, 1 thread per  │
//! └────────────┬─────────────┘          │          connection          │
//!              │                        └──────────────┬───────────────┘
//!   ┌──────────▼──────────┐   RESP frames   ┌──────────▼───────────────┐
//!   │  client::Connection │ ◄─────────────► │   network::Connection    │
//!   └─────────────────────┘                 │ read → decode → dispatch │
//!                                           └──────────┬───────────────┘
//!                                           ┌──────────▼───────────────┐
//!                                           │  Dispatcher (Mutex)      │
//!                                           │  command table → Store   │
//!                                           └──────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod protocol;
pub mod store;
pub mod dispatcher;
pub mod network;
pub mod client;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{RadishError, Result};
pub use config::{ClientConfig, PoolConfig, ServerConfig};
pub use protocol::{Command, Value};
pub use store::Store;
pub use network::Server;
pub use client::{Connection, ConnectionPool, PooledConnection};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of RadishKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
