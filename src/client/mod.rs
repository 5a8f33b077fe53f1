//! Client Module
//!
//! Blocking client connections and a bounded connection pool.
//!
//! ```no_run
//! use radishkv::client::ConnectionPool;
//! use radishkv::config::PoolConfig;
//!
//! let pool = ConnectionPool::new(PoolConfig::builder().port(7272).size(4).build())?;
//! let mut conn = pool.acquire()?;
//! conn.set("greeting", "hello")?;
//! assert_eq!(conn.get("greeting")?.as_deref(), Some(&b"hello"[..]));
//! # Ok::<(), radishkv::RadishError>(())
//! ```

mod connection;
mod pool;

pub use connection::Connection;
pub use pool::{ConnectionPool, PooledConnection};
