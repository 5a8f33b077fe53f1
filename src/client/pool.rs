//! Connection Pool
//!
//! Bounded set of client connections handed out as scoped leases.
//!
//! ## Lifecycle
//! ```text
//!   open ──► idle ──acquire──► leased ──release (healthy)──► idle
//!              │                  │
//!           expired          release (failed) / pool closed
//!              ▼                  ▼
//!            closed            closed
//! ```
//!
//! ## Invariants
//! - `outstanding <= max_size` and `idle + outstanding <= max_size`
//! - a leased connection is moved out of the pool, so it can never be
//!   handed to two callers
//! - unhealthy connections are closed on release, never re-offered

use std::collections::HashMap;
use std::net::{Shutdown, TcpStream};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::config::PoolConfig;
use crate::error::{RadishError, Result};

use super::Connection;

/// Pool of connections to one server
///
/// Share it between threads with `Arc<ConnectionPool>`; dropping the pool
/// closes it.
pub struct ConnectionPool {
    shared: Arc<Shared>,
}

struct Shared {
    config: PoolConfig,
    state: Mutex<PoolState>,
    /// Signalled once per release, or for everyone on close
    available: Condvar,
    next_id: AtomicU64,
}

struct PoolState {
    /// Most recently released last (reused first)
    idle: Vec<IdleConnection>,

    /// Leased connections plus slots reserved for connections being opened
    outstanding: usize,

    /// Socket handles of leased connections, for forced teardown
    leased: HashMap<u64, TcpStream>,

    closed: bool,
}

struct IdleConnection {
    id: u64,
    connection: Connection,
    since: Instant,
}

impl ConnectionPool {
    /// Create a pool and eagerly open `min_size` connections
    pub fn new(config: PoolConfig) -> Result<Self> {
        config.validate()?;

        let mut idle = Vec::with_capacity(config.max_size);
        for _ in 0..config.min_size {
            // On failure the already-opened connections are dropped (closed)
            let connection = Connection::open(config.client.clone())?;
            idle.push(connection);
        }

        let shared = Arc::new(Shared {
            state: Mutex::new(PoolState {
                idle: Vec::with_capacity(config.max_size),
                outstanding: 0,
                leased: HashMap::new(),
                closed: false,
            }),
            available: Condvar::new(),
            next_id: AtomicU64::new(1),
            config,
        });

        {
            let now = Instant::now();
            let mut state = shared.state.lock();
            for connection in idle {
                let id = shared.next_id.fetch_add(1, Ordering::Relaxed);
                state.idle.push(IdleConnection {
                    id,
                    connection,
                    since: now,
                });
            }
        }

        tracing::debug!(
            "Connection pool to {} ready ({} idle, max {})",
            shared.config.client.addr(),
            shared.config.min_size,
            shared.config.max_size
        );
        Ok(Self { shared })
    }

    /// Lease a connection
    ///
    /// Reuses an idle connection, opens a new one while below `max_size`,
    /// or blocks until one is released. Fails with `PoolExhausted` after
    /// `acquire_timeout`. Idle connections whose peer has hung up are
    /// closed here instead of being handed out.
    pub fn acquire(&self) -> Result<PooledConnection> {
        let shared = &self.shared;
        // Too far out to represent: wait without a deadline
        let deadline = Instant::now().checked_add(shared.config.acquire_timeout);
        let mut state = shared.state.lock();

        loop {
            if state.closed {
                return Err(RadishError::PoolClosed);
            }

            let expired = shared.take_expired(&mut state);
            if !expired.is_empty() {
                MutexGuard::unlocked(&mut state, || close_all(expired));
                continue;
            }

            if let Some(mut idle) = state.idle.pop() {
                // Counted while checked outside the lock so the bound holds
                state.outstanding += 1;
                let alive = MutexGuard::unlocked(&mut state, || idle.connection.is_alive());

                if !alive || state.closed {
                    state.outstanding -= 1;
                    MutexGuard::unlocked(&mut state, || idle.connection.close());
                    shared.available.notify_one();
                    if alive {
                        return Err(RadishError::PoolClosed);
                    }
                    tracing::debug!("Idle connection {} was closed by the server", idle.id);
                    continue;
                }

                if let Some(handle) = idle.connection.socket_handle() {
                    state.leased.insert(idle.id, handle);
                }
                drop(state);
                tracing::trace!("Leased idle connection {}", idle.id);
                return Ok(PooledConnection::new(idle.id, idle.connection, shared));
            }

            if state.outstanding + state.idle.len() < shared.config.max_size {
                // Reserve the slot, then connect without holding the lock
                state.outstanding += 1;
                drop(state);
                return self.open_reserved();
            }

            match deadline {
                Some(deadline) if Instant::now() >= deadline => {
                    tracing::debug!(
                        "Pool exhausted: {} connections leased, waited {:?}",
                        state.outstanding,
                        shared.config.acquire_timeout
                    );
                    return Err(RadishError::PoolExhausted);
                }
                Some(deadline) => {
                    shared.available.wait_until(&mut state, deadline);
                }
                None => shared.available.wait(&mut state),
            }
        }
    }

    /// Open a connection into a slot already counted in `outstanding`
    fn open_reserved(&self) -> Result<PooledConnection> {
        let shared = &self.shared;

        match Connection::open(shared.config.client.clone()) {
            Ok(connection) => {
                let id = shared.next_id.fetch_add(1, Ordering::Relaxed);
                let handle = connection.socket_handle();
                let mut state = shared.state.lock();
                if let Some(handle) = handle {
                    state.leased.insert(id, handle);
                }
                drop(state);
                tracing::debug!("Opened pooled connection {}", id);
                Ok(PooledConnection::new(id, connection, shared))
            }
            Err(e) => {
                shared.state.lock().outstanding -= 1;
                // The freed slot may let a waiter try again
                shared.available.notify_one();
                tracing::warn!("Failed to open pooled connection: {}", e);
                Err(match e {
                    RadishError::Io(io_err) => RadishError::ConnectionFailed(io_err.to_string()),
                    other => other,
                })
            }
        }
    }

    /// Return a lease to the pool (same as dropping it)
    pub fn release(&self, connection: PooledConnection) {
        connection.release();
    }

    /// Close idle connections and refuse further acquires
    ///
    /// Leases still outstanding are a usage error: their sockets are shut
    /// down and they are closed when their guards are dropped.
    pub fn close(&self) {
        let (idle, leased, outstanding) = {
            let mut state = self.shared.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            (
                std::mem::take(&mut state.idle),
                std::mem::take(&mut state.leased),
                state.outstanding,
            )
        };
        self.shared.available.notify_all();

        if outstanding > 0 {
            tracing::warn!(
                "Closing pool with {} connections still leased; forcing them shut",
                outstanding
            );
            for stream in leased.values() {
                let _ = stream.shutdown(Shutdown::Both);
            }
        }

        close_all(idle);
        tracing::debug!("Connection pool to {} closed", self.shared.config.client.addr());
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    /// Connections waiting in the pool
    pub fn idle_count(&self) -> usize {
        self.shared.state.lock().idle.len()
    }

    /// Connections currently leased (or being opened for a lease)
    pub fn outstanding(&self) -> usize {
        self.shared.state.lock().outstanding
    }

    /// Idle plus outstanding; never exceeds `max_size`
    pub fn live_count(&self) -> usize {
        let state = self.shared.state.lock();
        state.idle.len() + state.outstanding
    }

    pub fn max_size(&self) -> usize {
        self.shared.config.max_size
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }
}

impl Drop for ConnectionPool {
    fn drop(&mut self) {
        self.close();
    }
}

impl Shared {
    /// Pull out idle connections past `idle_timeout`
    fn take_expired(&self, state: &mut PoolState) -> Vec<IdleConnection> {
        let Some(timeout) = self.config.idle_timeout else {
            return Vec::new();
        };

        let now = Instant::now();
        let (expired, fresh): (Vec<_>, Vec<_>) = std::mem::take(&mut state.idle)
            .into_iter()
            .partition(|idle| now.duration_since(idle.since) >= timeout);
        state.idle = fresh;

        if !expired.is_empty() {
            tracing::debug!("Closing {} expired idle connections", expired.len());
        }
        expired
    }

    /// Take a connection back from a lease
    fn give_back(&self, id: u64, mut connection: Connection) {
        let mut state = self.state.lock();
        state.leased.remove(&id);
        state.outstanding -= 1;

        if !state.closed && connection.is_healthy() {
            state.idle.push(IdleConnection {
                id,
                connection,
                since: Instant::now(),
            });
            drop(state);
            self.available.notify_one();
            tracing::trace!("Connection {} returned to pool", id);
        } else {
            let closed = state.closed;
            drop(state);
            // A slot was freed either way; one waiter may open a replacement
            self.available.notify_one();
            connection.close();
            if closed {
                tracing::debug!("Connection {} closed on release: pool is closed", id);
            } else {
                tracing::debug!("Connection {} discarded after failure", id);
            }
        }
    }
}

fn close_all(connections: Vec<IdleConnection>) {
    for mut idle in connections {
        idle.connection.close();
    }
}

// =============================================================================
// Lease guard
// =============================================================================

/// A leased connection
///
/// Dereferences to `Connection`. Goes back to the pool exactly once: on
/// `release`, `discard` or drop, whichever comes first.
pub struct PooledConnection {
    id: u64,
    connection: Option<Connection>,
    shared: Arc<Shared>,
}

impl PooledConnection {
    fn new(id: u64, connection: Connection, shared: &Arc<Shared>) -> Self {
        Self {
            id,
            connection: Some(connection),
            shared: Arc::clone(shared),
        }
    }

    /// Pool-assigned identifier, stable for the connection's lifetime
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Return the connection to the pool now
    pub fn release(self) {
        drop(self);
    }

    /// Close the connection instead of returning it; frees its slot
    pub fn discard(mut self) {
        if let Some(connection) = self.connection.as_mut() {
            connection.close();
        }
    }
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.connection
            .as_ref()
            .expect("pooled connection is present until the guard is dropped")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        self.connection
            .as_mut()
            .expect("pooled connection is present until the guard is dropped")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            self.shared.give_back(self.id, connection);
        }
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("connection", &self.connection)
            .finish()
    }
}
