//! TCP Server
//!
//! Accepts connections and hands each one to its own thread.

use std::collections::HashMap;
use std::io::{ErrorKind, Write};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::sync::WaitGroup;
use parking_lot::Mutex;

use crate::config::ServerConfig;
use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::protocol::{self, Value};
use crate::store::Store;

use super::Connection;

/// Back-off after an accept error such as EMFILE
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(20);

/// Bound on the connect `shutdown` makes to wake the accept loop
const WAKE_TIMEOUT: Duration = Duration::from_secs(1);

/// TCP server for RadishKV
///
/// ## Concurrency:
/// - Accept loop runs on the thread that calls `run`, blocked in `accept`;
///   `shutdown` wakes it with a throwaway loopback connection
/// - One thread per client connection, blocking I/O
/// - `dispatcher`: single store mutex, one operation at a time
/// - `connections`: socket handles kept so `shutdown` can unblock readers
pub struct Server {
    config: ServerConfig,
    listener: TcpListener,
    local_addr: SocketAddr,
    dispatcher: Arc<Dispatcher>,
    shutdown: AtomicBool,
    next_connection_id: AtomicU64,
    connections: Arc<Mutex<HashMap<u64, TcpStream>>>,
}

impl Server {
    /// Bind a server with an empty store
    pub fn bind(config: ServerConfig) -> Result<Self> {
        Self::with_store(config, Store::new())
    }

    /// Bind a server that serves a pre-populated store
    pub fn with_store(config: ServerConfig, store: Store) -> Result<Self> {
        config.validate()?;

        let listener = TcpListener::bind(config.listen_addr())?;
        let local_addr = listener.local_addr()?;

        Ok(Self {
            config,
            listener,
            local_addr,
            dispatcher: Arc::new(Dispatcher::new(store)),
            shutdown: AtomicBool::new(false),
            next_connection_id: AtomicU64::new(1),
            connections: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Store access for embedding and tests
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Number of connections currently being served
    pub fn active_connections(&self) -> usize {
        self.connections.lock().len()
    }

    /// Start the server (blocking)
    ///
    /// Returns after `shutdown` once every connection thread has exited.
    pub fn run(&self) -> Result<()> {
        tracing::info!("Serving RadishKV on {}", self.local_addr);

        let workers = WaitGroup::new();

        while !self.shutdown.load(Ordering::Acquire) {
            match self.listener.accept() {
                // The wake-up connection from `shutdown` lands here too
                Ok(_) if self.shutdown.load(Ordering::Acquire) => break,
                Ok((stream, peer)) => self.accept(stream, peer, workers.clone()),
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    // Per-connection failures (e.g. EMFILE) must not stop the server
                    tracing::error!("Accept failed: {}", e);
                    thread::sleep(ACCEPT_ERROR_BACKOFF);
                }
            }
        }

        tracing::info!("Accept loop stopped, closing {} connections", self.active_connections());
        for stream in self.connections.lock().values() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        workers.wait();

        tracing::info!("Server on {} stopped", self.local_addr);
        Ok(())
    }

    /// Signal the server to shutdown gracefully
    ///
    /// Unblocks a pending `accept` by connecting to the listener.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Err(e) = TcpStream::connect_timeout(&self.wake_addr(), WAKE_TIMEOUT) {
            tracing::warn!("Could not wake accept loop on {}: {}", self.local_addr, e);
        }
    }

    /// Listener address reachable from this host
    fn wake_addr(&self) -> SocketAddr {
        let ip = match self.local_addr.ip() {
            IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
            IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
            ip => ip,
        };
        SocketAddr::new(ip, self.local_addr.port())
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    fn accept(&self, stream: TcpStream, peer: SocketAddr, worker: WaitGroup) {
        let id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        let handle = match stream.try_clone() {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!("Dropping connection from {}: {}", peer, e);
                return;
            }
        };

        {
            let mut connections = self.connections.lock();
            if connections.len() >= self.config.max_connections {
                drop(connections);
                tracing::warn!(
                    "Rejecting connection from {}: limit of {} reached",
                    peer,
                    self.config.max_connections
                );
                reject(stream);
                return;
            }
            connections.insert(id, handle);
            tracing::info!("New connection: {} | Total: {} connections", peer, connections.len());
        }

        let dispatcher = Arc::clone(&self.dispatcher);
        let connections = Arc::clone(&self.connections);
        let config = self.config.clone();

        let spawned = thread::Builder::new()
            .name(format!("radishkv-conn-{}", id))
            .spawn(move || {
                match Connection::new(stream, dispatcher, &config) {
                    Ok(mut connection) => {
                        if let Err(e) = connection.handle() {
                            tracing::debug!("Connection {} closed with error: {}", peer, e);
                        }
                    }
                    Err(e) => tracing::warn!("Failed to set up connection from {}: {}", peer, e),
                }

                let remaining = {
                    let mut connections = connections.lock();
                    connections.remove(&id);
                    connections.len()
                };
                tracing::info!("Connection finished: {} | Total: {} connections", peer, remaining);
                drop(worker);
            });

        if let Err(e) = spawned {
            tracing::error!("Failed to spawn handler thread for {}: {}", peer, e);
            if let Some(stream) = self.connections.lock().remove(&id) {
                let _ = stream.shutdown(Shutdown::Both);
            }
        }
    }
}

/// Tell an over-limit client why it is being dropped
fn reject(mut stream: TcpStream) {
    let reply = protocol::encode(&Value::error("max number of clients reached"));
    let _ = stream.write_all(&reply);
    let _ = stream.shutdown(Shutdown::Both);
}
