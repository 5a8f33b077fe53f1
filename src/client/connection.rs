//! Client Connection
//!
//! A single blocking connection to a RadishKV server.

use std::io::{ErrorKind, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Instant;

use bytes::{Buf, Bytes, BytesMut};

use crate::config::ClientConfig;
use crate::error::{RadishError, Result};
use crate::protocol::{self, Command, Decoded, Decoder, Value};

/// Initial reply buffer capacity
const BUFFER_CAPACITY: usize = 4 * 1024;

/// Client side of one TCP connection
///
/// Commands fail with `NotConnected` before `connect` and after `close`
/// (a `QUIT` counts as a close). Any I/O error, timeout or malformed reply
/// marks the connection unhealthy: its position in the reply stream is
/// unknown, so it must be closed rather than reused.
///
/// With `ClientConfig::reconnect` set, a command that fails with
/// `ConnectionFailed` on an established connection is retried once on a
/// fresh socket. Timeouts are never retried.
#[derive(Debug)]
pub struct Connection {
    config: ClientConfig,
    decoder: Decoder,
    stream: Option<TcpStream>,
    buffer: BytesMut,
    broken: bool,
}

impl Connection {
    /// Create an unconnected connection
    pub fn new(config: ClientConfig) -> Self {
        Self {
            decoder: Decoder::new(config.max_frame_size),
            config,
            stream: None,
            buffer: BytesMut::with_capacity(BUFFER_CAPACITY),
            broken: false,
        }
    }

    /// Create and connect
    pub fn open(config: ClientConfig) -> Result<Self> {
        let mut connection = Self::new(config);
        connection.connect()?;
        Ok(connection)
    }

    /// Establish the socket; no-op when already connected
    pub fn connect(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        self.config.validate()?;

        let addr = self.config.addr();
        let candidates = addr
            .to_socket_addrs()
            .map_err(|e| RadishError::ConnectionFailed(format!("cannot resolve {}: {}", addr, e)))?;

        let mut last_error = None;
        let mut connected = None;
        for candidate in candidates {
            match TcpStream::connect_timeout(&candidate, self.config.connect_timeout) {
                Ok(stream) => {
                    connected = Some(stream);
                    break;
                }
                Err(e) => last_error = Some(e),
            }
        }

        let stream = connected.ok_or_else(|| {
            let reason = last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no addresses resolved".to_string());
            RadishError::ConnectionFailed(format!("cannot connect to {}: {}", addr, reason))
        })?;

        stream.set_nodelay(true)?;
        stream.set_read_timeout(self.config.read_timeout)?;
        stream.set_write_timeout(self.config.write_timeout)?;

        self.stream = Some(stream);
        self.buffer.clear();
        self.broken = false;
        tracing::debug!("Connected to {}", addr);
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Connected and no failure observed since
    pub fn is_healthy(&self) -> bool {
        self.stream.is_some() && !self.broken
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Close the socket. Safe to call any number of times.
    pub fn close(&mut self) {
        let Some(stream) = self.stream.as_mut() else {
            return;
        };

        if !self.broken {
            let quit = protocol::encode(&Command::new("QUIT").to_value());
            let _ = stream.write_all(&quit);
        }
        self.teardown();
        tracing::debug!("Connection to {} closed", self.config.addr());
    }

    /// Drop the socket without telling the server
    fn teardown(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        self.buffer.clear();
        self.broken = false;
    }

    /// Whether the socket is still usable without sending anything
    ///
    /// Fails when the peer has closed its end, or when unsolicited bytes
    /// are waiting (the reply stream would be out of step).
    pub fn is_alive(&self) -> bool {
        if self.broken || !self.buffer.is_empty() {
            return false;
        }
        let Some(stream) = self.stream.as_ref() else {
            return false;
        };

        if stream.set_nonblocking(true).is_err() {
            return false;
        }
        let mut peeked = [0u8; 1];
        let alive = matches!(
            stream.peek(&mut peeked),
            Err(ref e) if e.kind() == ErrorKind::WouldBlock
        );
        stream.set_nonblocking(false).is_ok() && alive
    }

    /// Second handle to the socket so the owner can force it shut
    pub(crate) fn socket_handle(&self) -> Option<TcpStream> {
        self.stream.as_ref().and_then(|s| s.try_clone().ok())
    }

    // =========================================================================
    // Raw command execution
    // =========================================================================

    /// Send one command and wait for its reply
    ///
    /// Server `-ERR` replies are returned as `Value::Error`.
    pub fn send(&mut self, command: &Command) -> Result<Value> {
        let frame = protocol::encode(&command.to_value());
        let reply = self.with_reconnect(|conn| {
            conn.write_frames(&frame)?;
            conn.read_reply()
        })?;

        if command.is("QUIT") {
            self.after_quit();
        }
        Ok(reply)
    }

    /// Write every command, then read the replies in send order
    pub fn pipeline(&mut self, commands: &[Command]) -> Result<Vec<Value>> {
        let mut frames = Vec::new();
        for command in commands {
            protocol::encode_into(&command.to_value(), &mut frames);
        }
        let replies = self.with_reconnect(|conn| {
            conn.write_frames(&frames)?;
            commands.iter().map(|_| conn.read_reply()).collect::<Result<Vec<_>>>()
        })?;

        if commands.iter().any(|command| command.is("QUIT")) {
            self.after_quit();
        }
        Ok(replies)
    }

    /// The server closes its end after `QUIT`; do the same here
    fn after_quit(&mut self) {
        self.teardown();
        tracing::debug!("Connection to {} closed by QUIT", self.config.addr());
    }

    /// Run `op`; on a connection failure and with `reconnect` enabled,
    /// reconnect once and run it again
    fn with_reconnect<T>(&mut self, mut op: impl FnMut(&mut Self) -> Result<T>) -> Result<T> {
        if self.stream.is_none() {
            return Err(RadishError::NotConnected);
        }

        match op(self) {
            Err(RadishError::ConnectionFailed(reason)) if self.config.reconnect => {
                tracing::info!(
                    "Reconnecting to {} after failure: {}",
                    self.config.addr(),
                    reason
                );
                self.teardown();
                self.connect()?;
                op(self)
            }
            result => result,
        }
    }

    fn write_frames(&mut self, frames: &[u8]) -> Result<()> {
        if self.broken {
            return Err(RadishError::ConnectionFailed(
                "connection is unusable after an earlier failure".to_string(),
            ));
        }
        let stream = self.stream.as_mut().ok_or(RadishError::NotConnected)?;

        match stream.write_all(frames) {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fail(e.into())),
        }
    }

    /// Read exactly one reply frame, within the read timeout overall
    fn read_reply(&mut self) -> Result<Value> {
        // A timeout too large to represent is the same as none
        let deadline = self
            .config
            .read_timeout
            .and_then(|t| Instant::now().checked_add(t));

        loop {
            match self.decoder.decode(&self.buffer) {
                Ok(Decoded::Complete(value, consumed)) => {
                    self.buffer.advance(consumed);
                    return Ok(value);
                }
                Ok(Decoded::Incomplete) => {}
                Err(e) => return Err(self.fail(e)),
            }

            if let Some(deadline) = deadline {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Err(self.fail(RadishError::Timeout));
                }
                let stream = self.stream.as_ref().ok_or(RadishError::NotConnected)?;
                if let Err(e) = stream.set_read_timeout(Some(remaining)) {
                    return Err(self.fail(e.into()));
                }
            }

            let stream = self.stream.as_mut().ok_or(RadishError::NotConnected)?;
            let filled = protocol::fill_buffer(stream, &mut self.buffer);
            match filled {
                Ok(true) => {}
                Ok(false) => {
                    return Err(self.fail(RadishError::ConnectionFailed(
                        "server closed the connection".to_string(),
                    )))
                }
                Err(e) => return Err(self.fail(e)),
            }
        }
    }

    /// Mark the connection unusable and normalize the error
    fn fail(&mut self, e: RadishError) -> RadishError {
        self.broken = true;
        let e = match e {
            RadishError::Io(io_err)
                if matches!(io_err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
            {
                RadishError::Timeout
            }
            RadishError::Io(io_err) => RadishError::ConnectionFailed(io_err.to_string()),
            other => other,
        };
        tracing::debug!("Connection to {} failed: {}", self.config.addr(), e);
        e
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// `QUIT`: the server replies `+OK` and closes; so does this side
    pub fn quit(&mut self) -> Result<()> {
        match self.send(&Command::new("QUIT"))? {
            Value::Simple(_) => Ok(()),
            other => unexpected("QUIT", other),
        }
    }

    /// `PING` → "PONG"
    pub fn ping(&mut self) -> Result<String> {
        match self.send(&Command::new("PING"))? {
            Value::Simple(text) => Ok(text),
            other => unexpected("PING", other),
        }
    }

    pub fn echo(&mut self, message: impl AsRef<[u8]>) -> Result<Bytes> {
        let reply = self.send(&Command::new("ECHO").arg(message))?;
        expect_bulk("ECHO", reply)
    }

    /// `None` when the key is missing
    pub fn get(&mut self, key: impl AsRef<[u8]>) -> Result<Option<Bytes>> {
        let reply = self.send(&Command::new("GET").arg(key))?;
        expect_optional_bulk("GET", reply)
    }

    /// `true` once stored
    pub fn set(&mut self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Result<bool> {
        let reply = self.send(&Command::new("SET").arg(key).arg(value))?;
        Ok(expect_integer("SET", reply)? == 1)
    }

    /// Number of keys removed (0 or 1)
    pub fn delete(&mut self, key: impl AsRef<[u8]>) -> Result<i64> {
        let reply = self.send(&Command::new("DELETE").arg(key))?;
        expect_integer("DELETE", reply)
    }

    /// 1 if the key exists, else 0
    pub fn exists(&mut self, key: impl AsRef<[u8]>) -> Result<i64> {
        let reply = self.send(&Command::new("EXISTS").arg(key))?;
        expect_integer("EXISTS", reply)
    }

    /// How many of `keys` exist
    pub fn exists_many<I, K>(&mut self, keys: I) -> Result<i64>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<[u8]>,
    {
        let reply = self.send(&Command::new("EXISTS").args(keys))?;
        expect_integer("EXISTS", reply)
    }

    /// Store every pair in one indivisible step
    pub fn mset<K, V>(&mut self, pairs: &[(K, V)]) -> Result<()>
    where
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        if pairs.is_empty() {
            return Err(RadishError::Command(
                "MSET needs at least one key/value pair".to_string(),
            ));
        }

        let mut command = Command::new("MSET");
        for (key, value) in pairs {
            command = command.arg(key).arg(value);
        }
        match self.send(&command)? {
            Value::Simple(_) => Ok(()),
            other => unexpected("MSET", other),
        }
    }

    /// Values in the same order as `keys`
    pub fn mget<I, K>(&mut self, keys: I) -> Result<Vec<Option<Bytes>>>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<[u8]>,
    {
        match self.send(&Command::new("MGET").args(keys))? {
            Value::Array(items) => items
                .into_iter()
                .map(|item| expect_optional_bulk("MGET", item))
                .collect(),
            other => unexpected("MGET", other),
        }
    }

    /// Remove everything; returns how many entries were dropped
    pub fn flush(&mut self) -> Result<i64> {
        let reply = self.send(&Command::new("FLUSH"))?;
        expect_integer("FLUSH", reply)
    }

    /// Length of the stored value, 0 when missing
    pub fn strlen(&mut self, key: impl AsRef<[u8]>) -> Result<i64> {
        let reply = self.send(&Command::new("STRLEN").arg(key))?;
        expect_integer("STRLEN", reply)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

// =============================================================================
// Reply conversion
// =============================================================================

fn unexpected<T>(verb: &str, reply: Value) -> Result<T> {
    match reply {
        Value::Error(message) => Err(RadishError::Server(message)),
        other => Err(RadishError::UnexpectedReply(format!(
            "{} replied with {}",
            verb,
            other.kind()
        ))),
    }
}

fn expect_integer(verb: &str, reply: Value) -> Result<i64> {
    match reply {
        Value::Integer(n) => Ok(n),
        other => unexpected(verb, other),
    }
}

fn expect_bulk(verb: &str, reply: Value) -> Result<Bytes> {
    match reply {
        Value::Bulk(data) => Ok(data),
        other => unexpected(verb, other),
    }
}

fn expect_optional_bulk(verb: &str, reply: Value) -> Result<Option<Bytes>> {
    match reply {
        Value::Bulk(data) => Ok(Some(data)),
        Value::Null => Ok(None),
        other => unexpected(verb, other),
    }
}
