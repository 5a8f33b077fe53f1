//! Connection Handler
//!
//! Handles individual client connections on the server side.

use std::io::{BufWriter, ErrorKind, Write};
use std::net::TcpStream;
use std::sync::Arc;

use bytes::{Buf, BytesMut};

use crate::config::ServerConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{RadishError, Result};
use crate::protocol::{self, Decoded, Decoder, Value};

/// Initial read buffer capacity
const BUFFER_CAPACITY: usize = 4 * 1024;

/// Handles a single client connection
pub struct Connection {
    /// TCP stream used for reads
    stream: TcpStream,

    /// TCP stream writer (buffered, flushed before every blocking read)
    writer: BufWriter<TcpStream>,

    /// Bytes received but not yet decoded
    buffer: BytesMut,

    decoder: Decoder,

    /// Command router owning the store
    dispatcher: Arc<Dispatcher>,

    /// Peer address for logging
    peer_addr: String,
}

impl Connection {
    /// Create a new connection handler
    ///
    /// Sets up buffered writes and configures timeouts
    pub fn new(stream: TcpStream, dispatcher: Arc<Dispatcher>, config: &ServerConfig) -> Result<Self> {
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;
        stream.set_read_timeout(config.idle_timeout)?;
        stream.set_write_timeout(config.write_timeout)?;

        let write_stream = stream.try_clone()?;

        Ok(Self {
            stream,
            writer: BufWriter::new(write_stream),
            buffer: BytesMut::with_capacity(BUFFER_CAPACITY),
            decoder: Decoder::new(config.max_frame_size),
            dispatcher,
            peer_addr,
        })
    }

    /// Handle the connection (blocking until closed)
    ///
    /// Decodes every complete frame already buffered, dispatches it and
    /// queues the reply; replies are flushed before blocking for more bytes.
    /// Returns when the client disconnects, sends `QUIT`, idles out, or
    /// sends a malformed frame.
    pub fn handle(&mut self) -> Result<()> {
        tracing::debug!("Connection established from {}", self.peer_addr);

        loop {
            let frame = match self.decoder.decode(&self.buffer) {
                Ok(Decoded::Complete(frame, consumed)) => {
                    self.buffer.advance(consumed);
                    frame
                }
                Ok(Decoded::Incomplete) => {
                    if let Err(e) = self.writer.flush() {
                        return self.on_write_error(e.into());
                    }
                    match self.fill_buffer() {
                        Ok(true) => continue,
                        Ok(false) => return Ok(()),
                        Err(e) => return self.on_read_error(e),
                    }
                }
                Err(e) => {
                    tracing::warn!("Protocol error from {}: {}", self.peer_addr, e);
                    // Best effort: the stream is out of sync, the reply may not arrive
                    let _ = self.send(&Value::error(e.to_string()));
                    let _ = self.writer.flush();
                    return Err(e);
                }
            };

            tracing::trace!("Received frame from {}: {:?}", self.peer_addr, frame);

            let reply = self.dispatcher.dispatch(frame);

            if let Err(e) = self.send(&reply.value) {
                return self.on_write_error(e);
            }

            if reply.close {
                tracing::debug!("Client {} sent QUIT", self.peer_addr);
                if let Err(e) = self.writer.flush() {
                    return self.on_write_error(e.into());
                }
                return Ok(());
            }
        }
    }

    /// Read more bytes; `Ok(false)` means the peer closed cleanly
    fn fill_buffer(&mut self) -> Result<bool> {
        if protocol::fill_buffer(&mut self.stream, &mut self.buffer)? {
            return Ok(true);
        }

        if self.buffer.is_empty() {
            tracing::debug!("Client {} disconnected", self.peer_addr);
            Ok(false)
        } else {
            Err(std::io::Error::new(
                ErrorKind::ConnectionReset,
                "connection closed in the middle of a frame",
            )
            .into())
        }
    }

    fn on_read_error(&self, e: RadishError) -> Result<()> {
        if let RadishError::Io(ref io_err) = e {
            match io_err.kind() {
                ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted => {
                    tracing::debug!("Connection reset by client {}: {}", self.peer_addr, e);
                    return Ok(());
                }
                // Read timeout (Windows uses TimedOut instead of WouldBlock)
                ErrorKind::WouldBlock | ErrorKind::TimedOut => {
                    tracing::debug!("Idle timeout for client {}", self.peer_addr);
                    return Ok(());
                }
                _ => {}
            }
        }
        tracing::warn!("Error reading from {}: {}", self.peer_addr, e);
        Err(e)
    }

    /// If the client disconnected before we could send the reply, exit
    /// quietly rather than treating it as a server error.
    fn on_write_error(&self, e: RadishError) -> Result<()> {
        if let RadishError::Io(ref io_err) = e {
            match io_err.kind() {
                ErrorKind::ConnectionAborted | ErrorKind::ConnectionReset | ErrorKind::BrokenPipe => {
                    tracing::debug!(
                        "Client {} disconnected before reply could be sent: {}",
                        self.peer_addr,
                        e
                    );
                    return Ok(());
                }
                _ => {}
            }
        }
        tracing::warn!("Error writing to {}: {}", self.peer_addr, e);
        Err(e)
    }

    /// Queue a reply (written on the next flush)
    fn send(&mut self, value: &Value) -> Result<()> {
        protocol::write_value(&mut self.writer, value)
    }

    /// Get the peer address string
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }
}
