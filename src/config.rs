//! Configuration for RadishKV
//!
//! Centralized configuration with sensible defaults for the server, a single
//! client connection, and the connection pool.

use std::time::Duration;

use crate::error::{RadishError, Result};

/// Default TCP port
pub const DEFAULT_PORT: u16 = 7272;

/// Default maximum frame size (16 MB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

// =============================================================================
// Server Configuration
// =============================================================================

/// Configuration for a RadishKV server instance
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Interface to bind
    pub host: String,

    /// TCP port (0 picks an ephemeral port)
    pub port: u16,

    /// Largest frame the decoder accepts (bytes)
    pub max_frame_size: usize,

    /// Close connections that stay silent this long
    pub idle_timeout: Option<Duration>,

    /// Max concurrent client connections
    pub max_connections: usize,

    /// Reply write timeout
    pub write_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            idle_timeout: None,
            max_connections: 1024,
            write_timeout: Some(Duration::from_secs(5)),
        }
    }
}

impl ServerConfig {
    /// Create a new config builder
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// `host:port` string to bind
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_frame_size == 0 {
            return Err(RadishError::Config("max_frame_size must be > 0".to_string()));
        }
        if self.max_connections == 0 {
            return Err(RadishError::Config("max_connections must be > 0".to_string()));
        }
        check_timeout("idle_timeout", self.idle_timeout)?;
        check_timeout("write_timeout", self.write_timeout)?;
        Ok(())
    }
}

/// Socket timeouts cannot be zero; `None` is how "no timeout" is spelled
fn check_timeout(name: &str, timeout: Option<Duration>) -> Result<()> {
    if timeout == Some(Duration::ZERO) {
        return Err(RadishError::Config(format!(
            "{} must be > 0 (use None to disable it)",
            name
        )));
    }
    Ok(())
}

/// Builder for ServerConfig
#[derive(Default)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    /// Set the bind host
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Set the bind port
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the maximum accepted frame size (in bytes)
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.config.max_frame_size = size;
        self
    }

    /// Set the idle-connection timeout
    pub fn idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    /// Set the maximum number of concurrent connections
    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.max_connections = count;
        self
    }

    /// Set the reply write timeout
    pub fn write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.write_timeout = timeout;
        self
    }

    pub fn build(self) -> ServerConfig {
        self.config
    }
}

// =============================================================================
// Client Configuration
// =============================================================================

/// Configuration for a single client connection
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Socket connect timeout
    pub connect_timeout: Duration,

    /// How long `send` waits for a reply before failing with `Timeout`
    pub read_timeout: Option<Duration>,

    /// Command write timeout
    pub write_timeout: Option<Duration>,

    /// Largest reply frame the decoder accepts (bytes)
    pub max_frame_size: usize,

    /// After a connection failure, reconnect once and retry the command
    pub reconnect: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            connect_timeout: Duration::from_secs(5),
            read_timeout: Some(Duration::from_secs(5)),
            write_timeout: Some(Duration::from_secs(5)),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            reconnect: false,
        }
    }
}

impl ClientConfig {
    /// Create a new config builder
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// `host:port` string to connect to
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_frame_size == 0 {
            return Err(RadishError::Config("max_frame_size must be > 0".to_string()));
        }
        if self.connect_timeout.is_zero() {
            return Err(RadishError::Config("connect_timeout must be > 0".to_string()));
        }
        check_timeout("read_timeout", self.read_timeout)?;
        check_timeout("write_timeout", self.write_timeout)?;
        Ok(())
    }
}

/// Builder for ClientConfig
#[derive(Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Set the server host
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Set the server port
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the reply timeout
    pub fn read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    /// Set the write timeout
    pub fn write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.write_timeout = timeout;
        self
    }

    /// Set the maximum reply frame size (in bytes)
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.config.max_frame_size = size;
        self
    }

    /// Enable one reconnect-and-retry after a connection failure
    pub fn reconnect(mut self, enabled: bool) -> Self {
        self.config.reconnect = enabled;
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}

// =============================================================================
// Pool Configuration
// =============================================================================

/// Configuration for a connection pool
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Settings shared by every connection the pool opens
    pub client: ClientConfig,

    /// Connections opened eagerly on construction
    pub min_size: usize,

    /// Upper bound on live connections (idle + leased)
    pub max_size: usize,

    /// How long `acquire` blocks before failing with `PoolExhausted`
    pub acquire_timeout: Duration,

    /// Idle connections older than this are closed instead of reused
    pub idle_timeout: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            client: ClientConfig::default(),
            min_size: 1,
            max_size: 10,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(300)),
        }
    }
}

impl PoolConfig {
    /// Create a new config builder
    pub fn builder() -> PoolConfigBuilder {
        PoolConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(RadishError::Config("max_size must be > 0".to_string()));
        }
        if self.min_size > self.max_size {
            return Err(RadishError::Config(format!(
                "min_size ({}) must not exceed max_size ({})",
                self.min_size, self.max_size
            )));
        }
        self.client.validate()
    }
}

/// Builder for PoolConfig
#[derive(Default)]
pub struct PoolConfigBuilder {
    config: PoolConfig,
}

impl PoolConfigBuilder {
    /// Set the server host
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.client.host = host.into();
        self
    }

    /// Set the server port
    pub fn port(mut self, port: u16) -> Self {
        self.config.client.port = port;
        self
    }

    /// Replace the per-connection settings (host and port included)
    pub fn client(mut self, client: ClientConfig) -> Self {
        self.config.client = client;
        self
    }

    /// Set the number of eagerly opened connections
    pub fn min_size(mut self, size: usize) -> Self {
        self.config.min_size = size;
        self
    }

    /// Set the maximum number of live connections
    pub fn max_size(mut self, size: usize) -> Self {
        self.config.max_size = size;
        self
    }

    /// Fixed-size pool: min and max are both `size`
    pub fn size(mut self, size: usize) -> Self {
        self.config.min_size = size;
        self.config.max_size = size;
        self
    }

    /// Set the acquire timeout
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.config.acquire_timeout = timeout;
        self
    }

    /// Set the idle-connection expiry
    pub fn idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    pub fn build(self) -> PoolConfig {
        self.config
    }
}
