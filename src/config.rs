use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::error::ServerError;
use crate::tls::TlsConfig;

pub const DEFAULT_LISTEN: &str = "0.0.0.0:9000";
pub const DEFAULT_MAX_CONNECTIONS: usize = 256;
pub const DEFAULT_READ_BUFFER: usize = 4096;
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 64 * 1024;
pub const DEFAULT_FEED_CAPACITY: usize = 512;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `host:port` to listen on.
    pub listen: String,
    pub tls: Option<TlsConfig>,
    /// Upper bound on connections handled at once. Further clients wait in
    /// the accept backlog.
    pub max_connections: usize,
    /// Size of a single socket read.
    pub read_buffer: usize,
    /// Largest message accepted before answering with an error.
    pub max_message_bytes: usize,
    /// Deadline for each read and for the TLS handshake. `None` waits forever.
    pub read_timeout: Option<Duration>,
    pub feed_capacity: usize,
}

impl ServerConfig {
    pub fn new(listen: impl Into<String>) -> Self {
        Self {
            listen: listen.into(),
            ..Self::default()
        }
    }

    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN.to_string(),
            tls: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            read_buffer: DEFAULT_READ_BUFFER,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            read_timeout: None,
            feed_capacity: DEFAULT_FEED_CAPACITY,
        }
    }
}

/// Command line / environment surface of the server binary.
#[derive(Parser, Debug)]
#[command(version, about = "Ingests station telemetry over TCP or TLS", long_about = None)]
pub struct Cli {
    #[arg(long, env = "TELEMETRY_HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "TELEMETRY_PORT", default_value_t = 9000)]
    pub port: u16,

    /// PEM certificate chain. Enables TLS together with --key.
    #[arg(long, env = "TELEMETRY_TLS_CERT")]
    pub cert: Option<PathBuf>,

    /// PEM private key matching --cert.
    #[arg(long, env = "TELEMETRY_TLS_KEY")]
    pub key: Option<PathBuf>,

    #[arg(long, env = "TELEMETRY_MAX_CONNECTIONS", default_value_t = DEFAULT_MAX_CONNECTIONS)]
    pub max_connections: usize,

    #[arg(long, env = "TELEMETRY_MAX_MESSAGE_BYTES", default_value_t = DEFAULT_MAX_MESSAGE_BYTES)]
    pub max_message_bytes: usize,

    #[arg(long, env = "TELEMETRY_READ_TIMEOUT_SECS")]
    pub read_timeout_secs: Option<u64>,

    /// Log filter, e.g. `info` or `telemetry_ingest=debug`. Falls back to RUST_LOG.
    #[arg(long, env = "TELEMETRY_LOG")]
    pub log: Option<String>,
}

impl Cli {
    pub fn into_config(self) -> Result<ServerConfig, ServerError> {
        let tls = match (self.cert, self.key) {
            (Some(cert), Some(key)) => Some(TlsConfig::new(cert, key)),
            (None, None) => None,
            (Some(_), None) => return Err(ServerError::Config("--cert requires --key".into())),
            (None, Some(_)) => return Err(ServerError::Config("--key requires --cert".into())),
        };

        if self.max_connections == 0 {
            return Err(ServerError::Config("--max-connections must be at least 1".into()));
        }

        Ok(ServerConfig {
            listen: format!("{}:{}", self.host, self.port),
            tls,
            max_connections: self.max_connections,
            max_message_bytes: self.max_message_bytes,
            read_timeout: self.read_timeout_secs.map(Duration::from_secs),
            ..ServerConfig::default()
        })
    }
}
