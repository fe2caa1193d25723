//! Station telemetry ingestion server.
//!
//! Stations connect over TCP (optionally TLS), send one JSON reading either
//! bare or inside an HTTP POST, and get back an acknowledgment framed the
//! same way. The latest reading per station is kept in a shared
//! [`StationRegistry`] and announced on a [`Feed`] for viewers.
//!
//! ```text
//! Server (accept loop) ─spawn─> conn::handle
//!                                 ├─ protocol::framing / decode
//!                                 ├─ ServerState::store ──> StationRegistry, Feed
//!                                 ├─ advisory::feedback
//!                                 └─ response::encode ──> socket
//! ```
//!
//! Concurrency is bounded by `ServerConfig::max_connections`. Past that,
//! clients wait in the listen backlog.

pub mod advisory;
pub mod config;
pub mod conn;
pub mod error;
pub mod feed;
pub mod protocol;
pub mod reading;
pub mod response;
pub mod server;
pub mod state;
pub mod tls;

pub use config::{Cli, ServerConfig};
pub use error::{DecodeError, ServerError};
pub use feed::{Feed, StationUpdate};
pub use protocol::Framing;
pub use reading::{Location, Measure, Reading};
pub use server::Server;
pub use state::{ServerState, StationRegistry};
pub use tls::TlsConfig;
