//! Relay configuration.
//!
//! Every option can be given as a flag or through its `HYPERSPACE_*`
//! environment variable.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Hyperspace relay: encrypted spaces, invitations and real-time updates.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct ServerConfig {
    /// Address to listen on
    #[arg(long, env = "HYPERSPACE_LISTEN", default_value = "127.0.0.1:3030")]
    pub listen: SocketAddr,

    /// Path to the SQLite database. In-memory when absent.
    #[arg(short, long, env = "HYPERSPACE_DATABASE")]
    pub database: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, env = "HYPERSPACE_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Domain that sign-in messages must name
    #[arg(long, env = "HYPERSPACE_SIWE_DOMAIN", default_value = "localhost:3030")]
    pub siwe_domain: String,

    /// Upper bound on session lifetime, in seconds
    #[arg(long, env = "HYPERSPACE_SESSION_MAX_TTL", default_value_t = 30 * 24 * 3600)]
    pub session_max_ttl_secs: u64,

    /// Lifetime of a login nonce, in seconds
    #[arg(long, env = "HYPERSPACE_NONCE_TTL", default_value_t = 600)]
    pub nonce_ttl_secs: u64,

    /// Outbound messages buffered per WebSocket before dropping
    #[arg(long, env = "HYPERSPACE_OUTBOUND_QUEUE", default_value_t = 256)]
    pub outbound_queue: usize,

    /// Allow any origin
    #[arg(long, env = "HYPERSPACE_CORS_PERMISSIVE")]
    pub cors_permissive: bool,

    /// JSON file of identity fixtures to register at startup (development only)
    #[arg(long, env = "HYPERSPACE_DEV_SEED")]
    pub dev_seed: Option<PathBuf>,
}

impl ServerConfig {
    pub fn session_max_ttl(&self) -> Duration {
        Duration::from_secs(self.session_max_ttl_secs)
    }

    pub fn nonce_ttl(&self) -> Duration {
        Duration::from_secs(self.nonce_ttl_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 3030)),
            database: None,
            log_level: "info".to_string(),
            siwe_domain: "localhost:3030".to_string(),
            session_max_ttl_secs: 30 * 24 * 3600,
            nonce_ttl_secs: 600,
            outbound_queue: 256,
            cors_permissive: false,
            dev_seed: None,
        }
    }
}
