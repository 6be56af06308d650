//! Server and sequencer configuration, loaded from TOML.

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KestrelConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub sequencer: SequencerConfig,
}

impl Default for KestrelConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            sequencer: SequencerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Ingest listen address.
    pub listen_addr: String,
    /// Max concurrent ingest connections (0 = unlimited).
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Socket read buffer size in bytes; each read becomes one PDU.
    #[serde(default = "default_read_buffer_bytes")]
    pub read_buffer_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8282".into(),
            max_connections: default_max_connections(),
            read_buffer_bytes: default_read_buffer_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequencerConfig {
    /// Out-of-order tolerance window, in timestamp units. Must be > 0.
    pub window_size: u64,
    /// Identifier of the downstream page merged batches are emitted to.
    #[serde(default)]
    pub page_id: u64,
    /// Depth of the bounded queue between connection tasks and the ingest
    /// thread; full queue means backpressure on the sockets.
    #[serde(default = "default_ingest_queue_depth")]
    pub ingest_queue_depth: usize,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            window_size: 10_000,
            page_id: 0,
            ingest_queue_depth: default_ingest_queue_depth(),
        }
    }
}

fn default_max_connections() -> usize {
    1024
}

fn default_read_buffer_bytes() -> usize {
    64 * 1024
}

fn default_ingest_queue_depth() -> usize {
    4096
}
