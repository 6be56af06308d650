//! TCP ingest front-end of KestrelDB.
//!
//! Connections feed the wire parser; completed records cross a bounded
//! channel to the single ingest thread that owns the sequencer's write
//! capability and drives checkpoint flushes.

pub mod ingest;
pub mod server;

pub use ingest::{IngestPipeline, IngestStats, WriteRecord};
pub use server::IngestServer;
