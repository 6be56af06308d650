//! Shared types for the KestrelDB ingest core: value model, error
//! taxonomy, and configuration.

pub mod config;
pub mod error;
pub mod types;

pub use config::KestrelConfig;
pub use error::{ErrorKind, SequencerError};
pub use types::{PageId, ParamId, Payload, SeriesKey, Timestamp, TsValue, MAX_PARAM_ID};
