//! Error taxonomy of the sequencer.
//!
//! Runtime conditions a caller can act on are error variants; invariant
//! violations (zero window size at construction, a non-empty ready set at
//! checkpoint entry) are bugs and terminate via `assert!`/`panic!` instead.

use thiserror::Error;

/// Error classification for retry decisions.
///
/// - `Input`     — the write itself is bad (too old); drop it, the stream may continue
/// - `Transient` — checkpoint in flight; retry once the pending merge completes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Input,
    Transient,
}

/// Errors surfaced by the sequencer's public operations.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerError {
    /// The value lags the ingestion front by more than the window tolerates.
    #[error("late write: value lags the ingestion front by {delta} (window {window})")]
    LateWrite { delta: u64, window: u64 },

    /// A checkpoint is staged and its merge has not completed yet.
    #[error("checkpoint in flight: retry after the pending merge completes")]
    Busy,

    /// `merge` was driven with nothing staged in the ready set.
    #[error("nothing staged for merge")]
    NoData,
}

impl SequencerError {
    /// Classify this error for retry decisions.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SequencerError::LateWrite { .. } => ErrorKind::Input,
            SequencerError::Busy => ErrorKind::Transient,
            SequencerError::NoData => ErrorKind::Input,
        }
    }

    /// Returns true if the caller should retry the operation after the
    /// in-flight merge completes.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transient)
    }
}
