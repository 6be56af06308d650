//! Error types for the wire parser.
//!
//! Every variant is fatal for the parser instance: after the first error the
//! connection is expected to be dropped and the parser discarded.

use thiserror::Error;

/// Errors that can occur while parsing the ingest wire format.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("unexpected type byte 0x{0:02x} at start of field")]
    UnexpectedTypeByte(u8),

    #[error("malformed integer field")]
    BadInteger,

    #[error("malformed float field")]
    BadFloat,

    #[error("malformed bulk length")]
    BadBulkLength,

    #[error("expected CRLF terminator")]
    MissingCrlf,

    #[error("bulk string of {size} bytes exceeds the {max} byte limit")]
    BulkOverflow { size: usize, max: usize },

    #[error("unexpected {got} field: expected {expected}")]
    UnexpectedField {
        expected: &'static str,
        got: &'static str,
    },

    #[error("stream ended mid-record")]
    TruncatedInput,

    #[error("parser already failed; discard this instance")]
    Poisoned,
}

impl WireError {
    /// Whether the error reflects truncation (an incomplete stream at
    /// close) rather than malformed bytes.
    pub fn is_truncation(&self) -> bool {
        matches!(self, WireError::TruncatedInput)
    }
}
