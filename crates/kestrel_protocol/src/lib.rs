//! Incremental parser for the KestrelDB ingest wire format.
//!
//! The format is ASCII and CRLF-delimited: `:<digits>` is an unsigned
//! integer, `+<number>` a double, `$<len>` followed by `<len>` raw bytes a
//! bulk string. A write record is three consecutive fields in the order
//! `param_id`, `timestamp`, `value`; pipelined records have no framing
//! between them. Input arrives as arbitrary byte fragments (PDUs) and any
//! token may span several of them.

pub mod consumer;
pub mod error;
pub mod parser;

pub use consumer::ProtocolConsumer;
pub use error::WireError;
pub use parser::{Pdu, WireParser, MAX_BULK_SIZE};
