//! The consumer side of the parser: where completed records go.

use kestrel_common::{ParamId, Timestamp};

/// Callbacks invoked by the parser as records complete.
///
/// `write_double` fires once per `(param, timestamp, value)` triple;
/// `add_bulk_string` fires once per completed bulk string. The parser
/// surfaces all errors itself through `parse_next`/`close`, so the
/// callbacks are infallible.
pub trait ProtocolConsumer {
    fn write_double(&mut self, param: ParamId, timestamp: Timestamp, value: f64);

    fn add_bulk_string(&mut self, bytes: &[u8]);
}
