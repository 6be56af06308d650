//! Core value model of the ingest path.
//!
//! A time-series point is a `(timestamp, param, payload)` triple. Ordering is
//! lexicographic on `(timestamp, param)`; the payload is never part of the
//! key. Points are plain `Copy` data and move by value through the pipeline.

use serde::{Deserialize, Serialize};

/// Timestamp in raw time units. The sequencer window is expressed in the
/// same units, so the core never interprets them as wall-clock time.
pub type Timestamp = u64;

/// Series (parameter) identifier.
pub type ParamId = u64;

/// Largest admissible parameter id. Used as the upper sentinel when a run is
/// split at a checkpoint boundary: every key `(ts, p)` with `ts < boundary`
/// sorts strictly below `(boundary, MAX_PARAM_ID)`.
pub const MAX_PARAM_ID: ParamId = u64::MAX;

/// Opaque identifier of the downstream page that merged batches are emitted
/// to. The page itself belongs to the storage engine below the sequencer;
/// the ingest core only threads the id through to cursors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageId(pub u64);

/// Ordering key of a point: `(timestamp, param)`, compared lexicographically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeriesKey {
    pub timestamp: Timestamp,
    pub param: ParamId,
}

impl SeriesKey {
    pub fn new(timestamp: Timestamp, param: ParamId) -> Self {
        Self { timestamp, param }
    }
}

/// Payload carried alongside the key: either a page-relative offset assigned
/// by the storage layer, or an inline double for values small enough to keep
/// in place.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Payload {
    Offset(u64),
    Value(f64),
}

/// A single ingested point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TsValue {
    pub key: SeriesKey,
    pub payload: Payload,
}

impl TsValue {
    /// Point whose payload is a page-relative entry offset.
    pub fn with_offset(timestamp: Timestamp, param: ParamId, offset: u64) -> Self {
        Self {
            key: SeriesKey::new(timestamp, param),
            payload: Payload::Offset(offset),
        }
    }

    /// Point whose payload is an inline double.
    pub fn with_value(timestamp: Timestamp, param: ParamId, value: f64) -> Self {
        Self {
            key: SeriesKey::new(timestamp, param),
            payload: Payload::Value(value),
        }
    }

    pub fn timestamp(&self) -> Timestamp {
        self.key.timestamp
    }

    pub fn param(&self) -> ParamId {
        self.key.param
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_orders_by_timestamp_then_param() {
        assert!(SeriesKey::new(1, 9) < SeriesKey::new(2, 0));
        assert!(SeriesKey::new(5, 1) < SeriesKey::new(5, 2));
        assert_eq!(SeriesKey::new(3, 3), SeriesKey::new(3, 3));
    }

    #[test]
    fn test_split_sentinel_dominates_same_timestamp() {
        // Any real key at the boundary timestamp sorts below the sentinel
        // unless its param is itself MAX_PARAM_ID.
        let sentinel = SeriesKey::new(10, MAX_PARAM_ID);
        assert!(SeriesKey::new(10, 0) < sentinel);
        assert!(SeriesKey::new(10, MAX_PARAM_ID - 1) < sentinel);
        assert!(SeriesKey::new(11, 0) > sentinel);
    }

    #[test]
    fn test_payload_is_not_part_of_the_key() {
        let a = TsValue::with_value(7, 1, 1.5);
        let b = TsValue::with_offset(7, 1, 999);
        assert_eq!(a.key, b.key);
        assert_ne!(a.payload, b.payload);
    }
}
