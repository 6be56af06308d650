//! Direction-parameterized k-way merge over sorted runs.
//!
//! A heap of `(head key, run index)` pairs is seeded with the first element
//! of each run in the requested direction; each pop emits one payload to the
//! cursor and advances that run. O(N log K) for N points across K runs.
//! Ties on equal keys always break toward the lower run index, so output is
//! stable across calls with identical input.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use kestrel_common::{PageId, SeriesKey, TsValue};

use crate::cursor::{Cursor, CursorGone};
use crate::run::SortedRun;

/// Iteration direction of a merge or search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Ascending `(timestamp, param)` order.
    Forward,
    /// Descending `(timestamp, param)` order; each run is consumed
    /// tail-to-head.
    Backward,
}

/// Merge `runs` in `direction`, emitting every payload to `cursor` together
/// with `page`. Stops early if the consumer abandons the cursor.
pub fn merge_runs(
    direction: Direction,
    runs: &[SortedRun],
    page: PageId,
    cursor: &mut dyn Cursor,
) -> Result<(), CursorGone> {
    match direction {
        Direction::Forward => heap_merge(runs, page, cursor, false, forward_key),
        Direction::Backward => heap_merge(runs, page, cursor, true, backward_key),
    }
}

fn forward_key(key: SeriesKey) -> SeriesKey {
    key
}

fn backward_key(key: SeriesKey) -> Reverse<SeriesKey> {
    Reverse(key)
}

/// Element at logical position `logical` of `run` in the chosen direction.
fn head(run: &SortedRun, logical: usize, backward: bool) -> Option<&TsValue> {
    if logical >= run.len() {
        return None;
    }
    let physical = if backward { run.len() - 1 - logical } else { logical };
    run.get(physical)
}

/// The merge loop, shared by both directions. `wrap` maps keys into a
/// direction-specific ordering; the min-heap over `(wrapped key, run index)`
/// then pops the next element of the output sequence, lower run index first
/// on equal keys.
fn heap_merge<K: Ord>(
    runs: &[SortedRun],
    page: PageId,
    cursor: &mut dyn Cursor,
    backward: bool,
    wrap: fn(SeriesKey) -> K,
) -> Result<(), CursorGone> {
    let mut pos = vec![0usize; runs.len()];
    let mut heap: BinaryHeap<Reverse<(K, usize)>> = BinaryHeap::with_capacity(runs.len());

    for (ix, run) in runs.iter().enumerate() {
        if let Some(value) = head(run, 0, backward) {
            heap.push(Reverse((wrap(value.key), ix)));
        }
    }

    while let Some(Reverse((_, ix))) = heap.pop() {
        let value = head(&runs[ix], pos[ix], backward)
            .expect("heap held an entry for an exhausted run");
        cursor.put(value.payload, page)?;
        pos[ix] += 1;
        if let Some(next) = head(&runs[ix], pos[ix], backward) {
            heap.push(Reverse((wrap(next.key), ix)));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::CollectingCursor;
    use kestrel_common::Payload;

    fn run_of(points: &[(u64, u64)]) -> SortedRun {
        points
            .iter()
            .map(|&(ts, param)| TsValue::with_offset(ts, param, ts))
            .collect()
    }

    fn offsets(cursor: &CollectingCursor) -> Vec<u64> {
        cursor
            .payloads()
            .into_iter()
            .map(|p| match p {
                Payload::Offset(o) => o,
                Payload::Value(_) => panic!("expected offset payload"),
            })
            .collect()
    }

    #[test]
    fn test_forward_merge_interleaves() {
        let a = run_of(&[(1, 1), (3, 3)]);
        let b = run_of(&[(2, 2), (4, 4)]);
        let mut cursor = CollectingCursor::new();
        merge_runs(Direction::Forward, &[a, b], PageId(0), &mut cursor).unwrap();
        assert_eq!(offsets(&cursor), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_backward_merge_descends() {
        let a = run_of(&[(1, 1), (3, 3)]);
        let b = run_of(&[(2, 2), (4, 4)]);
        let mut cursor = CollectingCursor::new();
        merge_runs(Direction::Backward, &[a, b], PageId(0), &mut cursor).unwrap();
        assert_eq!(offsets(&cursor), vec![4, 3, 2, 1]);
    }

    #[test]
    fn test_equal_keys_break_toward_lower_run() {
        let a: SortedRun = [TsValue::with_offset(5, 1, 10)].into_iter().collect();
        let b: SortedRun = [TsValue::with_offset(5, 1, 20)].into_iter().collect();
        let mut forward = CollectingCursor::new();
        merge_runs(Direction::Forward, &[a.clone(), b.clone()], PageId(0), &mut forward).unwrap();
        assert_eq!(offsets(&forward), vec![10, 20]);

        let mut backward = CollectingCursor::new();
        merge_runs(Direction::Backward, &[a, b], PageId(0), &mut backward).unwrap();
        assert_eq!(offsets(&backward), vec![10, 20]);
    }

    #[test]
    fn test_empty_runs_are_skipped() {
        let a = SortedRun::new();
        let b = run_of(&[(1, 1)]);
        let mut cursor = CollectingCursor::new();
        merge_runs(Direction::Forward, &[a, b], PageId(0), &mut cursor).unwrap();
        assert_eq!(offsets(&cursor), vec![1]);
    }

    #[test]
    fn test_no_runs_emits_nothing() {
        let mut cursor = CollectingCursor::new();
        merge_runs(Direction::Forward, &[], PageId(0), &mut cursor).unwrap();
        assert!(cursor.items.is_empty());
    }

    #[test]
    fn test_abandoned_cursor_stops_the_merge() {
        struct QuitAfter(usize);
        impl Cursor for QuitAfter {
            fn put(&mut self, _: Payload, _: PageId) -> Result<(), CursorGone> {
                if self.0 == 0 {
                    return Err(CursorGone);
                }
                self.0 -= 1;
                Ok(())
            }
            fn set_error(&mut self, _: kestrel_common::SequencerError) {}
            fn complete(&mut self) {}
        }

        let a = run_of(&[(1, 1), (2, 2), (3, 3)]);
        let mut cursor = QuitAfter(1);
        let result = merge_runs(Direction::Forward, &[a], PageId(0), &mut cursor);
        assert_eq!(result, Err(CursorGone));
    }

    #[test]
    fn test_merge_is_deterministic_across_calls() {
        let runs = vec![run_of(&[(1, 1), (5, 1), (5, 2)]), run_of(&[(5, 1), (9, 1)])];
        let mut first = CollectingCursor::new();
        merge_runs(Direction::Forward, &runs, PageId(0), &mut first).unwrap();
        let mut second = CollectingCursor::new();
        merge_runs(Direction::Forward, &runs, PageId(0), &mut second).unwrap();
        assert_eq!(offsets(&first), offsets(&second));
    }
}
