//! In-memory ordering core of KestrelDB.
//!
//! Architecture:
//! ```text
//!   add ──► SortedRun set (windowed, stripe-locked)
//!              │  (window crossing stages a checkpoint)
//!              ▼
//!           ready set ──► k-way merge ──► cursor ──► downstream page
//! ```
//!
//! Key design choices:
//! - Write path: single writer, lower-bound run selection, per-run stripe lock
//! - Checkpoint: non-blocking progress-flag acquisition; Busy on contention
//! - Read path: searches serialize on the progress flag, filter each run
//!   under its stripe, then merge in the requested direction

pub mod cursor;
pub mod merge;
pub mod run;
pub mod run_lock;
pub mod sequencer;

pub use cursor::{ChannelCursor, CollectingCursor, Cursor, CursorEvent, CursorGone};
pub use merge::{merge_runs, Direction};
pub use run::SortedRun;
pub use run_lock::{RunLockTable, RUN_LOCK_MASK, RUN_LOCK_SIZE};
pub use sequencer::{CheckpointToken, IngestWriter, ParamFilter, SearchQuery, Sequencer};
