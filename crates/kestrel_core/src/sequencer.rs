//! The sequencer — windowed, multi-run in-memory buffer.
//!
//! Ingested points land in a set of sorted runs. The largest accepted
//! timestamp is the ingestion front; writes older than the front by more
//! than the window are rejected. When a write crosses a window boundary the
//! sequencer stages a checkpoint: every run is split around the old window
//! top and the below-top parts move to the ready set, which the caller then
//! drives through `merge` into the downstream page.
//!
//! Concurrency model: exactly one writer (the [`IngestWriter`] capability),
//! any number of searching readers. The ready set lives inside the progress
//! mutex, so "ready is non-empty only while a checkpoint is in progress" is
//! structural rather than a convention. Run contents are guarded by the
//! striped lock table; the run-set container sits in an `RwLock` to satisfy
//! aliasing for the vector itself.

use std::sync::atomic::{fence, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex, RwLock};

use kestrel_common::{
    PageId, ParamId, SequencerError, SeriesKey, Timestamp, TsValue, MAX_PARAM_ID,
};

use crate::cursor::Cursor;
use crate::merge::{merge_runs, Direction};
use crate::run::SortedRun;
use crate::run_lock::RunLockTable;

// ── Search queries ───────────────────────────────────────────────────────

/// Parameter predicate of a search.
#[derive(Debug, Clone)]
pub enum ParamFilter {
    /// Every parameter matches.
    All,
    /// Only the given parameter matches.
    Exact(ParamId),
    /// Any of the given parameters match.
    AnyOf(Vec<ParamId>),
}

impl ParamFilter {
    pub fn matches(&self, param: ParamId) -> bool {
        match self {
            ParamFilter::All => true,
            ParamFilter::Exact(p) => *p == param,
            ParamFilter::AnyOf(set) => set.contains(&param),
        }
    }
}

/// A range-and-predicate query against the in-memory portion.
///
/// Timestamp bounds are exclusive on **both** ends: a point matches iff
/// `lowerbound < ts < upperbound`. This preserves the historical behavior
/// of the ingest core; callers expecting half-open `[lower, upper)` ranges
/// must widen the lower bound themselves.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub lowerbound: Timestamp,
    pub upperbound: Timestamp,
    pub direction: Direction,
    pub param_filter: ParamFilter,
}

impl SearchQuery {
    /// Forward query over `(lowerbound, upperbound)` matching every param.
    pub fn range(lowerbound: Timestamp, upperbound: Timestamp) -> Self {
        Self {
            lowerbound,
            upperbound,
            direction: Direction::Forward,
            param_filter: ParamFilter::All,
        }
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_param_filter(mut self, param_filter: ParamFilter) -> Self {
        self.param_filter = param_filter;
        self
    }

    fn matches(&self, value: &TsValue) -> bool {
        self.lowerbound < value.timestamp()
            && value.timestamp() < self.upperbound
            && self.param_filter.matches(value.param())
    }
}

// ── Checkpoint token ─────────────────────────────────────────────────────

/// Proof that the holder owns the in-flight checkpoint.
///
/// Produced by `add` when a window crossing stages a checkpoint, and by
/// `close`. The token owns the progress lock; the staged batch is flushed by
/// handing the token to [`CheckpointToken::merge`]. Dropping the token
/// without merging releases the lock; if runs were staged they are discarded
/// with an error log, because the ready set must be empty whenever the
/// progress lock is free.
#[must_use = "a staged checkpoint must be driven through merge"]
pub struct CheckpointToken {
    ready: ArcMutexGuard<RawMutex, Vec<SortedRun>>,
    page: PageId,
    merged: bool,
}

impl CheckpointToken {
    /// Number of runs staged for flush.
    pub fn staged_run_count(&self) -> usize {
        self.ready.len()
    }

    /// Flush the staged runs: k-way merge forward into `cursor`, then clear
    /// the ready set and release the progress lock.
    ///
    /// Signals `NoData` through the cursor when nothing is staged (a window
    /// crossing with every run already above the old top). If the consumer
    /// abandons the cursor mid-merge the staged batch is still dropped:
    /// releasing the progress lock with a non-empty ready set would break
    /// the sequencer invariant.
    pub fn merge(mut self, cursor: &mut dyn Cursor) {
        self.merged = true;
        if self.ready.is_empty() {
            cursor.set_error(SequencerError::NoData);
            return;
        }
        let result = merge_runs(Direction::Forward, &self.ready, self.page, cursor);
        self.ready.clear();
        fence(Ordering::AcqRel);
        match result {
            Ok(()) => cursor.complete(),
            Err(_) => {
                tracing::warn!("merge consumer abandoned the cursor; staged batch dropped")
            }
        }
    }
}

impl Drop for CheckpointToken {
    fn drop(&mut self) {
        if !self.merged && !self.ready.is_empty() {
            tracing::error!(
                staged_runs = self.ready.len(),
                "checkpoint token dropped without merge; staged batch discarded"
            );
            self.ready.clear();
        }
    }
}

// ── Sequencer ────────────────────────────────────────────────────────────

/// Windowed in-memory ordering buffer bound to a downstream page.
pub struct Sequencer {
    window_size: u64,
    page: PageId,
    /// Largest accepted timestamp (the ingestion front).
    top_timestamp: AtomicU64,
    /// Current checkpoint id, `⌊top / window_size⌋`-monotone.
    checkpoint: AtomicU64,
    /// Active runs, ordered by descending last key (so the lower-bound
    /// insertion search picks the tightest-fitting run).
    runs: RwLock<Vec<SortedRun>>,
    /// Stripe locks over run contents.
    locks: RunLockTable,
    /// The progress flag. Held while a checkpoint is staged or a search is
    /// running; the ready set it protects is non-empty only between a
    /// checkpoint transition and the matching merge.
    progress: Arc<Mutex<Vec<SortedRun>>>,
}

impl Sequencer {
    /// Create a sequencer bound to `page` with the given window, returning
    /// the shared handle plus the unique ingest capability.
    ///
    /// Panics if `window_size` is zero — that is a construction bug, not a
    /// runtime condition.
    pub fn create(page: PageId, window_size: u64) -> (Arc<Sequencer>, IngestWriter) {
        assert!(window_size > 0, "window size must be greater than zero");
        let sequencer = Arc::new(Sequencer {
            window_size,
            page,
            top_timestamp: AtomicU64::new(0),
            checkpoint: AtomicU64::new(0),
            runs: RwLock::new(Vec::new()),
            locks: RunLockTable::new(),
            progress: Arc::new(Mutex::new(Vec::new())),
        });
        let writer = IngestWriter {
            shared: sequencer.clone(),
        };
        (sequencer, writer)
    }

    pub fn page(&self) -> PageId {
        self.page
    }

    pub fn window_size(&self) -> u64 {
        self.window_size
    }

    /// Largest timestamp accepted so far.
    pub fn top_timestamp(&self) -> Timestamp {
        self.top_timestamp.load(Ordering::Relaxed)
    }

    /// Current checkpoint id.
    pub fn checkpoint_id(&self) -> u64 {
        self.checkpoint.load(Ordering::Relaxed)
    }

    pub fn active_run_count(&self) -> usize {
        self.runs.read().len()
    }

    /// Answer a range-and-predicate query over the active runs.
    ///
    /// Blocks on the progress lock, so a search never observes a staged
    /// checkpoint: the snapshot excludes any in-flight flush. Each run is
    /// filtered under its stripe lock into a fresh sorted run, and the
    /// filtered runs are merged in the query direction into `cursor`, which
    /// is completed at the end.
    pub fn search(&self, query: &SearchQuery, cursor: &mut dyn Cursor) {
        let ready = self.progress.lock();
        assert!(
            ready.is_empty(),
            "sequencer invariant broken: ready set not drained"
        );

        let filtered = {
            let runs = self.runs.read();
            let mut filtered = Vec::with_capacity(runs.len());
            for (ix, run) in runs.iter().enumerate() {
                self.locks.lock(ix);
                let matching: SortedRun = run.iter().filter(|v| query.matches(v)).copied().collect();
                self.locks.unlock(ix);
                if !matching.is_empty() {
                    filtered.push(matching);
                }
            }
            filtered
        };

        if merge_runs(query.direction, &filtered, self.page, cursor).is_ok() {
            cursor.complete();
        }
        drop(ready);
    }

    /// Insert an admitted point into the run set: append to the run whose
    /// last key is the largest one still <= the incoming key, or start a new
    /// run when every run is ahead of it.
    fn insert(&self, value: TsValue) {
        let key = value.key;
        let mut runs = self.runs.write();
        let ix = runs.partition_point(|r| r.last_key().map_or(false, |last| last > key));
        if ix == runs.len() {
            runs.push(SortedRun::with_value(value));
        } else {
            self.locks.lock(ix);
            runs[ix].push(value);
            self.locks.unlock(ix);
        }
    }

    /// The checkpoint transition. Runs under the progress lock with every
    /// stripe held: splits each run around the old window top, stages the
    /// below-top parts in `ready`, and installs the trimmed run set.
    fn make_checkpoint(&self, new_checkpoint: u64, ready: &mut Vec<SortedRun>) {
        self.locks.lock_all();
        let old_top = self.checkpoint.load(Ordering::Relaxed) * self.window_size;
        self.checkpoint.store(new_checkpoint, Ordering::Relaxed);
        assert!(
            ready.is_empty(),
            "sequencer invariant broken: ready set not drained"
        );

        let boundary = SeriesKey::new(old_top, MAX_PARAM_ID);
        let mut runs = self.runs.write();
        let mut kept = Vec::with_capacity(runs.len());
        for mut run in runs.drain(..) {
            let pos = run.lower_bound(boundary);
            if pos == 0 {
                // Entirely inside the new window.
                kept.push(run);
            } else if pos == run.len() {
                // Entirely below the old top.
                ready.push(run);
            } else {
                let tail = run.split_off(pos);
                ready.push(run);
                kept.push(tail);
            }
        }
        *runs = kept;
        drop(runs);

        self.locks.unlock_all();
        fence(Ordering::AcqRel);
        tracing::debug!(
            checkpoint = new_checkpoint,
            staged_runs = ready.len(),
            "checkpoint staged"
        );
    }
}

// ── Ingest writer ────────────────────────────────────────────────────────

/// The unique write capability of a sequencer.
///
/// Exactly one exists per sequencer and it is not `Clone`, so concurrent
/// writers cannot be expressed; the run-selection search inside `add` relies
/// on that exclusivity.
pub struct IngestWriter {
    shared: Arc<Sequencer>,
}

impl IngestWriter {
    /// Shared handle, e.g. for wiring searches elsewhere.
    pub fn sequencer(&self) -> &Arc<Sequencer> {
        &self.shared
    }

    /// Admit one point.
    ///
    /// - `Err(LateWrite)` — the point lags the ingestion front by more than
    ///   the window; it is dropped and the stream may continue.
    /// - `Err(Busy)` — the point crosses a window boundary while a prior
    ///   checkpoint is still staged (or a search holds the progress lock).
    ///   The front still advances; retry after the pending merge completes.
    /// - `Ok(Some(token))` — the point crossed a window boundary and a
    ///   checkpoint was staged; drive `token.merge` to flush it. Adds that
    ///   do not cross another boundary remain valid meanwhile.
    /// - `Ok(None)` — admitted, nothing staged.
    pub fn add(&mut self, value: TsValue) -> Result<Option<CheckpointToken>, SequencerError> {
        let seq = &self.shared;
        let ts = value.timestamp();
        let top = seq.top_timestamp.load(Ordering::Relaxed);

        if ts < top {
            let delta = top - ts;
            if delta > seq.window_size {
                return Err(SequencerError::LateWrite {
                    delta,
                    window: seq.window_size,
                });
            }
            // In-window late write: admitted without advancing the front.
            seq.insert(value);
            return Ok(None);
        }

        let mut token = None;
        let crossing = ts / seq.window_size;
        if crossing > seq.checkpoint.load(Ordering::Relaxed) {
            match seq.progress.try_lock_arc() {
                Some(mut ready) => {
                    seq.make_checkpoint(crossing, &mut ready);
                    token = Some(CheckpointToken {
                        ready,
                        page: seq.page,
                        merged: false,
                    });
                }
                None => {
                    // A prior checkpoint's merge has not completed. The
                    // front still advances; the point is dropped.
                    seq.top_timestamp.store(ts, Ordering::Relaxed);
                    return Err(SequencerError::Busy);
                }
            }
        }

        seq.top_timestamp.store(ts, Ordering::Relaxed);
        seq.insert(value);
        Ok(token)
    }

    /// Terminate ingest: drain every active run into the ready set and
    /// return the token that flushes them. Returns `None` when a checkpoint
    /// is already in flight; the caller must finish that merge first.
    pub fn close(&mut self) -> Option<CheckpointToken> {
        let seq = &self.shared;
        let mut ready = seq.progress.try_lock_arc()?;
        assert!(
            ready.is_empty(),
            "sequencer invariant broken: ready set not drained"
        );

        seq.locks.lock_all();
        {
            let mut runs = seq.runs.write();
            ready.extend(runs.drain(..));
        }
        seq.locks.unlock_all();
        fence(Ordering::AcqRel);

        Some(CheckpointToken {
            ready,
            page: seq.page,
            merged: false,
        })
    }
}
