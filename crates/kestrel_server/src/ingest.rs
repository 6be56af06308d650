//! The ingest pipeline.
//!
//! Ingest is single-writer by design: one dedicated thread owns the
//! [`IngestWriter`] capability, pulls records off a bounded channel fed by
//! the connection tasks, and drives every staged checkpoint through `merge`
//! before accepting further boundary crossings.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use tokio::sync::mpsc;

use kestrel_common::{PageId, Payload, SequencerError, TsValue};
use kestrel_core::{Cursor, CursorGone, IngestWriter, Sequencer};

/// Accepted records between two throughput log lines.
const THROUGHPUT_LOG_EVERY: u64 = 1_000_000;

/// One wire record bound for the sequencer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WriteRecord {
    pub param: u64,
    pub timestamp: u64,
    pub value: f64,
}

/// Counters reported by the ingest thread when it drains.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub accepted: u64,
    pub late_rejected: u64,
    pub busy_dropped: u64,
    pub flushed: u64,
}

/// Sink standing in for the downstream page writer: counts each flushed
/// batch and logs it. The page format itself lives below the ingest core.
#[derive(Debug, Default)]
struct PageFlushCursor {
    batch: u64,
}

impl Cursor for PageFlushCursor {
    fn put(&mut self, _payload: Payload, _page: PageId) -> Result<(), CursorGone> {
        self.batch += 1;
        Ok(())
    }

    fn set_error(&mut self, error: SequencerError) {
        match error {
            // A window crossing with nothing below the old top.
            SequencerError::NoData => tracing::debug!("checkpoint staged no data"),
            other => tracing::warn!(error = %other, "checkpoint flush failed"),
        }
    }

    fn complete(&mut self) {
        tracing::info!(points = self.batch, "checkpoint batch flushed");
    }
}

/// The running ingest pipeline: sequencer handle, record feed, worker thread.
pub struct IngestPipeline {
    sequencer: Arc<Sequencer>,
    tx: mpsc::Sender<WriteRecord>,
    worker: JoinHandle<IngestStats>,
}

impl IngestPipeline {
    /// Spawn the ingest thread for a fresh sequencer.
    pub fn start(page: PageId, window_size: u64, queue_depth: usize) -> Self {
        let (sequencer, writer) = Sequencer::create(page, window_size);
        let (tx, rx) = mpsc::channel(queue_depth.max(1));
        let worker = std::thread::Builder::new()
            .name("kestrel-ingest".into())
            .spawn(move || run_writer(writer, rx))
            .expect("failed to spawn the ingest thread");
        Self {
            sequencer,
            tx,
            worker,
        }
    }

    /// Shared sequencer handle, e.g. for searches.
    pub fn sequencer(&self) -> &Arc<Sequencer> {
        &self.sequencer
    }

    /// A sender for feeding records into the pipeline.
    pub fn sender(&self) -> mpsc::Sender<WriteRecord> {
        self.tx.clone()
    }

    /// Stop accepting records, drain the sequencer and return the final
    /// counters.
    pub fn shutdown(self) -> IngestStats {
        drop(self.tx);
        self.worker.join().expect("ingest thread panicked")
    }
}

fn run_writer(mut writer: IngestWriter, mut rx: mpsc::Receiver<WriteRecord>) -> IngestStats {
    let mut stats = IngestStats::default();
    let mut window_start = Instant::now();

    while let Some(record) = rx.blocking_recv() {
        let value = TsValue::with_value(record.timestamp, record.param, record.value);
        match writer.add(value) {
            Ok(None) => stats.accepted += 1,
            Ok(Some(token)) => {
                stats.accepted += 1;
                let mut sink = PageFlushCursor::default();
                token.merge(&mut sink);
                stats.flushed += sink.batch;
            }
            Err(error) if error.is_retryable() => {
                // A concurrent search held the progress flag at the crossing.
                // The front has advanced and the point is dropped.
                stats.busy_dropped += 1;
                tracing::warn!(
                    timestamp = record.timestamp,
                    "boundary crossing refused while busy; point dropped"
                );
            }
            Err(error) => {
                stats.late_rejected += 1;
                tracing::debug!(
                    timestamp = record.timestamp,
                    error = %error,
                    "write rejected"
                );
            }
        }

        if stats.accepted > 0 && stats.accepted % THROUGHPUT_LOG_EVERY == 0 {
            let elapsed = window_start.elapsed().as_secs_f64();
            if elapsed > 0.0 {
                tracing::info!(
                    throughput = (THROUGHPUT_LOG_EVERY as f64 / elapsed) as u64,
                    "ingest throughput (records/sec)"
                );
            }
            window_start = Instant::now();
        }
    }

    // Feed closed: drain everything still buffered.
    match writer.close() {
        Some(token) => {
            let mut sink = PageFlushCursor::default();
            token.merge(&mut sink);
            stats.flushed += sink.batch;
        }
        None => tracing::warn!("close skipped: a checkpoint was still in flight"),
    }
    tracing::info!(
        accepted = stats.accepted,
        late_rejected = stats.late_rejected,
        busy_dropped = stats.busy_dropped,
        flushed = stats.flushed,
        "ingest pipeline drained"
    );
    stats
}
