//! Cursor — the sink capability through which merge and search output
//! leaves the core.
//!
//! The producer pushes `(payload, page)` pairs with `put`, reports failures
//! with `set_error`, and signals the end of a batch with `complete`. A
//! consumer abandons a cursor by making `put` return [`CursorGone`]; the
//! producer stops emitting on the next item.

use std::sync::mpsc::{Receiver, SyncSender};

use kestrel_common::{PageId, Payload, SequencerError};

/// The consumer behind the cursor is gone; stop emitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorGone;

/// Sink capability for merge and search output.
pub trait Cursor {
    /// Emit one payload together with the page it belongs to. May block for
    /// backpressure. Returns `Err(CursorGone)` once the consumer has
    /// abandoned the cursor.
    fn put(&mut self, payload: Payload, page: PageId) -> Result<(), CursorGone>;

    /// Report a terminal error for this batch.
    fn set_error(&mut self, error: SequencerError);

    /// Signal successful completion of the batch.
    fn complete(&mut self);
}

// ── In-memory cursor ─────────────────────────────────────────────────────

/// Cursor that collects everything in memory. Used by tests and by the
/// flush driver when the downstream page sink is local.
#[derive(Debug, Default)]
pub struct CollectingCursor {
    pub items: Vec<(Payload, PageId)>,
    pub error: Option<SequencerError>,
    pub completed: bool,
}

impl CollectingCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Payloads only, in emission order.
    pub fn payloads(&self) -> Vec<Payload> {
        self.items.iter().map(|(p, _)| *p).collect()
    }
}

impl Cursor for CollectingCursor {
    fn put(&mut self, payload: Payload, page: PageId) -> Result<(), CursorGone> {
        self.items.push((payload, page));
        Ok(())
    }

    fn set_error(&mut self, error: SequencerError) {
        self.error = Some(error);
    }

    fn complete(&mut self) {
        self.completed = true;
    }
}

// ── Channel cursor ───────────────────────────────────────────────────────

/// Event stream seen by the consumer side of a [`ChannelCursor`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CursorEvent {
    Item { payload: Payload, page: PageId },
    Error(SequencerError),
    Complete,
}

/// Cursor backed by a bounded channel. `put` blocks when the channel is
/// full, giving the consumer backpressure over the producer; a dropped
/// receiver surfaces as [`CursorGone`].
pub struct ChannelCursor {
    tx: SyncSender<CursorEvent>,
}

impl ChannelCursor {
    /// Create a cursor/receiver pair with the given channel depth.
    pub fn bounded(depth: usize) -> (ChannelCursor, Receiver<CursorEvent>) {
        let (tx, rx) = std::sync::mpsc::sync_channel(depth);
        (ChannelCursor { tx }, rx)
    }
}

impl Cursor for ChannelCursor {
    fn put(&mut self, payload: Payload, page: PageId) -> Result<(), CursorGone> {
        self.tx
            .send(CursorEvent::Item { payload, page })
            .map_err(|_| CursorGone)
    }

    fn set_error(&mut self, error: SequencerError) {
        let _ = self.tx.send(CursorEvent::Error(error));
    }

    fn complete(&mut self) {
        let _ = self.tx.send(CursorEvent::Complete);
    }
}
