//! Single-slot, latest-wins hand-off between the camera thread and the
//! frame worker

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam::utils::CachePadded;
use parking_lot::{Condvar, Mutex};
use thiserror::Error;
use tracing::debug;

use crate::capture::pool::Recycler;
use crate::capture::RawFrame;

/// Returned by a take once the exchange is closed and empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("frame exchange closed")]
pub struct Closed;

struct Slot {
    pending: Option<RawFrame>,
    closed: bool,
}

#[derive(Default)]
struct Stats {
    published: AtomicU64,
    superseded: AtomicU64,
    taken: AtomicU64,
    drained: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExchangeStats {
    pub published: u64,
    /// Pending frames replaced by a newer one before being taken
    pub superseded: u64,
    pub taken: u64,
    /// Frames recycled by `close` or published after it
    pub drained: u64,
}

/// Holds at most one undelivered frame.
///
/// Publishing over a pending frame hands the older one straight back to the
/// driver, so the consumer always sees the freshest frame and the driver
/// never waits on a backlog.
pub struct LatestFrameExchange {
    slot: Mutex<Slot>,
    ready: Condvar,
    recycler: Recycler,
    stats: CachePadded<Stats>,
}

impl LatestFrameExchange {
    pub fn new(recycler: Recycler) -> Self {
        Self {
            slot: Mutex::new(Slot {
                pending: None,
                closed: false,
            }),
            ready: Condvar::new(),
            recycler,
            stats: CachePadded::new(Stats::default()),
        }
    }

    pub fn recycler(&self) -> &Recycler {
        &self.recycler
    }

    /// Producer side. Never blocks beyond the slot lock.
    pub fn publish(&self, frame: RawFrame) {
        if !self.recycler.pool().claim(&frame) {
            return;
        }

        self.stats.published.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("cardscan_frames_published_total").increment(1);

        let (displaced, closed) = {
            let mut slot = self.slot.lock();
            if slot.closed {
                (Some(frame), true)
            } else {
                let previous = slot.pending.replace(frame);
                self.ready.notify_one();
                (previous, false)
            }
        };

        let Some(displaced) = displaced else {
            return;
        };

        if closed {
            debug!(buffer = %displaced.id(), "Frame published after close, recycling");
            self.stats.drained.fetch_add(1, Ordering::Relaxed);
        } else {
            debug!(buffer = %displaced.id(), sequence = displaced.sequence(), "Superseded pending frame");
            self.stats.superseded.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("cardscan_frames_superseded_total").increment(1);
        }
        self.recycler.recycle(displaced);
    }

    /// Consumer side. Waits for a frame, or for the exchange to close.
    pub fn take_blocking(&self) -> Result<RawFrame, Closed> {
        let mut slot = self.slot.lock();
        loop {
            if let Some(frame) = slot.pending.take() {
                self.stats.taken.fetch_add(1, Ordering::Relaxed);
                return Ok(frame);
            }
            if slot.closed {
                return Err(Closed);
            }
            self.ready.wait(&mut slot);
        }
    }

    pub fn try_take(&self) -> Result<Option<RawFrame>, Closed> {
        let mut slot = self.slot.lock();
        match slot.pending.take() {
            Some(frame) => {
                self.stats.taken.fetch_add(1, Ordering::Relaxed);
                Ok(Some(frame))
            }
            None if slot.closed => Err(Closed),
            None => Ok(None),
        }
    }

    /// Wakes every waiter and recycles any pending frame. Idempotent.
    pub fn close(&self) {
        let drained = {
            let mut slot = self.slot.lock();
            if slot.closed {
                return;
            }
            slot.closed = true;
            self.ready.notify_all();
            slot.pending.take()
        };

        if let Some(frame) = drained {
            debug!(buffer = %frame.id(), "Recycling pending frame on close");
            self.stats.drained.fetch_add(1, Ordering::Relaxed);
            self.recycler.recycle(frame);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.slot.lock().closed
    }

    pub fn has_pending(&self) -> bool {
        self.slot.lock().pending.is_some()
    }

    pub fn stats(&self) -> ExchangeStats {
        ExchangeStats {
            published: self.stats.published.load(Ordering::Relaxed),
            superseded: self.stats.superseded.load(Ordering::Relaxed),
            taken: self.stats.taken.load(Ordering::Relaxed),
            drained: self.stats.drained.load(Ordering::Relaxed),
        }
    }
}
