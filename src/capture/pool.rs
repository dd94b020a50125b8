//! Fixed set of reusable frame buffers shared with the camera driver

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam::utils::CachePadded;
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::driver::BufferSink;
use super::frame::{BufferId, RawFrame};

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Where a pool buffer currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Allocated but not yet handed to the driver
    Idle,
    /// Queued in the driver, waiting to be filled
    Driver,
    /// Delivered by the driver and not yet recycled (pending or processing)
    Pipeline,
}

#[derive(Default)]
struct Counters {
    delivered: AtomicU64,
    recycled: AtomicU64,
    stray: AtomicU64,
}

/// Point-in-time view of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    pub capacity: usize,
    pub idle: usize,
    pub with_driver: usize,
    pub in_pipeline: usize,
    /// Deliveries accepted from the driver
    pub delivered: u64,
    /// Buffers handed back to the driver after a delivery
    pub recycled: u64,
    /// Buffers seen that do not belong to this pool
    pub stray: u64,
}

/// Arena of `count` equally sized buffers addressed by [`BufferId`].
///
/// Membership is fixed at allocation. A frame whose id does not resolve
/// here is never handed back to the driver.
pub struct FrameBufferPool {
    generation: u64,
    frame_bytes: usize,
    slots: Mutex<Vec<SlotState>>,
    idle: Mutex<Vec<RawFrame>>,
    counters: CachePadded<Counters>,
}

impl FrameBufferPool {
    /// Pre-allocates `count` zeroed buffers of `frame_bytes` each.
    pub fn allocate(count: usize, frame_bytes: usize) -> Self {
        let generation = NEXT_GENERATION.fetch_add(1, Ordering::Relaxed);
        let idle = (0..count)
            .map(|index| {
                let id = BufferId {
                    generation,
                    index: index as u32,
                };
                RawFrame::new(id, frame_bytes)
            })
            .collect();

        debug!(generation, count, frame_bytes, "Allocated frame buffer pool");

        Self {
            generation,
            frame_bytes,
            slots: Mutex::new(vec![SlotState::Idle; count]),
            idle: Mutex::new(idle),
            counters: CachePadded::new(Counters::default()),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn capacity(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn frame_bytes(&self) -> usize {
        self.frame_bytes
    }

    /// Takes every idle buffer out of the pool for submission to the driver.
    pub fn prime(&self) -> Vec<RawFrame> {
        let frames: Vec<RawFrame> = std::mem::take(&mut *self.idle.lock());
        let mut slots = self.slots.lock();
        for frame in &frames {
            slots[frame.id().index as usize] = SlotState::Driver;
        }
        frames
    }

    /// Resolves `id` against this pool.
    pub fn lookup(&self, id: BufferId) -> Option<SlotState> {
        if id.generation != self.generation {
            return None;
        }
        self.slots.lock().get(id.index as usize).copied()
    }

    /// Records that the driver delivered `frame`. Returns false for a
    /// buffer that is not ours.
    pub fn claim(&self, frame: &RawFrame) -> bool {
        if !self.transition(frame.id(), SlotState::Pipeline) {
            return false;
        }
        self.counters.delivered.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Validates `frame` for re-submission to the driver.
    ///
    /// Returns the frame back if it belongs to this pool; otherwise the
    /// frame is dropped here.
    pub fn recycle(&self, frame: RawFrame) -> Option<RawFrame> {
        if !self.transition(frame.id(), SlotState::Driver) {
            return None;
        }
        self.counters.recycled.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("cardscan_frames_recycled_total").increment(1);
        Some(frame)
    }

    fn transition(&self, id: BufferId, to: SlotState) -> bool {
        if id.generation == self.generation {
            if let Some(slot) = self.slots.lock().get_mut(id.index as usize) {
                *slot = to;
                return true;
            }
        }

        warn!(buffer = %id, pool = self.generation, "Dropping buffer unknown to pool");
        self.counters.stray.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("cardscan_buffers_stray_total").increment(1);
        false
    }

    pub fn stats(&self) -> PoolStats {
        let slots = self.slots.lock();
        let count = |state: SlotState| slots.iter().filter(|s| **s == state).count();
        PoolStats {
            capacity: slots.len(),
            idle: count(SlotState::Idle),
            with_driver: count(SlotState::Driver),
            in_pipeline: count(SlotState::Pipeline),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            recycled: self.counters.recycled.load(Ordering::Relaxed),
            stray: self.counters.stray.load(Ordering::Relaxed),
        }
    }
}

/// Returns used buffers to the driver through the pool's membership check.
#[derive(Clone)]
pub struct Recycler {
    pool: Arc<FrameBufferPool>,
    sink: Arc<dyn BufferSink>,
}

impl Recycler {
    pub fn new(pool: Arc<FrameBufferPool>, sink: Arc<dyn BufferSink>) -> Self {
        Self { pool, sink }
    }

    pub fn pool(&self) -> &FrameBufferPool {
        &self.pool
    }

    pub fn recycle(&self, frame: RawFrame) {
        if let Some(frame) = self.pool.recycle(frame) {
            self.sink.submit_buffer(frame);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct CollectingSink {
        frames: Mutex<Vec<RawFrame>>,
    }

    impl BufferSink for CollectingSink {
        fn submit_buffer(&self, frame: RawFrame) {
            self.frames.lock().push(frame);
        }
    }

    #[test]
    fn allocate_creates_zeroed_buffers() {
        let pool = FrameBufferPool::allocate(4, 32);
        assert_eq!(pool.capacity(), 4);

        let frames = pool.prime();
        assert_eq!(frames.len(), 4);
        assert!(frames.iter().all(|f| f.len() == 32));
        assert!(frames.iter().all(|f| f.data().iter().all(|b| *b == 0)));

        let stats = pool.stats();
        assert_eq!(stats.with_driver, 4);
        assert_eq!(stats.idle, 0);
    }

    #[test]
    fn prime_twice_hands_out_nothing_new() {
        let pool = FrameBufferPool::allocate(2, 8);
        assert_eq!(pool.prime().len(), 2);
        assert!(pool.prime().is_empty());
    }

    #[test]
    fn lookup_rejects_other_generations() {
        let old = FrameBufferPool::allocate(2, 8);
        let current = FrameBufferPool::allocate(2, 8);
        let frame = old.prime().pop().unwrap();

        assert_eq!(old.lookup(frame.id()), Some(SlotState::Driver));
        assert_eq!(current.lookup(frame.id()), None);
    }

    #[test]
    fn stray_buffer_is_dropped_not_resubmitted() {
        let old = FrameBufferPool::allocate(1, 8);
        let current = Arc::new(FrameBufferPool::allocate(1, 8));
        let sink = Arc::new(CollectingSink::default());
        let recycler = Recycler::new(current.clone(), sink.clone());

        recycler.recycle(old.prime().pop().unwrap());

        assert!(sink.frames.lock().is_empty());
        assert_eq!(current.stats().stray, 1);
        assert_eq!(current.stats().recycled, 0);
    }

    #[test]
    fn claim_and_recycle_track_slot_state() {
        let pool = Arc::new(FrameBufferPool::allocate(2, 8));
        let sink = Arc::new(CollectingSink::default());
        let recycler = Recycler::new(pool.clone(), sink.clone());

        let frame = pool.prime().pop().unwrap();
        let id = frame.id();
        assert!(pool.claim(&frame));
        assert_eq!(pool.lookup(id), Some(SlotState::Pipeline));

        recycler.recycle(frame);
        assert_eq!(pool.lookup(id), Some(SlotState::Driver));
        assert_eq!(sink.frames.lock().len(), 1);

        let stats = pool.stats();
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.recycled, 1);
        assert_eq!(stats.in_pipeline, 0);
    }
}
