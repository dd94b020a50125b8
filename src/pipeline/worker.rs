//! Dedicated thread that feeds pending frames to the recognizer

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam::utils::CachePadded;
use flume::Sender;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::exchange::LatestFrameExchange;
use crate::capture::{FrameGeometry, RawFrame, SharedRotation};
use crate::error::{Result, ScanError};
use crate::recognition::{FrameImage, RecognitionError, Recognizer, ScanEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

impl WorkerState {
    fn name(self) -> &'static str {
        match self {
            WorkerState::Idle => "idle",
            WorkerState::Running => "running",
            WorkerState::Stopping => "stopping",
            WorkerState::Stopped => "stopped",
        }
    }
}

/// What the worker needs to turn a raw buffer into a recognizer call.
#[derive(Clone)]
pub struct FrameJob {
    pub geometry: FrameGeometry,
    pub rotation: SharedRotation,
    pub recognizer: Arc<dyn Recognizer>,
    pub events: Sender<ScanEvent>,
}

#[derive(Default)]
struct Counters {
    processed: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    events_dropped: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorkerStats {
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Outcomes discarded because the event channel was full
    pub events_dropped: u64,
}

/// Owns the consumer thread of a [`LatestFrameExchange`].
///
/// Lifecycle is `Idle -> Running -> Stopping -> Stopped`; a stopped worker
/// cannot be restarted since its exchange is closed.
pub struct FrameProcessingWorker {
    exchange: Arc<LatestFrameExchange>,
    state: Mutex<WorkerState>,
    handle: Mutex<Option<JoinHandle<()>>>,
    counters: Arc<CachePadded<Counters>>,
    thread_name: String,
}

impl FrameProcessingWorker {
    pub fn new(exchange: Arc<LatestFrameExchange>, thread_name: impl Into<String>) -> Self {
        Self {
            exchange,
            state: Mutex::new(WorkerState::Idle),
            handle: Mutex::new(None),
            counters: Arc::new(CachePadded::new(Counters::default())),
            thread_name: thread_name.into(),
        }
    }

    pub fn state(&self) -> WorkerState {
        *self.state.lock()
    }

    pub fn start(&self, job: FrameJob) -> Result<()> {
        let mut state = self.state.lock();
        if *state != WorkerState::Idle {
            return Err(ScanError::InvalidState {
                expected: WorkerState::Idle.name(),
                actual: state.name(),
            });
        }

        let exchange = self.exchange.clone();
        let counters = self.counters.clone();
        let handle = thread::Builder::new()
            .name(self.thread_name.clone())
            .spawn(move || Self::run(exchange, job, counters))
            .map_err(ScanError::WorkerSpawn)?;

        *self.handle.lock() = Some(handle);
        *state = WorkerState::Running;
        info!(thread = %self.thread_name, "Frame worker started");
        Ok(())
    }

    /// Closes the exchange and joins the worker thread.
    ///
    /// Returns only once the thread has exited. Safe to call in any state
    /// and from several threads; calls after the first are no-ops.
    pub fn stop(&self) {
        {
            let mut state = self.state.lock();
            match *state {
                WorkerState::Running => *state = WorkerState::Stopping,
                WorkerState::Idle => *state = WorkerState::Stopped,
                WorkerState::Stopping | WorkerState::Stopped => {}
            }
        }

        self.exchange.close();

        {
            // Held across the join so a concurrent stop waits for the exit too.
            let mut handle = self.handle.lock();
            if let Some(handle) = handle.take() {
                if handle.join().is_err() {
                    warn!(thread = %self.thread_name, "Frame worker thread panicked");
                }
                info!(thread = %self.thread_name, stats = ?self.stats(), "Frame worker stopped");
            }
        }

        *self.state.lock() = WorkerState::Stopped;
    }

    pub fn stats(&self) -> WorkerStats {
        WorkerStats {
            processed: self.counters.processed.load(Ordering::Relaxed),
            succeeded: self.counters.succeeded.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            events_dropped: self.counters.events_dropped.load(Ordering::Relaxed),
        }
    }

    fn run(exchange: Arc<LatestFrameExchange>, job: FrameJob, counters: Arc<CachePadded<Counters>>) {
        while let Ok(frame) = exchange.take_blocking() {
            let event = Self::process(&job, &frame, &counters);
            exchange.recycler().recycle(frame);
            if job.events.try_send(event).is_err() {
                counters.events_dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
        debug!("Frame exchange closed, worker exiting");
    }

    fn process(job: &FrameJob, frame: &RawFrame, counters: &Counters) -> ScanEvent {
        let sequence = frame.sequence();
        let image = FrameImage {
            data: frame.data(),
            width: job.geometry.width,
            height: job.geometry.height,
            rotation: job.rotation.get(),
            format: job.geometry.format,
            sequence,
        };

        let started = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| job.recognizer.recognize(&image)))
            .unwrap_or_else(|payload| Err(RecognitionError::Panicked(panic_message(payload.as_ref()))));
        metrics::histogram!("cardscan_recognition_seconds").record(started.elapsed().as_secs_f64());
        counters.processed.fetch_add(1, Ordering::Relaxed);

        match outcome {
            Ok(lines) => {
                counters.succeeded.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("cardscan_recognitions_total", "outcome" => "success").increment(1);
                debug!(sequence, lines = lines.len(), "Frame recognized");
                ScanEvent::Recognized { sequence, lines }
            }
            Err(error) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("cardscan_recognitions_total", "outcome" => "failure").increment(1);
                warn!(sequence, %error, "Frame recognition failed");
                ScanEvent::Failed { sequence, error }
            }
        }
    }
}

impl Drop for FrameProcessingWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
