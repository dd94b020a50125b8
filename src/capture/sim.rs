//! In-process camera that fills submitted buffers at a fixed frame rate.
//!
//! Behaves like a buffer-queue camera driver: it only ever fills buffers
//! handed to it through [`BufferSink::submit_buffer`], delivers them on its
//! own thread, and skips a tick when it has no buffer to fill.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::driver::{
    BufferSink, CameraDriver, CameraParameters, DeviceCapabilities, DriverError, Facing,
    FrameCallback,
};
use super::frame::RawFrame;
use crate::SimulatorConfig;

type SharedCallback = Arc<dyn Fn(RawFrame) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SimStats {
    /// Frames handed to the frame callback
    pub delivered: u64,
    /// Ticks skipped because no buffer was queued
    pub starved: u64,
    /// Buffers received through `submit_buffer`
    pub submitted: u64,
    /// Buffers currently queued for filling
    pub queued: usize,
}

struct Shared {
    queue: Mutex<VecDeque<RawFrame>>,
    callback: Mutex<Option<SharedCallback>>,
    params: Mutex<Option<CameraParameters>>,
    running: AtomicBool,
    released: AtomicBool,
    sequence: AtomicU64,
    delivered: AtomicU64,
    starved: AtomicU64,
    submitted: AtomicU64,
}

pub struct SimulatedCamera {
    capabilities: DeviceCapabilities,
    interval: Duration,
    shared: Arc<Shared>,
    producer: Mutex<Option<JoinHandle<()>>>,
}

impl SimulatedCamera {
    /// Opens the simulated device facing `facing`.
    pub fn open(facing: Facing, config: &SimulatorConfig) -> Result<Self, DriverError> {
        if !config.facings.contains(&facing) {
            return Err(DriverError::NotFound(facing));
        }

        let fps = config.fps.max(1);
        info!(?facing, fps, "Opened simulated camera");

        Ok(Self {
            capabilities: DeviceCapabilities {
                preview_sizes: config.preview_sizes.clone(),
                picture_sizes: config.picture_sizes.clone(),
                sensor_orientation: config.sensor_orientation,
            },
            interval: Duration::from_secs(1) / fps,
            shared: Arc::new(Shared {
                queue: Mutex::new(VecDeque::new()),
                callback: Mutex::new(None),
                params: Mutex::new(None),
                running: AtomicBool::new(false),
                released: AtomicBool::new(false),
                sequence: AtomicU64::new(0),
                delivered: AtomicU64::new(0),
                starved: AtomicU64::new(0),
                submitted: AtomicU64::new(0),
            }),
            producer: Mutex::new(None),
        })
    }

    pub fn parameters(&self) -> Option<CameraParameters> {
        *self.shared.params.lock()
    }

    pub fn is_released(&self) -> bool {
        self.shared.released.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> SimStats {
        SimStats {
            delivered: self.shared.delivered.load(Ordering::Relaxed),
            starved: self.shared.starved.load(Ordering::Relaxed),
            submitted: self.shared.submitted.load(Ordering::Relaxed),
            queued: self.shared.queue.lock().len(),
        }
    }

    fn produce(shared: Arc<Shared>, interval: Duration) {
        let mut next_tick = Instant::now() + interval;

        while shared.running.load(Ordering::Acquire) {
            let now = Instant::now();
            if next_tick > now {
                thread::sleep(next_tick - now);
            }
            next_tick += interval;

            if !shared.running.load(Ordering::Acquire) {
                break;
            }

            let Some(mut frame) = shared.queue.lock().pop_front() else {
                shared.starved.fetch_add(1, Ordering::Relaxed);
                continue;
            };

            let Some(callback) = shared.callback.lock().clone() else {
                shared.queue.lock().push_front(frame);
                continue;
            };

            let sequence = shared.sequence.fetch_add(1, Ordering::Relaxed) + 1;
            frame.stamp(sequence);
            let data = frame.data_mut();
            let tag = sequence.to_le_bytes();
            let n = tag.len().min(data.len());
            data[..n].copy_from_slice(&tag[..n]);

            shared.delivered.fetch_add(1, Ordering::Relaxed);
            callback(frame);
        }

        debug!("Simulated camera producer exiting");
    }
}

impl BufferSink for SimulatedCamera {
    fn submit_buffer(&self, frame: RawFrame) {
        if self.shared.released.load(Ordering::Acquire) {
            return;
        }
        self.shared.submitted.fetch_add(1, Ordering::Relaxed);
        self.shared.queue.lock().push_back(frame);
    }
}

impl CameraDriver for SimulatedCamera {
    fn capabilities(&self) -> DeviceCapabilities {
        self.capabilities.clone()
    }

    fn configure(&self, params: &CameraParameters) -> Result<(), DriverError> {
        if self.is_released() {
            return Err(DriverError::Released);
        }
        if !self.capabilities.preview_sizes.contains(&params.preview) {
            return Err(DriverError::Rejected(format!(
                "unsupported preview size {}",
                params.preview
            )));
        }
        if !self.capabilities.picture_sizes.contains(&params.picture) {
            return Err(DriverError::Rejected(format!(
                "unsupported picture size {}",
                params.picture
            )));
        }

        *self.shared.params.lock() = Some(*params);
        Ok(())
    }

    fn set_frame_callback(&self, callback: Option<FrameCallback>) {
        *self.shared.callback.lock() = callback.map(SharedCallback::from);
    }

    fn start_preview(&self) -> Result<(), DriverError> {
        if self.is_released() {
            return Err(DriverError::Released);
        }
        if self.shared.params.lock().is_none() {
            return Err(DriverError::Rejected("preview started before configure".into()));
        }

        let mut producer = self.producer.lock();
        if producer.is_some() {
            return Ok(());
        }

        self.shared.running.store(true, Ordering::Release);
        let shared = self.shared.clone();
        let interval = self.interval;
        let handle = thread::Builder::new()
            .name("sim-camera".into())
            .spawn(move || Self::produce(shared, interval))
            .map_err(|e| DriverError::Rejected(format!("failed to spawn producer: {e}")))?;
        *producer = Some(handle);
        Ok(())
    }

    fn stop_preview(&self) {
        self.shared.running.store(false, Ordering::Release);
        if let Some(handle) = self.producer.lock().take() {
            if handle.join().is_err() {
                warn!("Simulated camera producer panicked");
            }
        }
    }

    fn release(&self) {
        self.stop_preview();
        self.shared.released.store(true, Ordering::Release);
        self.shared.callback.lock().take();
        self.shared.queue.lock().clear();
        info!("Simulated camera released");
    }
}

impl Drop for SimulatedCamera {
    fn drop(&mut self) {
        self.stop_preview();
    }
}
