//! Wires a camera driver to the frame pipeline and owns its lifecycle

use std::sync::Arc;

use flume::{Receiver, Sender};
use tracing::{info, instrument, warn};

use crate::capture::driver::{BufferSink, CameraParameters};
use crate::capture::pool::PoolStats;
use crate::capture::sizing::{self, SizePair};
use crate::capture::{
    CameraDriver, DriverError, FrameBufferPool, FrameGeometry, RawFrame, Recycler, Rotation,
    SharedRotation,
};
use crate::error::{Result, ScanError};
use crate::pipeline::exchange::ExchangeStats;
use crate::pipeline::worker::WorkerStats;
use crate::pipeline::{FrameJob, FrameProcessingWorker, LatestFrameExchange};
use crate::recognition::{Recognizer, ScanEvent};
use crate::{CaptureConfig, Config, PipelineConfig, CONFIG};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraStatus {
    Ready,
    NotReady,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionStats {
    pub pool: PoolStats,
    pub exchange: ExchangeStats,
    pub worker: WorkerStats,
}

/// Resources that exist only while frames are flowing.
struct ActivePipeline {
    pool: Arc<FrameBufferPool>,
    exchange: Arc<LatestFrameExchange>,
    worker: FrameProcessingWorker,
}

impl ActivePipeline {
    fn stats(&self) -> SessionStats {
        SessionStats {
            pool: self.pool.stats(),
            exchange: self.exchange.stats(),
            worker: self.worker.stats(),
        }
    }
}

/// A camera plus the pipeline that drains it into a recognizer.
///
/// A session whose device failed to open still exists: `start` reports
/// [`ScanError::DeviceUnavailable`] and nothing else happens.
pub struct CameraSession<D: CameraDriver> {
    device: std::result::Result<Arc<D>, DriverError>,
    capture: CaptureConfig,
    pipeline: PipelineConfig,
    recognizer: Arc<dyn Recognizer>,
    rotation: SharedRotation,
    display_degrees: u32,
    events_tx: Sender<ScanEvent>,
    events_rx: Receiver<ScanEvent>,
    active: Option<ActivePipeline>,
    size_pair: Option<SizePair>,
    last_stats: SessionStats,
    released: bool,
}

impl<D: CameraDriver> CameraSession<D> {
    /// Builds a session from the globally installed [`CONFIG`].
    pub fn new(
        device: std::result::Result<D, DriverError>,
        recognizer: impl Recognizer + 'static,
    ) -> Self {
        Self::with_config(device, recognizer, &CONFIG.load())
    }

    pub fn with_config(
        device: std::result::Result<D, DriverError>,
        recognizer: impl Recognizer + 'static,
        config: &Config,
    ) -> Self {
        if let Err(e) = &device {
            warn!(error = %e, "Camera unavailable, session will not deliver frames");
        }

        let (events_tx, events_rx) = flume::bounded(config.pipeline.event_capacity.max(1));
        Self {
            device: device.map(Arc::new),
            capture: config.capture.clone(),
            pipeline: config.pipeline.clone(),
            recognizer: Arc::new(recognizer),
            rotation: SharedRotation::default(),
            display_degrees: 0,
            events_tx,
            events_rx,
            active: None,
            size_pair: None,
            last_stats: SessionStats::default(),
            released: false,
        }
    }

    /// Outcomes and camera status changes, in order.
    pub fn events(&self) -> Receiver<ScanEvent> {
        self.events_rx.clone()
    }

    pub fn driver(&self) -> Option<&D> {
        self.device.as_deref().ok()
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    /// Size pair chosen by the last successful `start`.
    pub fn size_pair(&self) -> Option<SizePair> {
        self.size_pair
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation.get()
    }

    /// Counters of the running pipeline, or of the last one if stopped.
    pub fn stats(&self) -> SessionStats {
        self.active
            .as_ref()
            .map_or(self.last_stats, ActivePipeline::stats)
    }

    /// Records the display's rotation; frames processed from now on carry
    /// the matching image rotation.
    pub fn set_display_rotation(&mut self, display_degrees: u32) {
        self.display_degrees = display_degrees;
        if let Ok(driver) = &self.device {
            let sensor = driver.capabilities().sensor_orientation;
            self.rotation.set(Rotation::for_display(sensor, display_degrees));
        }
    }

    /// Negotiates sizes, configures the device, primes a fresh buffer pool
    /// and starts the worker and the preview.
    #[instrument(skip(self))]
    pub fn start(&mut self) -> Result<SizePair> {
        let driver = match &self.device {
            Ok(driver) => driver.clone(),
            Err(e) => return Err(ScanError::DeviceUnavailable(e.clone())),
        };
        if self.released {
            return Err(ScanError::InvalidState {
                expected: "open",
                actual: "released",
            });
        }
        if self.active.is_some() {
            return Err(ScanError::InvalidState {
                expected: "stopped",
                actual: "running",
            });
        }

        let caps = driver.capabilities();
        let pair = sizing::negotiate(
            &caps.preview_sizes,
            &caps.picture_sizes,
            self.capture.target(),
            self.capture.aspect_tolerance,
        )
        .ok_or(ScanError::NoCompatibleSize)?;
        info!(preview = %pair.preview, picture = %pair.picture, "Negotiated camera sizes");

        driver.configure(&CameraParameters {
            preview: pair.preview,
            picture: pair.picture,
            format: self.capture.format,
            focus: self.capture.focus_mode,
        })?;
        self.rotation
            .set(Rotation::for_display(caps.sensor_orientation, self.display_degrees));

        let geometry = FrameGeometry {
            width: pair.preview.width,
            height: pair.preview.height,
            format: self.capture.format,
        };
        let pool = Arc::new(FrameBufferPool::allocate(
            self.capture.buffer_count,
            geometry.byte_size(),
        ));
        let sink: Arc<dyn BufferSink> = driver.clone();
        let exchange = Arc::new(LatestFrameExchange::new(Recycler::new(pool.clone(), sink)));

        let worker = FrameProcessingWorker::new(exchange.clone(), self.pipeline.worker_thread_name.clone());
        worker.start(FrameJob {
            geometry,
            rotation: self.rotation.clone(),
            recognizer: self.recognizer.clone(),
            events: self.events_tx.clone(),
        })?;

        let publish_to = exchange.clone();
        driver.set_frame_callback(Some(Box::new(move |frame: RawFrame| {
            publish_to.publish(frame)
        })));
        for frame in pool.prime() {
            driver.submit_buffer(frame);
        }

        // Announced before the preview starts so it precedes every outcome.
        self.emit(CameraStatus::Ready);
        if let Err(e) = driver.start_preview() {
            worker.stop();
            driver.set_frame_callback(None);
            self.emit(CameraStatus::NotReady);
            return Err(e.into());
        }

        info!(
            buffers = pool.capacity(),
            frame_bytes = pool.frame_bytes(),
            rotation = self.rotation.get().degrees(),
            "Camera session started"
        );
        self.size_pair = Some(pair);
        self.active = Some(ActivePipeline {
            pool,
            exchange,
            worker,
        });
        Ok(pair)
    }

    /// Stops the worker, then the preview. Blocks until the worker thread
    /// has exited. A no-op when not running.
    #[instrument(skip(self))]
    pub fn stop(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };

        active.worker.stop();
        if let Ok(driver) = &self.device {
            driver.stop_preview();
            driver.set_frame_callback(None);
        }

        self.last_stats = active.stats();
        info!(stats = ?self.last_stats, "Camera session stopped");
        self.emit(CameraStatus::NotReady);
    }

    /// Stops the session and releases the device. Also done on drop.
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop();
        if self.released {
            return;
        }
        if let Ok(driver) = &self.device {
            driver.release();
        }
        self.released = true;
    }

    fn emit(&self, status: CameraStatus) {
        let _ = self.events_tx.try_send(ScanEvent::Camera(status));
    }
}

impl<D: CameraDriver> Drop for CameraSession<D> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
