//! Contract between the pipeline and a platform camera driver

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::frame::{PixelFormat, RawFrame};
use super::sizing::Size;

/// Per-frame delivery hook. Invoked on the driver's own thread.
pub type FrameCallback = Box<dyn Fn(RawFrame) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    #[error("no camera facing {0:?}")]
    NotFound(Facing),

    #[error("camera is in use by another client")]
    Busy,

    #[error("camera rejected parameters: {0}")]
    Rejected(String),

    #[error("camera has been released")]
    Released,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Facing {
    #[default]
    Back,
    Front,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FocusMode {
    Auto,
    #[default]
    ContinuousVideo,
    Fixed,
}

/// What the device advertises, in the device's own order.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceCapabilities {
    pub preview_sizes: Vec<Size>,
    pub picture_sizes: Vec<Size>,
    /// Clockwise angle the sensor image must be rotated for a display in
    /// its natural orientation.
    pub sensor_orientation: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraParameters {
    pub preview: Size,
    pub picture: Size,
    pub format: PixelFormat,
    pub focus: FocusMode,
}

/// Receiving side for buffers handed back to the driver for refilling.
pub trait BufferSink: Send + Sync {
    fn submit_buffer(&self, frame: RawFrame);
}

/// An opened camera device.
///
/// Implementations deliver filled buffers through the installed
/// [`FrameCallback`] on a thread they own, and only ever fill buffers that
/// were handed to them through [`BufferSink::submit_buffer`].
pub trait CameraDriver: BufferSink + 'static {
    fn capabilities(&self) -> DeviceCapabilities;

    fn configure(&self, params: &CameraParameters) -> Result<(), DriverError>;

    /// Installs or clears the per-frame delivery hook.
    fn set_frame_callback(&self, callback: Option<FrameCallback>);

    fn start_preview(&self) -> Result<(), DriverError>;

    /// Stops delivery. Once this returns the frame callback is not running
    /// and will not be invoked again until the next `start_preview`.
    fn stop_preview(&self);

    /// Releases the device and every buffer it still holds.
    fn release(&self);
}
