pub mod driver;
pub mod frame;
pub mod pool;
pub mod sim;
pub mod sizing;

pub use driver::{CameraDriver, DeviceCapabilities, DriverError, Facing};
pub use frame::{BufferId, FrameGeometry, PixelFormat, RawFrame, Rotation, SharedRotation};
pub use pool::{FrameBufferPool, Recycler};
pub use sim::SimulatedCamera;
pub use sizing::{Size, SizePair};
