use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Raw pixel layouts a camera driver can deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    /// Y plane followed by interleaved V/U at quarter resolution
    Nv21,
    Nv12,
    Yv12,
    Yuy2,
    Rgb24,
}

impl PixelFormat {
    pub fn bits_per_pixel(self) -> u32 {
        match self {
            PixelFormat::Nv21 | PixelFormat::Nv12 | PixelFormat::Yv12 => 12,
            PixelFormat::Yuy2 => 16,
            PixelFormat::Rgb24 => 24,
        }
    }

    /// Bytes needed to hold one `width` x `height` frame.
    ///
    /// Rounds the bit count up to whole bytes and adds one guard byte, so
    /// 4:2:0 layouts with odd dimensions never come up short.
    pub fn frame_byte_size(self, width: u32, height: u32) -> usize {
        let bits = u64::from(width) * u64::from(height) * u64::from(self.bits_per_pixel());
        (bits.div_ceil(8) + 1) as usize
    }
}

/// Clockwise rotation to apply to a frame so it appears upright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn degrees(self) -> u16 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    /// Snaps any angle to the nearest lower quarter turn.
    pub fn from_degrees(degrees: u32) -> Self {
        match (degrees % 360) / 90 {
            1 => Rotation::Deg90,
            2 => Rotation::Deg180,
            3 => Rotation::Deg270,
            _ => Rotation::Deg0,
        }
    }

    /// Rotation of the sensor image relative to a display turned by
    /// `display_degrees`.
    pub fn for_display(sensor_orientation: u32, display_degrees: u32) -> Self {
        let sensor = sensor_orientation % 360;
        let display = display_degrees % 360;
        Self::from_degrees((sensor + 360 - display) % 360)
    }
}

/// Rotation shared between the session, which updates it when the display
/// turns, and the frame worker, which stamps it on every image.
#[derive(Debug, Clone, Default)]
pub struct SharedRotation(Arc<AtomicU16>);

impl SharedRotation {
    pub fn get(&self) -> Rotation {
        Rotation::from_degrees(u32::from(self.0.load(Ordering::Relaxed)))
    }

    pub fn set(&self, rotation: Rotation) {
        self.0.store(rotation.degrees(), Ordering::Relaxed);
    }
}

/// Fixed dimensions and layout of every frame in one pool generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameGeometry {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

impl FrameGeometry {
    pub fn byte_size(&self) -> usize {
        self.format.frame_byte_size(self.width, self.height)
    }
}

/// Identity of one physical buffer slot.
///
/// `generation` distinguishes pools, so a buffer allocated before a restart
/// or resolution change never resolves against the current pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId {
    pub generation: u64,
    pub index: u32,
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.generation, self.index)
    }
}

/// One camera buffer together with the identity of its slot.
///
/// Deliberately not `Clone`: exactly one component holds a frame at a time.
#[derive(Debug)]
pub struct RawFrame {
    id: BufferId,
    data: BytesMut,
    sequence: u64,
    captured_at: Option<Instant>,
}

impl RawFrame {
    pub(crate) fn new(id: BufferId, byte_size: usize) -> Self {
        Self {
            id,
            data: BytesMut::zeroed(byte_size),
            sequence: 0,
            captured_at: None,
        }
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Driver-assigned sequence number of the last fill, 0 if never filled.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn captured_at(&self) -> Option<Instant> {
        self.captured_at
    }

    /// Marks the buffer as freshly filled by the driver.
    pub fn stamp(&mut self, sequence: u64) {
        self.sequence = sequence;
        self.captured_at = Some(Instant::now());
    }
}
