//! Interface to the text recognizer that consumes camera frames

pub mod card;

use thiserror::Error;

use crate::capture::{PixelFormat, Rotation};
use crate::session::CameraStatus;

/// One frame as the recognizer sees it. Borrowed from the pool buffer for
/// the duration of a single `recognize` call.
#[derive(Debug, Clone, Copy)]
pub struct FrameImage<'a> {
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
    pub rotation: Rotation,
    pub format: PixelFormat,
    pub sequence: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BoundingBox {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

/// A recognized line of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextLine {
    pub text: String,
    pub bounds: Option<BoundingBox>,
    /// Index of the text block the line belongs to
    pub block: usize,
}

impl TextLine {
    pub fn new(text: impl Into<String>, block: usize) -> Self {
        Self {
            text: text.into(),
            bounds: None,
            block,
        }
    }

    pub fn with_bounds(mut self, bounds: BoundingBox) -> Self {
        self.bounds = Some(bounds);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecognitionError {
    #[error("recognition failed: {0}")]
    Failed(String),

    #[error("unsupported image: {0}")]
    Unsupported(String),

    #[error("recognizer panicked: {0}")]
    Panicked(String),
}

/// Turns an image into zero or more lines of text.
///
/// Called synchronously on the frame worker thread; the frame's buffer is
/// returned to the camera as soon as the call ends, whatever its outcome.
pub trait Recognizer: Send + Sync {
    fn recognize(&self, image: &FrameImage<'_>) -> Result<Vec<TextLine>, RecognitionError>;
}

impl<F> Recognizer for F
where
    F: Fn(&FrameImage<'_>) -> Result<Vec<TextLine>, RecognitionError> + Send + Sync,
{
    fn recognize(&self, image: &FrameImage<'_>) -> Result<Vec<TextLine>, RecognitionError> {
        self(image)
    }
}

/// Pins a closure's signature so it can be used as a [`Recognizer`].
pub fn from_fn<F>(f: F) -> F
where
    F: Fn(&FrameImage<'_>) -> Result<Vec<TextLine>, RecognitionError> + Send + Sync,
{
    f
}

/// Everything a session reports to its owner, in order of occurrence.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    Camera(CameraStatus),
    Recognized { sequence: u64, lines: Vec<TextLine> },
    Failed { sequence: u64, error: RecognitionError },
}
