pub mod capture;
pub mod error;
pub mod pipeline;
pub mod recognition;
pub mod session;

use std::path::Path;

use arc_swap::ArcSwap;
use capture::driver::{Facing, FocusMode};
use capture::sizing::{Size, DEFAULT_ASPECT_TOLERANCE, DEFAULT_TARGET};
use capture::PixelFormat;
use serde::{Deserialize, Serialize};

pub use error::{Result, ScanError};
pub use recognition::{Recognizer, ScanEvent};
pub use session::{CameraSession, CameraStatus};

/// Global configuration that can be atomically swapped at runtime
pub static CONFIG: once_cell::sync::Lazy<ArcSwap<Config>> =
    once_cell::sync::Lazy::new(|| ArcSwap::from_pointee(Config::default()));

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub pipeline: PipelineConfig,
    pub simulator: SimulatorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub facing: Facing,
    pub target_width: u32,
    pub target_height: u32,
    /// Largest aspect-ratio difference for a preview/picture pair
    pub aspect_tolerance: f32,
    pub format: PixelFormat,
    pub buffer_count: usize,
    pub focus_mode: FocusMode,
}

impl CaptureConfig {
    pub fn target(&self) -> Size {
        Size::new(self.target_width, self.target_height)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Scan events buffered before the worker starts dropping them
    pub event_capacity: usize,
    pub worker_thread_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub facings: Vec<Facing>,
    pub fps: u32,
    pub preview_sizes: Vec<Size>,
    pub picture_sizes: Vec<Size>,
    pub sensor_orientation: u32,
    pub run_seconds: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            facing: Facing::Back,
            target_width: DEFAULT_TARGET.width,
            target_height: DEFAULT_TARGET.height,
            aspect_tolerance: DEFAULT_ASPECT_TOLERANCE,
            format: PixelFormat::Nv21,
            buffer_count: 4,
            focus_mode: FocusMode::ContinuousVideo,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            event_capacity: 16,
            worker_thread_name: "frame-worker".into(),
        }
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            facings: vec![Facing::Back],
            fps: 30,
            preview_sizes: vec![
                Size::new(1280, 720),
                Size::new(640, 480),
                Size::new(480, 360),
                Size::new(320, 240),
            ],
            picture_sizes: vec![
                Size::new(1920, 1080),
                Size::new(1280, 960),
                Size::new(640, 480),
            ],
            sensor_orientation: 90,
            run_seconds: 5,
        }
    }
}

impl Config {
    /// Defaults, overlaid with `path` (TOML) when given, overlaid with
    /// `CARDSCAN__<SECTION>__<KEY>` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Config::default())?);
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix("CARDSCAN")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn load_without_file_yields_defaults() {
        let config = Config::load(None).unwrap();
        assert_eq!(config.capture.buffer_count, 4);
        assert_eq!(config.capture.target(), Size::new(480, 360));
        assert_eq!(config.capture.format, PixelFormat::Nv21);
        assert_eq!(config.simulator.preview_sizes.len(), 4);
    }

    #[test]
    fn file_overrides_selected_keys() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[capture]
buffer_count = 6
format = "Yuy2"

[simulator]
fps = 15
preview_sizes = [{{ width = 800, height = 600 }}]
"#
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.capture.buffer_count, 6);
        assert_eq!(config.capture.format, PixelFormat::Yuy2);
        assert_eq!(config.capture.target_width, 480);
        assert_eq!(config.simulator.fps, 15);
        assert_eq!(config.simulator.preview_sizes, vec![Size::new(800, 600)]);
        assert_eq!(config.pipeline.worker_thread_name, "frame-worker");
    }

    #[test]
    fn missing_file_is_an_error() {
        let result = Config::load(Some(Path::new("/nonexistent/cardscan.toml")));
        assert!(matches!(result, Err(ScanError::Config(_))));
    }
}
