//! Preview/picture resolution negotiation

use serde::{Deserialize, Serialize};
use std::fmt;

/// Resolution the negotiation aims for.
pub const DEFAULT_TARGET: Size = Size::new(480, 360);

/// Maximum absolute difference between two aspect ratios that still counts
/// as the same shape.
pub const DEFAULT_ASPECT_TOLERANCE: f32 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    /// Manhattan distance between the two resolutions.
    pub fn distance(&self, other: Size) -> u64 {
        u64::from(self.width.abs_diff(other.width)) + u64::from(self.height.abs_diff(other.height))
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizePair {
    pub preview: Size,
    pub picture: Size,
}

fn same_shape(a: Size, b: Size, tolerance: f32) -> bool {
    (a.aspect_ratio() - b.aspect_ratio()).abs() < tolerance
}

/// Pairs every preview size with the first picture size of the same shape.
///
/// Preview sizes with no matching picture size are left out. Order follows
/// `preview_sizes`.
pub fn compatible_pairs(preview_sizes: &[Size], picture_sizes: &[Size], tolerance: f32) -> Vec<SizePair> {
    preview_sizes
        .iter()
        .filter(|p| p.height != 0)
        .filter_map(|&preview| {
            picture_sizes
                .iter()
                .filter(|p| p.height != 0)
                .find(|&&picture| same_shape(preview, picture, tolerance))
                .map(|&picture| SizePair { preview, picture })
        })
        .collect()
}

/// Picks the compatible pair whose preview size is closest to `target`.
///
/// Ties go to the pair encountered first.
pub fn negotiate(
    preview_sizes: &[Size],
    picture_sizes: &[Size],
    target: Size,
    tolerance: f32,
) -> Option<SizePair> {
    let mut best: Option<(u64, SizePair)> = None;
    for pair in compatible_pairs(preview_sizes, picture_sizes, tolerance) {
        let diff = pair.preview.distance(target);
        if best.map_or(true, |(min, _)| diff < min) {
            best = Some((diff, pair));
        }
    }
    best.map(|(_, pair)| pair)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sizes(list: &[(u32, u32)]) -> Vec<Size> {
        list.iter().map(|&(w, h)| Size::new(w, h)).collect()
    }

    #[test]
    fn tie_resolves_to_first_pair() {
        let previews = sizes(&[(640, 480), (320, 240)]);
        let pictures = sizes(&[(640, 480), (320, 240)]);

        let pair = negotiate(&previews, &pictures, DEFAULT_TARGET, DEFAULT_ASPECT_TOLERANCE).unwrap();
        assert_eq!(pair.preview, Size::new(640, 480));
        assert_eq!(pair.picture, Size::new(640, 480));

        // Same inputs in reverse order flip the winner.
        let previews = sizes(&[(320, 240), (640, 480)]);
        let pair = negotiate(&previews, &pictures, DEFAULT_TARGET, DEFAULT_ASPECT_TOLERANCE).unwrap();
        assert_eq!(pair.preview, Size::new(320, 240));
    }

    #[test]
    fn picks_first_compatible_picture_size() {
        let previews = sizes(&[(1280, 720)]);
        let pictures = sizes(&[(4000, 3000), (1920, 1080), (3840, 2160)]);

        let pairs = compatible_pairs(&previews, &pictures, DEFAULT_ASPECT_TOLERANCE);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].picture, Size::new(1920, 1080));
    }

    #[test]
    fn closest_preview_wins() {
        let previews = sizes(&[(1920, 1080), (640, 480), (480, 360), (176, 144)]);
        let pictures = sizes(&[(1920, 1080), (2048, 1536)]);

        let pair = negotiate(&previews, &pictures, DEFAULT_TARGET, DEFAULT_ASPECT_TOLERANCE).unwrap();
        assert_eq!(pair.preview, Size::new(480, 360));
        assert_eq!(pair.picture, Size::new(2048, 1536));
    }

    #[test]
    fn previews_without_matching_picture_are_skipped() {
        // 176x144 is 11:9, nothing matches it
        let previews = sizes(&[(480, 360), (176, 144)]);
        let pictures = sizes(&[(1920, 1080)]);

        assert!(compatible_pairs(&previews, &pictures, DEFAULT_ASPECT_TOLERANCE).is_empty());
        assert_eq!(
            negotiate(&previews, &pictures, DEFAULT_TARGET, DEFAULT_ASPECT_TOLERANCE),
            None
        );
    }

    #[test]
    fn zero_height_sizes_are_ignored() {
        let previews = sizes(&[(640, 0), (640, 480)]);
        let pictures = sizes(&[(0, 0), (1280, 960)]);

        let pair = negotiate(&previews, &pictures, DEFAULT_TARGET, DEFAULT_ASPECT_TOLERANCE).unwrap();
        assert_eq!(pair.preview, Size::new(640, 480));
        assert_eq!(pair.picture, Size::new(1280, 960));
    }
}
