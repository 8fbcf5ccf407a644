//! Content-space to pixel-space mapping for a page
//!
//! A [`Viewport`] is an immutable value: the page's view box, a scale and a
//! rotation determine the pixel size and the affine transform. Changing any
//! input means building a new viewport.

use serde::Serialize;

use super::types::{ContentBox, Transform, normalize_rect};

/// Page rotation, clockwise, in quarter turns
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// Normalize any angle into `[0, 360)`; `None` unless it lands on a
    /// quarter turn.
    #[must_use]
    pub fn from_degrees(degrees: i32) -> Option<Self> {
        match degrees.rem_euclid(360) {
            0 => Some(Self::Deg0),
            90 => Some(Self::Deg90),
            180 => Some(Self::Deg180),
            270 => Some(Self::Deg270),
            _ => None,
        }
    }

    #[must_use]
    pub const fn degrees(self) -> i32 {
        match self {
            Self::Deg0 => 0,
            Self::Deg90 => 90,
            Self::Deg180 => 180,
            Self::Deg270 => 270,
        }
    }

    /// Combine two rotations
    #[must_use]
    pub fn add(self, other: Self) -> Self {
        Self::from_degrees(self.degrees() + other.degrees()).unwrap_or_default()
    }

    /// Width and height swap on screen
    #[must_use]
    pub const fn is_transposed(self) -> bool {
        matches!(self, Self::Deg90 | Self::Deg270)
    }
}

/// Scaled and rotated mapping from page content to pixels
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Viewport {
    pub view_box: ContentBox,
    pub scale: f64,
    pub rotation: Rotation,
    pub width: f64,
    pub height: f64,
    pub transform: Transform,
    /// `true` when the y axis points down (raster orientation)
    pub flipped: bool,
}

impl Viewport {
    /// Build the raster-oriented viewport (y axis pointing down).
    #[must_use]
    pub fn new(view_box: ContentBox, scale: f64, rotation: Rotation) -> Self {
        let center_x = (view_box[2] + view_box[0]) / 2.0;
        let center_y = (view_box[3] + view_box[1]) / 2.0;

        let (rotate_a, rotate_b, rotate_c, rotate_d) = match rotation {
            Rotation::Deg0 => (1.0, 0.0, 0.0, -1.0),
            Rotation::Deg90 => (0.0, 1.0, 1.0, 0.0),
            Rotation::Deg180 => (-1.0, 0.0, 0.0, 1.0),
            Rotation::Deg270 => (0.0, -1.0, -1.0, 0.0),
        };

        let content_width = (view_box[2] - view_box[0]).abs();
        let content_height = (view_box[3] - view_box[1]).abs();

        let (offset_x, offset_y, width, height) = if rotation.is_transposed() {
            (
                (center_y - view_box[1]).abs() * scale,
                (center_x - view_box[0]).abs() * scale,
                content_height * scale,
                content_width * scale,
            )
        } else {
            (
                (center_x - view_box[0]).abs() * scale,
                (center_y - view_box[1]).abs() * scale,
                content_width * scale,
                content_height * scale,
            )
        };

        let transform = [
            rotate_a * scale,
            rotate_b * scale,
            rotate_c * scale,
            rotate_d * scale,
            offset_x - rotate_a * scale * center_x - rotate_c * scale * center_y,
            offset_y - rotate_b * scale * center_x - rotate_d * scale * center_y,
        ];

        Self {
            view_box,
            scale,
            rotation,
            width,
            height,
            transform,
            flipped: true,
        }
    }

    /// Same mapping mirrored vertically, so that the y axis points up.
    ///
    /// Overlays position their items with `top = height - y`, which keeps
    /// them aligned with the raster for every rotation.
    #[must_use]
    pub fn unflipped(&self) -> Self {
        if !self.flipped {
            return self.clone();
        }
        let [a, b, c, d, e, f] = self.transform;
        Self {
            transform: [a, -b, c, -d, e, self.height - f],
            flipped: false,
            ..self.clone()
        }
    }

    /// Rebuild at `scale * factor`, keeping rotation and orientation.
    #[must_use]
    pub fn rescaled(&self, factor: f64) -> Self {
        let rebuilt = Self::new(self.view_box, self.scale * factor, self.rotation);
        if self.flipped {
            rebuilt
        } else {
            rebuilt.unflipped()
        }
    }

    #[must_use]
    pub fn convert_to_viewport_point(&self, x: f64, y: f64) -> (f64, f64) {
        let m = &self.transform;
        (x * m[0] + y * m[2] + m[4], x * m[1] + y * m[3] + m[5])
    }

    /// Map a content rectangle; the result is normalized.
    #[must_use]
    pub fn convert_to_viewport_rectangle(&self, rect: [f64; 4]) -> [f64; 4] {
        let (x1, y1) = self.convert_to_viewport_point(rect[0], rect[1]);
        let (x2, y2) = self.convert_to_viewport_point(rect[2], rect[3]);
        normalize_rect([x1, y1, x2, y2])
    }

    /// Whole-pixel size of a surface backing this viewport
    #[must_use]
    pub fn pixel_size(&self) -> (u32, u32) {
        (floor_px(self.width), floor_px(self.height))
    }
}

/// Floor to whole pixels, tolerating float noise just below an integer.
pub(crate) fn floor_px(value: f64) -> u32 {
    if value.is_finite() && value > 0.0 {
        (value + 1e-6).floor().min(f64::from(u32::MAX)) as u32
    } else {
        0
    }
}
