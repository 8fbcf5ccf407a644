//! Core types for PDF page rendering

use serde::Serialize;

/// Rectangle in PDF content space: `[x1, y1, x2, y2]`, origin bottom-left.
pub type ContentBox = [f64; 4];

/// Six-number affine transform `[a, b, c, d, e, f]`.
pub type Transform = [f64; 6];

/// Compose two transforms: the result applies `rhs` first, then `lhs`.
#[must_use]
pub fn multiply(lhs: &Transform, rhs: &Transform) -> Transform {
    [
        lhs[0] * rhs[0] + lhs[2] * rhs[1],
        lhs[1] * rhs[0] + lhs[3] * rhs[1],
        lhs[0] * rhs[2] + lhs[2] * rhs[3],
        lhs[1] * rhs[2] + lhs[3] * rhs[3],
        lhs[0] * rhs[4] + lhs[2] * rhs[5] + lhs[4],
        lhs[1] * rhs[4] + lhs[3] * rhs[5] + lhs[5],
    ]
}

/// Reorder a rectangle so that `x1 <= x2` and `y1 <= y2`.
#[must_use]
pub fn normalize_rect(rect: [f64; 4]) -> [f64; 4] {
    [
        rect[0].min(rect[2]),
        rect[1].min(rect[3]),
        rect[0].max(rect[2]),
        rect[1].max(rect[3]),
    ]
}

/// Link target type
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LinkTarget {
    /// 1-based page inside the loaded document
    Internal { page: u32 },
    External { uri: String },
}

/// Overlay-space box: origin top-left, pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct PixelBox {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl PixelBox {
    /// Place a normalized viewport rectangle `[x1, y1, x2, y2]` whose y axis
    /// points up into an overlay of height `container_height`.
    #[must_use]
    pub fn from_unflipped(rect: [f64; 4], container_height: f64) -> Self {
        let [x1, y1, x2, y2] = normalize_rect(rect);
        Self {
            left: x1,
            top: container_height - y2,
            width: x2 - x1,
            height: y2 - y1,
        }
    }
}

/// Raw rasterized page image.
///
/// RGBA, 4 bytes per pixel, rows packed without padding.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Pixmap {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl Pixmap {
    /// Allocate a transparent pixmap
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * 4],
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl std::fmt::Debug for Pixmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pixmap")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

/// Which overlays accompany the raster layer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayerFlags {
    pub text: bool,
    pub annotations: bool,
    pub forms: bool,
}

impl LayerFlags {
    /// Raster only
    pub const NONE: Self = Self {
        text: false,
        annotations: false,
        forms: false,
    };

    pub const ALL: Self = Self {
        text: true,
        annotations: true,
        forms: true,
    };
}

impl Default for LayerFlags {
    fn default() -> Self {
        Self::NONE
    }
}
