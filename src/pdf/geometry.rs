//! Page geometry resolution
//!
//! Turns a page's content box and the caller's sizing inputs into the pixel
//! size used to lay out the page box and the two viewports used to draw it.

use super::types::ContentBox;
use super::viewport::{Rotation, Viewport, floor_px};

/// Degenerate or invalid sizing input
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum GeometryError {
    #[error("page content box has zero area: {0:?}")]
    EmptyContentBox(ContentBox),

    #[error("rotation must be a multiple of 90 degrees, got {0}")]
    InvalidRotation(i32),

    #[error("scale must be a finite non-negative number, got {0}")]
    InvalidScale(f64),

    #[error("{name} must be a finite non-negative number, got {value}")]
    InvalidDimension { name: &'static str, value: f64 },

    #[error("page aspect ratio is not representable: {0}")]
    InvalidAspect(f64),

    #[error("no width requested and no container width available")]
    MissingWidth,
}

/// Inputs to [`resolve`]
#[derive(Clone, Debug, PartialEq)]
pub struct GeometryRequest {
    pub content_box: ContentBox,
    /// Rotation stored in the page itself
    pub intrinsic_rotation: i32,
    /// Rotation asked for by the caller, any multiple of 90
    pub rotation: i32,
    /// Raster multiplier on top of the layout size
    pub scale: f64,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub container_width: Option<f64>,
    pub device_pixel_ratio: f64,
}

impl GeometryRequest {
    /// Request with unit scale and no rotation, sized by the container.
    #[must_use]
    pub fn new(content_box: ContentBox) -> Self {
        Self {
            content_box,
            intrinsic_rotation: 0,
            rotation: 0,
            scale: 1.0,
            width: None,
            height: None,
            container_width: None,
            device_pixel_ratio: 1.0,
        }
    }
}

/// Resolved page geometry
#[derive(Clone, Debug, PartialEq)]
pub struct PageGeometry {
    pub rotation: Rotation,
    pub transposed: bool,
    /// Layout width in pixels, excluding the device pixel ratio
    pub width: f64,
    /// Layout height in pixels, excluding the device pixel ratio
    pub height: f64,
    /// Viewport matching the layout box; overlays are positioned against it
    pub layout_viewport: Viewport,
    /// Viewport used for drawing, including device pixel ratio and scale
    pub raster_viewport: Viewport,
}

impl PageGeometry {
    /// Whole-pixel box size for the on-screen page container
    #[must_use]
    pub fn box_size(&self) -> (u32, u32) {
        (floor_px(self.width), floor_px(self.height))
    }
}

/// Compute page dimensions and viewports.
pub fn resolve(request: &GeometryRequest) -> Result<PageGeometry, GeometryError> {
    let content_box = request.content_box;
    if content_box.iter().any(|v| !v.is_finite()) {
        return Err(GeometryError::EmptyContentBox(content_box));
    }
    let content_width = (content_box[2] - content_box[0]).abs();
    let content_height = (content_box[3] - content_box[1]).abs();
    if content_width == 0.0 || content_height == 0.0 {
        return Err(GeometryError::EmptyContentBox(content_box));
    }

    let rotation = Rotation::from_degrees(request.rotation)
        .ok_or(GeometryError::InvalidRotation(request.rotation))?;
    let intrinsic = Rotation::from_degrees(request.intrinsic_rotation)
        .ok_or(GeometryError::InvalidRotation(request.intrinsic_rotation))?;
    let rotation = rotation.add(intrinsic);
    let transposed = rotation.is_transposed();

    check_scale(request.scale)?;
    check_scale(request.device_pixel_ratio)?;
    let width = check_dimension("width", request.width)?;
    let height = check_dimension("height", request.height)?;
    let container_width = check_dimension("container width", request.container_width)?;

    let ratio = if transposed {
        content_width / content_height
    } else {
        content_height / content_width
    };
    if !ratio.is_finite() || ratio == 0.0 {
        return Err(GeometryError::InvalidAspect(ratio));
    }

    let (width, height) = match (width, height) {
        (None, Some(height)) => (height / ratio, height),
        (width, _) => {
            let width = width.or(container_width).ok_or(GeometryError::MissingWidth)?;
            (width, width * ratio)
        }
    };
    check_finite("width", width)?;
    check_finite("height", height)?;

    let page_width = if transposed {
        content_height
    } else {
        content_width
    };
    let layout_scale = width / page_width;
    check_scale(layout_scale)?;
    check_scale(layout_scale * request.device_pixel_ratio * request.scale)?;

    let layout_viewport = Viewport::new(content_box, layout_scale, rotation);
    let raster_viewport = Viewport::new(
        content_box,
        layout_scale * request.device_pixel_ratio * request.scale,
        rotation,
    );

    Ok(PageGeometry {
        rotation,
        transposed,
        width,
        height,
        layout_viewport,
        raster_viewport,
    })
}

fn check_scale(scale: f64) -> Result<(), GeometryError> {
    if scale.is_finite() && scale >= 0.0 {
        Ok(())
    } else {
        Err(GeometryError::InvalidScale(scale))
    }
}

fn check_finite(name: &'static str, value: f64) -> Result<(), GeometryError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(GeometryError::InvalidDimension { name, value })
    }
}

fn check_dimension(name: &'static str, value: Option<f64>) -> Result<Option<f64>, GeometryError> {
    match value {
        Some(v) if !v.is_finite() || v < 0.0 => Err(GeometryError::InvalidDimension { name, value: v }),
        other => Ok(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn letter() -> GeometryRequest {
        GeometryRequest::new([0.0, 0.0, 600.0, 800.0])
    }

    #[test]
    fn rotation_is_normalized_modulo_360() {
        for rotation in [-630, -270, -90, 0, 90, 450, 810] {
            let mut raw = letter();
            raw.rotation = rotation;
            raw.intrinsic_rotation = 180;
            raw.width = Some(300.0);

            let mut normalized = raw.clone();
            normalized.rotation = (rotation.rem_euclid(360) + 180) % 360;
            normalized.intrinsic_rotation = 0;

            assert_eq!(resolve(&raw), resolve(&normalized), "rotation {rotation}");
        }
    }

    #[test]
    fn width_first_and_height_first_agree() {
        let mut request = letter();
        request.rotation = 90;
        request.width = Some(300.0);

        let geometry = resolve(&request).unwrap();
        assert!(geometry.transposed);
        assert_eq!(geometry.height, 225.0);

        request.width = None;
        request.height = Some(225.0);
        let geometry = resolve(&request).unwrap();
        assert_eq!(geometry.width, 300.0);
        assert_eq!(geometry.height, 225.0);
    }

    #[test]
    fn container_width_is_used_without_explicit_size() {
        let mut request = letter();
        request.container_width = Some(1200.0);

        let geometry = resolve(&request).unwrap();
        assert_eq!(geometry.width, 1200.0);
        assert!((geometry.height - 1600.0).abs() < 1e-9);
        assert_eq!(geometry.layout_viewport.scale, 2.0);
    }

    #[test]
    fn explicit_width_beats_height_and_container() {
        let mut request = letter();
        request.width = Some(60.0);
        request.height = Some(9999.0);
        request.container_width = Some(1200.0);

        let geometry = resolve(&request).unwrap();
        assert_eq!(geometry.width, 60.0);
        assert!((geometry.height - 80.0).abs() < 1e-9);
    }

    #[test]
    fn device_pixel_ratio_only_affects_raster_viewport() {
        let mut request = letter();
        request.width = Some(300.0);
        request.device_pixel_ratio = 2.0;
        request.scale = 1.5;

        let geometry = resolve(&request).unwrap();
        assert_eq!(geometry.layout_viewport.pixel_size(), (300, 400));
        assert_eq!(geometry.raster_viewport.pixel_size(), (900, 1200));
        assert_eq!(geometry.box_size(), (300, 400));
    }

    #[test]
    fn degenerate_inputs_are_errors() {
        let mut request = GeometryRequest::new([0.0, 0.0, 0.0, 800.0]);
        request.width = Some(100.0);
        assert!(matches!(
            resolve(&request),
            Err(GeometryError::EmptyContentBox(_))
        ));

        let mut request = letter();
        request.width = Some(f64::NAN);
        assert!(matches!(
            resolve(&request),
            Err(GeometryError::InvalidDimension { name: "width", .. })
        ));

        let mut request = letter();
        request.width = Some(100.0);
        request.rotation = 45;
        assert_eq!(resolve(&request), Err(GeometryError::InvalidRotation(45)));

        let mut request = letter();
        request.width = Some(100.0);
        request.scale = -1.0;
        assert_eq!(resolve(&request), Err(GeometryError::InvalidScale(-1.0)));

        assert_eq!(resolve(&letter()), Err(GeometryError::MissingWidth));
    }

    #[test]
    fn extreme_aspect_ratios_never_yield_infinite_sizes() {
        let mut request = GeometryRequest::new([0.0, 0.0, 1e300, 1e-300]);
        request.height = Some(100.0);
        assert!(matches!(
            resolve(&request),
            Err(GeometryError::InvalidAspect(_))
        ));

        let mut request = GeometryRequest::new([0.0, 0.0, 1e-300, 1e300]);
        request.width = Some(100.0);
        assert!(matches!(
            resolve(&request),
            Err(GeometryError::InvalidAspect(_))
        ));

        // Finite ratio, but the derived height overflows.
        let mut request = GeometryRequest::new([0.0, 0.0, 1.0, 1e300]);
        request.width = Some(1e300);
        assert!(matches!(
            resolve(&request),
            Err(GeometryError::InvalidDimension { name: "height", .. })
        ));

        let mut request = letter();
        request.width = Some(1e308);
        request.scale = 1e10;
        assert!(matches!(resolve(&request), Err(GeometryError::InvalidScale(_))));
    }
}
