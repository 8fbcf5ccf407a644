//! Text overlay: positions engine text runs over the raster

use serde::Serialize;

use super::engine::TextContent;
use super::types::multiply;
use super::viewport::Viewport;

/// A positioned text run, overlay space (origin top-left)
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TextSpan {
    pub text: String,
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub font_height: f64,
    /// Clockwise rotation in degrees
    pub angle: f64,
}

/// Lay out text runs against an unflipped viewport.
#[must_use]
pub fn layout_text(content: &TextContent, viewport: &Viewport) -> Vec<TextSpan> {
    content
        .items
        .iter()
        .filter(|item| !item.text.is_empty())
        .map(|item| {
            let tx = multiply(&viewport.transform, &item.transform);
            let font_height = tx[2].hypot(tx[3]);
            let angle = -tx[1].atan2(tx[0]).to_degrees();
            TextSpan {
                text: item.text.clone(),
                left: tx[4],
                top: viewport.height - tx[5] - font_height,
                width: item.width * viewport.scale,
                font_height,
                angle: if angle == 0.0 { 0.0 } else { angle },
            }
        })
        .collect()
}
