//! Annotation overlay: positions annotation regions over the raster

use serde::Serialize;

use super::engine::Annotation;
use super::types::{LinkTarget, PixelBox};
use super::viewport::Viewport;

/// A placed annotation
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AnnotationRegion {
    pub id: String,
    pub subtype: String,
    #[serde(flatten)]
    pub placement: PixelBox,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<LinkTarget>,
    /// Icon asset for note annotations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contents: Option<String>,
}

/// Options for [`layout_annotations`]
#[derive(Clone, Copy, Debug, Default)]
pub struct AnnotationLayout<'a> {
    /// Prefix for icon assets, e.g. `"/assets/images/"`
    pub image_resources_path: Option<&'a str>,
    /// Leave widgets to the form overlay
    pub skip_widgets: bool,
}

/// Place annotations against an unflipped viewport; zero-area regions are
/// dropped.
#[must_use]
pub fn layout_annotations(
    annotations: &[Annotation],
    viewport: &Viewport,
    layout: AnnotationLayout<'_>,
) -> Vec<AnnotationRegion> {
    annotations
        .iter()
        .filter(|annotation| !(layout.skip_widgets && annotation.subtype == "Widget"))
        .filter_map(|annotation| {
            let rect = viewport.convert_to_viewport_rectangle(annotation.rect);
            let placement = PixelBox::from_unflipped(rect, viewport.height);
            if placement.width <= 0.0 || placement.height <= 0.0 {
                return None;
            }

            Some(AnnotationRegion {
                id: annotation.id.clone(),
                subtype: annotation.subtype.clone(),
                placement,
                link: link_target(annotation),
                icon: icon_path(annotation, layout.image_resources_path),
                contents: annotation.contents.clone(),
            })
        })
        .collect()
}

fn link_target(annotation: &Annotation) -> Option<LinkTarget> {
    if let Some(page) = annotation.dest_page {
        Some(LinkTarget::Internal { page })
    } else {
        annotation
            .url
            .as_ref()
            .filter(|uri| !uri.is_empty())
            .map(|uri| LinkTarget::External { uri: uri.clone() })
    }
}

fn icon_path(annotation: &Annotation, prefix: Option<&str>) -> Option<String> {
    if annotation.subtype != "Text" {
        return None;
    }
    let name = annotation.icon.as_deref().unwrap_or("Note");
    Some(format!(
        "{}annotation-{}.svg",
        prefix.unwrap_or_default(),
        name.to_lowercase()
    ))
}
