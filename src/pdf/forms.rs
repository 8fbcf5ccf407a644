//! Form field overlay derivation
//!
//! Classifies `Widget` annotations by field type and places them over the
//! page. Presentational only: no input handling.

use serde::Serialize;

use super::engine::Annotation;
use super::types::PixelBox;
use super::viewport::Viewport;

/// Field category shown in the overlay
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum FieldKind {
    TextField,
    Checkbox,
    RadioButton,
    PushButton,
    ComboBox,
    ListBox,
    SignatureField,
    #[default]
    Unknown,
}

impl FieldKind {
    /// Classify a widget annotation; `None` for anything that is not a widget.
    #[must_use]
    pub fn classify(annotation: &Annotation) -> Option<Self> {
        if annotation.subtype != "Widget" {
            return None;
        }

        let kind = match annotation.field_type.as_deref() {
            Some("Tx") => Self::TextField,
            Some("Btn") if annotation.button.check_box => Self::Checkbox,
            Some("Btn") if annotation.button.radio_button => Self::RadioButton,
            Some("Btn") => Self::PushButton,
            Some("Ch") if annotation.combo => Self::ComboBox,
            Some("Ch") => Self::ListBox,
            Some("Sig") => Self::SignatureField,
            _ => Self::Unknown,
        };
        Some(kind)
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::TextField => "Text Field",
            Self::Checkbox => "Checkbox",
            Self::RadioButton => "Radio Button",
            Self::PushButton => "Push Button",
            Self::ComboBox => "Combo Box",
            Self::ListBox => "List Box",
            Self::SignatureField => "Signature Field",
            Self::Unknown => "Unknown Field Type",
        }
    }
}

/// A placed form field
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FormField {
    pub id: String,
    pub name: Option<String>,
    pub kind: FieldKind,
    #[serde(flatten)]
    pub placement: PixelBox,
}

/// Place every widget annotation; non-widgets are skipped.
///
/// `viewport` must be unflipped (y axis up); the overlay container takes
/// the viewport's pixel size.
#[must_use]
pub fn derive_form_fields(annotations: &[Annotation], viewport: &Viewport) -> Vec<FormField> {
    annotations
        .iter()
        .filter_map(|annotation| {
            let kind = FieldKind::classify(annotation)?;
            let rect = viewport.convert_to_viewport_rectangle(annotation.rect);
            Some(FormField {
                id: annotation.id.clone(),
                name: annotation.field_name.clone(),
                kind,
                placement: PixelBox::from_unflipped(rect, viewport.height),
            })
        })
        .collect()
}
