use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::pdf::LayerFlags;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read settings file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid setting `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Options recognised by the viewer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewerOptions {
    #[serde(default = "default_true")]
    pub annotation_layer: bool,

    /// Form fields are drawn only when the annotation layer is on
    #[serde(default)]
    pub form_layer: bool,

    #[serde(default = "default_true")]
    pub text_layer: bool,

    /// Degrees, any multiple of 90
    #[serde(default)]
    pub rotation: i32,

    #[serde(default = "default_scale")]
    pub scale: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,

    /// Show only this page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,

    /// Prefix for annotation icon assets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_resources_path: Option<String>,

    #[serde(default = "default_device_pixel_ratio")]
    pub device_pixel_ratio: f64,
}

fn default_true() -> bool {
    true
}

fn default_scale() -> f64 {
    1.0
}

fn default_device_pixel_ratio() -> f64 {
    1.0
}

impl Default for ViewerOptions {
    fn default() -> Self {
        Self {
            annotation_layer: true,
            form_layer: false,
            text_layer: true,
            rotation: 0,
            scale: default_scale(),
            width: None,
            height: None,
            page: None,
            image_resources_path: None,
            device_pixel_ratio: default_device_pixel_ratio(),
        }
    }
}

impl ViewerOptions {
    /// Parse and validate options from YAML
    pub fn from_yaml_str(content: &str) -> Result<Self, SettingsError> {
        let options: Self = serde_yaml::from_str(content)?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.rotation.rem_euclid(90) != 0 {
            return Err(invalid("rotation", format!("{} is not a multiple of 90", self.rotation)));
        }
        if !self.scale.is_finite() || self.scale < 0.0 {
            return Err(invalid("scale", format!("{} must be a finite number >= 0", self.scale)));
        }
        if !self.device_pixel_ratio.is_finite() || self.device_pixel_ratio <= 0.0 {
            return Err(invalid(
                "device_pixel_ratio",
                format!("{} must be positive", self.device_pixel_ratio),
            ));
        }
        for (field, value) in [("width", self.width), ("height", self.height)] {
            if let Some(value) = value {
                if !value.is_finite() || value <= 0.0 {
                    return Err(invalid(field, format!("{value} must be positive")));
                }
            }
        }
        if self.page == Some(0) {
            return Err(invalid("page", "page numbers start at 1".into()));
        }
        Ok(())
    }

    #[must_use]
    pub fn layer_flags(&self) -> LayerFlags {
        LayerFlags {
            text: self.text_layer,
            annotations: self.annotation_layer,
            forms: self.annotation_layer && self.form_layer,
        }
    }
}

fn invalid(field: &'static str, reason: String) -> SettingsError {
    SettingsError::Invalid { field, reason }
}

/// Load options from a YAML file
pub fn load_options(path: &Path) -> Result<ViewerOptions, SettingsError> {
    let content = fs::read_to_string(path).map_err(|source| SettingsError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let options = ViewerOptions::from_yaml_str(&content)?;
    debug!("Loaded viewer options from {path:?}");
    Ok(options)
}

/// Write options as YAML, creating parent directories
pub fn save_options(options: &ViewerOptions, path: &Path) -> Result<(), SettingsError> {
    let io_error = |source| SettingsError::Io {
        path: path.display().to_string(),
        source,
    };
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
    }
    let content = serde_yaml::to_string(options)?;
    fs::write(path, content).map_err(io_error)?;
    info!("Saved viewer options to {path:?}");
    Ok(())
}
