//! Interfaces to the PDF engine
//!
//! The engine parses documents and rasterizes pages; this crate only
//! schedules that work and positions what comes back. All handles are
//! single-threaded (`Rc`) and every async method runs on the local executor.

use std::path::PathBuf;
use std::rc::Rc;

use async_trait::async_trait;
use serde::Serialize;

use super::types::{ContentBox, Pixmap, Transform};
use super::viewport::{Rotation, Viewport};

pub type DocumentRef = Rc<dyn DocumentHandle>;
pub type PageRef = Rc<dyn PageHandle>;
pub type RenderTaskRef = Rc<dyn RenderTask>;

/// Errors reported by the engine
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("document is password protected")]
    PasswordRequired { wrong_password: bool },

    #[error("failed to load document: {0}")]
    Load(String),

    #[error("failed to fetch {what}: {detail}")]
    Fetch { what: &'static str, detail: String },

    #[error("raster render failed: {0}")]
    Render(String),

    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl EngineError {
    pub fn fetch(what: &'static str, detail: impl Into<String>) -> Self {
        Self::Fetch {
            what,
            detail: detail.into(),
        }
    }
}

/// Where a document comes from
#[derive(Clone, Debug, PartialEq)]
pub enum SourceKind {
    Bytes(Vec<u8>),
    Url(String),
    Path(PathBuf),
}

/// Document source plus credentials
#[derive(Clone, Debug, PartialEq)]
pub struct DocumentSource {
    pub kind: SourceKind,
    pub password: Option<String>,
}

impl DocumentSource {
    #[must_use]
    pub fn bytes(data: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: SourceKind::Bytes(data.into()),
            password: None,
        }
    }

    #[must_use]
    pub fn url(url: impl Into<String>) -> Self {
        Self {
            kind: SourceKind::Url(url.into()),
            password: None,
        }
    }

    #[must_use]
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: SourceKind::Path(path.into()),
            password: None,
        }
    }

    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }
}

/// Loading progress as reported by the engine
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct LoadProgress {
    pub loaded: u64,
    pub total: Option<u64>,
}

/// Document-level metadata
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    /// Filename suggested by the transport, if any
    pub content_disposition_filename: Option<String>,
}

/// What the raster render is for
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RenderIntent {
    #[default]
    Display,
    Print,
}

/// Parameters for one raster render
#[derive(Clone, Debug)]
pub struct RasterRequest {
    pub viewport: Viewport,
    pub intent: RenderIntent,
}

/// How a render task ended
#[derive(Clone, Debug, PartialEq)]
pub enum RenderOutcome {
    Completed(Pixmap),
    Cancelled,
    Failed(EngineError),
}

/// One positioned run of text, in content space
#[derive(Clone, Debug, PartialEq)]
pub struct TextItem {
    pub text: String,
    /// Text matrix; `[size, 0, 0, size, x, baseline_y]` for upright text
    pub transform: Transform,
    /// Advance width in content units
    pub width: f64,
    pub font_name: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TextContent {
    pub items: Vec<TextItem>,
}

/// Annotation list filter
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AnnotationIntent {
    #[default]
    Display,
    Print,
}

/// Button field variant, from the field flags
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ButtonFlags {
    pub check_box: bool,
    pub radio_button: bool,
}

/// Annotation record as produced by the engine
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Annotation {
    pub id: String,
    /// PDF subtype: `Link`, `Widget`, `Text`, ...
    pub subtype: String,
    pub rect: [f64; 4],
    /// Widget field type: `Tx`, `Btn`, `Ch`, `Sig`
    pub field_type: Option<String>,
    pub field_name: Option<String>,
    pub button: ButtonFlags,
    pub combo: bool,
    /// Internal destination page (1-based)
    pub dest_page: Option<u32>,
    pub url: Option<String>,
    /// Icon name of a `Text` annotation
    pub icon: Option<String>,
    pub contents: Option<String>,
}

/// Loads documents
#[async_trait(?Send)]
pub trait PdfEngine {
    /// Load a document, reporting progress as it arrives.
    async fn load(
        &self,
        source: &DocumentSource,
        progress: &dyn Fn(LoadProgress),
    ) -> Result<DocumentRef, EngineError>;
}

/// A loaded, parsed document
#[async_trait(?Send)]
pub trait DocumentHandle {
    fn page_count(&self) -> u32;

    /// Fetch a page by 1-based number
    async fn page(&self, number: u32) -> Result<PageRef, EngineError>;

    /// Raw document bytes
    async fn data(&self) -> Result<Vec<u8>, EngineError>;

    async fn metadata(&self) -> Result<DocumentMetadata, EngineError>;

    /// Release engine resources; the handle is unusable afterwards.
    fn destroy(&self) {}
}

/// One page of a loaded document
#[async_trait(?Send)]
pub trait PageHandle {
    /// 1-based page number
    fn number(&self) -> u32;

    /// Content box in content units
    fn view_box(&self) -> ContentBox;

    /// Rotation stored in the page, in degrees
    fn rotate(&self) -> i32;

    /// Start a cancellable raster render
    fn render(&self, request: RasterRequest) -> RenderTaskRef;

    async fn text_content(&self) -> Result<TextContent, EngineError>;

    async fn annotations(&self, intent: AnnotationIntent) -> Result<Vec<Annotation>, EngineError>;

    /// Free per-page resources
    fn cleanup(&self) {}

    /// Viewport at `scale`; `rotation` is the effective rotation, page
    /// rotation included.
    fn viewport(&self, scale: f64, rotation: Rotation) -> Viewport {
        Viewport::new(self.view_box(), scale, rotation)
    }
}

/// Handle to an in-flight raster render
#[async_trait(?Send)]
pub trait RenderTask {
    /// Request cancellation; the outcome becomes `Cancelled` unless the task
    /// already settled.
    fn cancel(&self);

    /// Wait for the render to settle
    async fn completion(&self) -> RenderOutcome;
}
