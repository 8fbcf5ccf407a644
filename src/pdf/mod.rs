//! PDF page viewer core

mod annotation_layer;
mod controller;
mod engine;
mod events;
mod export;
mod forms;
mod geometry;
mod link_service;
#[cfg(feature = "pdf")]
mod mupdf_engine;
mod pipeline;
mod request;
mod router;
mod session;
mod state;
mod surface;
mod text_layer;
mod types;
mod viewport;
mod visibility;

pub use annotation_layer::{AnnotationLayout, AnnotationRegion, layout_annotations};
pub use controller::{ControllerContext, DocumentSlot, PageController, PageProps};
pub use engine::{
    Annotation, AnnotationIntent, ButtonFlags, DocumentHandle, DocumentMetadata, DocumentRef,
    DocumentSource, EngineError, LoadProgress, PageHandle, PageRef, PdfEngine, RasterRequest,
    RenderIntent, RenderOutcome, RenderTask, RenderTaskRef, SourceKind, TextContent, TextItem,
};
pub use events::{EventSink, ViewerEvent};
pub use export::{DEFAULT_PRINT_DPI, ExportFault, HostPlatform, PrintJob, PrintOptions};
pub use forms::{FieldKind, FormField, derive_form_fields};
pub use geometry::{GeometryError, GeometryRequest, PageGeometry, resolve};
pub use link_service::{LinkService, SimpleLinkService};
#[cfg(feature = "pdf")]
pub use mupdf_engine::MupdfEngine;
pub use pipeline::{RenderContext, RenderPipeline};
pub use request::{RenderFault, RenderStatus, TaskId};
pub use router::VisibilityRouter;
pub use session::{DocumentSession, page_sequence};
pub use state::{Command, Effect, PageLifecycle, PageState};
pub use surface::{Canvas, Overlay, PageSurfaces};
pub use text_layer::{TextSpan, layout_text};
pub use types::*;
pub use viewport::{Rotation, Viewport};
pub use visibility::{
    RenderSetDelta, VISIBILITY_THRESHOLD, VisibilityChange, VisibilityTracker, render_set,
};
