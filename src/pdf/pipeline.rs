//! Per-page render pipeline
//!
//! Owns a page's drawing surfaces and its single live raster task. Every
//! render cancels the previous task before touching the canvas, then runs
//! the raster, text and annotation/form sub-renders concurrently.

use std::cell::{Cell, Ref, RefCell};

use log::debug;

use super::annotation_layer::{AnnotationLayout, layout_annotations};
use super::engine::{
    AnnotationIntent, PageHandle, RasterRequest, RenderIntent, RenderOutcome, RenderTaskRef,
};
use super::forms::derive_form_fields;
use super::geometry::PageGeometry;
use super::request::{RenderFault, RenderStatus, TaskId};
use super::surface::PageSurfaces;
use super::text_layer::layout_text;
use super::types::LayerFlags;
use super::viewport::Viewport;

/// Per-render options beyond geometry
#[derive(Clone, Copy, Debug, Default)]
pub struct RenderContext<'a> {
    pub layers: LayerFlags,
    pub image_resources_path: Option<&'a str>,
}

struct ActiveTask {
    id: TaskId,
    task: RenderTaskRef,
}

/// Drives rendering of one page onto its surfaces
pub struct RenderPipeline {
    page_number: u32,
    surfaces: RefCell<PageSurfaces>,
    active: RefCell<Option<ActiveTask>>,
    next_task_id: Cell<u64>,
}

impl RenderPipeline {
    #[must_use]
    pub fn new(page_number: u32) -> Self {
        Self {
            page_number,
            surfaces: RefCell::new(PageSurfaces::default()),
            active: RefCell::new(None),
            next_task_id: Cell::new(1),
        }
    }

    /// Read access to the canvas and overlays
    pub fn surfaces(&self) -> Ref<'_, PageSurfaces> {
        self.surfaces.borrow()
    }

    /// A raster task has been started and has not settled
    #[must_use]
    pub fn has_live_task(&self) -> bool {
        self.active.borrow().is_some()
    }

    /// Cancel the live raster task, if any. Does not wait.
    pub fn cancel(&self) -> bool {
        let Some(active) = self.active.borrow_mut().take() else {
            return false;
        };
        debug!(
            "page {}: cancelling render task {:?}",
            self.page_number, active.id
        );
        active.task.cancel();
        true
    }

    /// Cancel and release the canvas and every overlay
    pub fn clear(&self) {
        self.cancel();
        self.surfaces.borrow_mut().release();
    }

    /// Render `page` with `geometry`; the latest call wins.
    pub async fn render(
        &self,
        page: &dyn PageHandle,
        geometry: &PageGeometry,
        context: RenderContext<'_>,
    ) -> RenderStatus {
        self.cancel();

        let id = self.next_id();
        let (width, height) = geometry.raster_viewport.pixel_size();
        {
            let mut surfaces = self.surfaces.borrow_mut();
            surfaces.canvas.claim(id, width, height);
            surfaces.clear_overlays();
        }

        debug!(
            "page {}: starting render task {:?} at {}x{}",
            self.page_number, id, width, height
        );
        let task = page.render(RasterRequest {
            viewport: geometry.raster_viewport.clone(),
            intent: RenderIntent::Display,
        });
        *self.active.borrow_mut() = Some(ActiveTask {
            id,
            task: task.clone(),
        });

        let overlay_viewport = geometry.layout_viewport.unflipped();
        let (raster, text, annotations) = futures::join!(
            self.raster_layer(id, task),
            self.text_layer(id, page, &overlay_viewport, context.layers.text),
            self.annotation_layer(id, page, &overlay_viewport, context),
        );

        if !self.is_current(id) {
            return RenderStatus::Cancelled;
        }
        self.active.borrow_mut().take();

        let result = raster.and(text).and(annotations);
        if let Err(fault) = &result {
            if !fault.is_cancelled() {
                debug!("page {}: render failed, releasing surfaces", self.page_number);
                self.surfaces.borrow_mut().release();
            }
        }
        RenderStatus::from_result(result)
    }

    async fn raster_layer(&self, id: TaskId, task: RenderTaskRef) -> Result<(), RenderFault> {
        match task.completion().await {
            RenderOutcome::Completed(pixmap) => {
                if !self.is_current(id) {
                    return Err(RenderFault::Cancelled);
                }
                self.surfaces.borrow_mut().canvas.draw(id, &pixmap)
            }
            RenderOutcome::Cancelled => Err(RenderFault::Cancelled),
            RenderOutcome::Failed(error) => Err(error.into()),
        }
    }

    async fn text_layer(
        &self,
        id: TaskId,
        page: &dyn PageHandle,
        viewport: &Viewport,
        enabled: bool,
    ) -> Result<(), RenderFault> {
        if !enabled {
            return Ok(());
        }

        let content = page.text_content().await?;
        if !self.is_current(id) {
            return Err(RenderFault::Cancelled);
        }

        let spans = layout_text(&content, viewport);
        self.surfaces
            .borrow_mut()
            .text
            .fill(viewport.width, viewport.height, spans);
        Ok(())
    }

    async fn annotation_layer(
        &self,
        id: TaskId,
        page: &dyn PageHandle,
        viewport: &Viewport,
        context: RenderContext<'_>,
    ) -> Result<(), RenderFault> {
        if !context.layers.annotations {
            return Ok(());
        }

        // One fetch serves both the annotation and the form overlay.
        let annotations = page.annotations(AnnotationIntent::Display).await?;
        if !self.is_current(id) {
            return Err(RenderFault::Cancelled);
        }

        let layout = AnnotationLayout {
            image_resources_path: context.image_resources_path,
            skip_widgets: context.layers.forms,
        };
        let regions = layout_annotations(&annotations, viewport, layout);

        let mut surfaces = self.surfaces.borrow_mut();
        surfaces
            .annotations
            .fill(viewport.width, viewport.height, regions);
        if context.layers.forms {
            let fields = derive_form_fields(&annotations, viewport);
            surfaces.forms.fill(viewport.width, viewport.height, fields);
        }
        Ok(())
    }

    fn is_current(&self, id: TaskId) -> bool {
        self.active
            .borrow()
            .as_ref()
            .is_some_and(|active| active.id == id)
    }

    fn next_id(&self) -> TaskId {
        let id = self.next_task_id.get();
        self.next_task_id.set(id + 1);
        TaskId::new(id)
    }
}
