//! Page controller: executes lifecycle effects for one page

use std::cell::{Cell, Ref, RefCell};
use std::rc::Rc;

use futures::channel::oneshot;
use futures::future::Shared;
use log::{debug, warn};
use tokio::sync::Notify;

use super::engine::{DocumentRef, EngineError, PageHandle, PageRef};
use super::events::{EventSink, ViewerEvent};
use super::geometry::{GeometryError, GeometryRequest, PageGeometry, resolve};
use super::link_service::LinkService;
use super::pipeline::{RenderContext, RenderPipeline};
use super::request::{RenderFault, RenderStatus};
use super::router::VisibilityRouter;
use super::state::{Command, Effect, PageLifecycle, PageState};
use super::surface::PageSurfaces;
use super::types::LayerFlags;

/// One-shot notification carrying the loaded document to every controller
pub type DocumentSlot = Shared<oneshot::Receiver<DocumentRef>>;

/// Per-page copy of the viewer options
#[derive(Clone, Debug, PartialEq)]
pub struct PageProps {
    pub scale: f64,
    pub rotation: i32,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub container_width: Option<f64>,
    pub device_pixel_ratio: f64,
    pub layers: LayerFlags,
    pub image_resources_path: Option<String>,
}

impl Default for PageProps {
    fn default() -> Self {
        Self {
            scale: 1.0,
            rotation: 0,
            width: None,
            height: None,
            container_width: None,
            device_pixel_ratio: 1.0,
            layers: LayerFlags::default(),
            image_resources_path: None,
        }
    }
}

impl PageProps {
    fn geometry_request(&self, page: &dyn PageHandle) -> GeometryRequest {
        GeometryRequest {
            content_box: page.view_box(),
            intrinsic_rotation: page.rotate(),
            rotation: self.rotation,
            scale: self.scale,
            width: self.width,
            height: self.height,
            container_width: self.container_width,
            device_pixel_ratio: self.device_pixel_ratio,
        }
    }
}

/// Shared collaborators handed to every controller of a session
#[derive(Clone)]
pub struct ControllerContext {
    pub slot: DocumentSlot,
    pub router: Rc<VisibilityRouter>,
    pub events: EventSink,
    pub link_service: Rc<dyn LinkService>,
    /// Signalled whenever a page settles its measurement or is torn down
    pub layout: Rc<Notify>,
}

/// Owns one page's handle, render pipeline and lifecycle.
///
/// Async effect bodies run as local tasks and carry the generation they were
/// started in; cleanup and teardown bump the generation so stale work drops
/// its result.
pub struct PageController {
    page_number: u32,
    lifecycle: RefCell<PageLifecycle>,
    props: RefCell<PageProps>,
    pipeline: RenderPipeline,
    document: RefCell<Option<DocumentRef>>,
    page: RefCell<Option<PageRef>>,
    layout_size: Cell<Option<(u32, u32)>>,
    generation: Cell<u64>,
    context: ControllerContext,
}

impl PageController {
    #[must_use]
    pub fn new(page_number: u32, props: PageProps, context: ControllerContext) -> Rc<Self> {
        Rc::new(Self {
            page_number,
            lifecycle: RefCell::new(PageLifecycle::new()),
            props: RefCell::new(props),
            pipeline: RenderPipeline::new(page_number),
            document: RefCell::new(None),
            page: RefCell::new(None),
            layout_size: Cell::new(None),
            generation: Cell::new(0),
            context,
        })
    }

    #[must_use]
    pub fn page_number(&self) -> u32 {
        self.page_number
    }

    #[must_use]
    pub fn state(&self) -> PageState {
        self.lifecycle.borrow().state
    }

    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.lifecycle.borrow().registered
    }

    /// Whole-pixel size of the page box, once measured
    #[must_use]
    pub fn layout_size(&self) -> Option<(u32, u32)> {
        self.layout_size.get()
    }

    pub fn surfaces(&self) -> Ref<'_, PageSurfaces> {
        self.pipeline.surfaces()
    }

    #[must_use]
    pub fn has_live_task(&self) -> bool {
        self.pipeline.has_live_task()
    }

    /// The page handle is currently held
    #[must_use]
    pub fn holds_page(&self) -> bool {
        self.page.borrow().is_some()
    }

    #[must_use]
    pub fn props(&self) -> PageProps {
        self.props.borrow().clone()
    }

    /// Replace the props; dispatches `PropsChanged` when they differ.
    pub fn set_props(self: &Rc<Self>, props: PageProps) {
        if *self.props.borrow() == props {
            return;
        }
        *self.props.borrow_mut() = props;
        self.apply(Command::PropsChanged);
    }

    /// Navigate through the `index`-th annotation on the page, if it is a link.
    pub fn activate_link(&self, index: usize) -> bool {
        let target = self
            .pipeline
            .surfaces()
            .annotations
            .items
            .get(index)
            .and_then(|region| region.link.clone());
        match target {
            Some(target) => {
                self.context.link_service.navigate(&target);
                true
            }
            None => false,
        }
    }

    /// Apply a lifecycle command and execute its effects
    pub fn apply(self: &Rc<Self>, cmd: Command) {
        let effects = self.lifecycle.borrow_mut().apply(cmd);
        if !effects.is_empty() {
            debug!("page {}: {cmd:?} -> {effects:?}", self.page_number);
        }
        for effect in effects {
            self.run(effect);
        }
    }

    fn run(self: &Rc<Self>, effect: Effect) {
        match effect {
            Effect::AwaitDocument => {
                let this = Rc::clone(self);
                let generation = self.generation.get();
                tokio::task::spawn_local(async move { this.await_document(generation).await });
            }
            Effect::Probe => {
                let this = Rc::clone(self);
                let generation = self.generation.get();
                tokio::task::spawn_local(async move { this.probe(generation).await });
            }
            Effect::Observe => self.context.router.observe(self.page_number),
            Effect::Render => {
                let this = Rc::clone(self);
                let generation = self.generation.get();
                tokio::task::spawn_local(async move { this.render(generation).await });
            }
            Effect::Measure => {
                let this = Rc::clone(self);
                let generation = self.generation.get();
                tokio::task::spawn_local(async move { this.measure(generation).await });
            }
            Effect::Cleanup => self.cleanup(),
            Effect::Unobserve => self.context.router.unobserve(self.page_number),
            Effect::Teardown => {
                self.cleanup();
                self.document.borrow_mut().take();
                self.layout_size.set(None);
                self.context.layout.notify_waiters();
            }
        }
    }

    async fn await_document(self: Rc<Self>, generation: u64) {
        let Ok(document) = self.context.slot.clone().await else {
            debug!("page {}: document slot dropped", self.page_number);
            return;
        };
        if !self.is_current(generation) {
            return;
        }
        *self.document.borrow_mut() = Some(document);
        self.apply(Command::DocumentReady);
    }

    async fn probe(self: Rc<Self>, generation: u64) {
        let measured = match self.fetch_page(generation).await {
            Ok(page) => Self::geometry(&*page, &self.props()),
            Err(error) => Err(error.into()),
        };
        if !self.is_current(generation) {
            return;
        }

        match measured {
            Ok(geometry) => {
                self.layout_size.set(Some(geometry.box_size()));
                self.apply(Command::ProbeSucceeded);
            }
            Err(RenderFault::Geometry(GeometryError::MissingWidth)) => {
                debug!("page {}: no width yet, measuring later", self.page_number);
                self.release_page();
                self.apply(Command::ProbeDeferred);
            }
            Err(error) => {
                self.release_page();
                self.report(generation, RenderStatus::Failed(error));
                self.apply(Command::ProbeFailed);
            }
        }
        self.context.layout.notify_waiters();
    }

    async fn measure(self: Rc<Self>, generation: u64) {
        let held = self.page.borrow().clone();
        let page = match held {
            Some(page) => page,
            None => match self.document().page(self.page_number).await {
                Ok(page) => {
                    page.cleanup();
                    page
                }
                Err(error) => {
                    warn!("page {}: measure failed: {error}", self.page_number);
                    return;
                }
            },
        };
        if self.is_current(generation) {
            self.update_layout(&*page);
        }
    }

    async fn render(self: Rc<Self>, generation: u64) {
        let page = match self.fetch_page(generation).await {
            Ok(page) => page,
            Err(error) => {
                self.report(generation, RenderStatus::Failed(error.into()));
                return;
            }
        };
        if !self.is_current(generation) {
            return;
        }

        let props = self.props();
        let geometry = match Self::geometry(&*page, &props) {
            Ok(geometry) => geometry,
            Err(error) => {
                self.report(generation, RenderStatus::Failed(error));
                return;
            }
        };
        self.layout_size.set(Some(geometry.box_size()));

        let context = RenderContext {
            layers: props.layers,
            image_resources_path: props.image_resources_path.as_deref(),
        };
        let status = self.pipeline.render(&*page, &geometry, context).await;
        self.report(generation, status);
    }

    fn report(&self, generation: u64, status: RenderStatus) {
        if !self.is_current(generation) {
            return;
        }
        match status {
            RenderStatus::Rendered => {
                debug!("page {}: rendered", self.page_number);
                self.context.events.emit(ViewerEvent::PageRendered {
                    page: self.page_number,
                });
            }
            RenderStatus::Cancelled => {
                debug!("page {}: render cancelled", self.page_number);
            }
            RenderStatus::Failed(error) => {
                warn!("page {}: render failed: {error}", self.page_number);
                self.context.events.emit(ViewerEvent::RenderingFailed {
                    page: self.page_number,
                    error,
                });
            }
        }
    }

    fn cleanup(&self) {
        self.bump_generation();
        self.pipeline.clear();
        self.release_page();
    }

    fn release_page(&self) {
        let page = self.page.borrow_mut().take();
        if let Some(page) = page {
            page.cleanup();
        }
    }

    fn geometry(page: &dyn PageHandle, props: &PageProps) -> Result<PageGeometry, RenderFault> {
        Ok(resolve(&props.geometry_request(page))?)
    }

    fn update_layout(&self, page: &dyn PageHandle) {
        match Self::geometry(page, &self.props()) {
            Ok(geometry) => self.layout_size.set(Some(geometry.box_size())),
            Err(error) => {
                debug!("page {}: layout unresolved: {error}", self.page_number);
                self.layout_size.set(None);
            }
        }
    }

    /// Held page handle, fetching it on first use
    async fn fetch_page(&self, generation: u64) -> Result<PageRef, EngineError> {
        if let Some(page) = self.page.borrow().clone() {
            return Ok(page);
        }
        let page = self.document().page(self.page_number).await?;
        if self.is_current(generation) {
            *self.page.borrow_mut() = Some(Rc::clone(&page));
        }
        Ok(page)
    }

    fn document(&self) -> DocumentHandleRef {
        DocumentHandleRef(self.document.borrow().clone())
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.get() == generation && !self.lifecycle.borrow().is_torn_down()
    }

    fn bump_generation(&self) {
        self.generation.set(self.generation.get() + 1);
    }
}

/// The controller's document, which may not have arrived yet
struct DocumentHandleRef(Option<DocumentRef>);

impl DocumentHandleRef {
    async fn page(&self, number: u32) -> Result<PageRef, EngineError> {
        match &self.0 {
            Some(document) => document.page(number).await,
            None => Err(EngineError::fetch("page", "document not loaded")),
        }
    }
}
