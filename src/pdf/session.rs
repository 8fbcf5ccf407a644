//! Document session: owns the document and one controller per page

use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::rc::Rc;

use flume::Receiver;
use futures::FutureExt;
use futures::channel::oneshot;
use log::{debug, info, warn};
use tokio::sync::Notify;

use super::controller::{ControllerContext, PageController, PageProps};
use super::engine::{DocumentRef, DocumentSource, EngineError, LoadProgress, PdfEngine};
use super::events::{EventSink, ViewerEvent};
use super::export::{ExportFault, HostPlatform, PrintOptions, download_document, print_pages};
use super::link_service::{LinkService, SimpleLinkService};
use super::router::VisibilityRouter;
use super::state::{Command, PageState};
use crate::settings::ViewerOptions;

/// The single configured page when it exists, otherwise every page
#[must_use]
pub fn page_sequence(page: Option<u32>, page_count: u32) -> Vec<u32> {
    match page {
        Some(page) if (1..=page_count).contains(&page) => vec![page],
        Some(page) => {
            warn!("page {page} is outside document of {page_count} pages, showing all");
            (1..=page_count).collect()
        }
        None => (1..=page_count).collect(),
    }
}

/// Entry point for hosts: load a document, feed visibility, export.
pub struct DocumentSession {
    engine: Rc<dyn PdfEngine>,
    host: Rc<dyn HostPlatform>,
    options: RefCell<ViewerOptions>,
    container_width: Cell<Option<f64>>,
    events: EventSink,
    receiver: Receiver<ViewerEvent>,
    link_service: Rc<dyn LinkService>,
    router: RefCell<Rc<VisibilityRouter>>,
    layout: Rc<Notify>,
    document: RefCell<Option<DocumentRef>>,
    controllers: RefCell<Vec<Rc<PageController>>>,
    load_generation: Cell<u64>,
}

impl DocumentSession {
    #[must_use]
    pub fn new(
        engine: Rc<dyn PdfEngine>,
        host: Rc<dyn HostPlatform>,
        options: ViewerOptions,
    ) -> Self {
        let (events, receiver) = EventSink::channel();
        let link_service = Rc::new(SimpleLinkService::new(events.clone()));
        Self {
            engine,
            host,
            options: RefCell::new(options),
            container_width: Cell::new(None),
            events,
            receiver,
            link_service,
            router: RefCell::new(Rc::new(VisibilityRouter::default())),
            layout: Rc::new(Notify::new()),
            document: RefCell::new(None),
            controllers: RefCell::new(Vec::new()),
            load_generation: Cell::new(0),
        }
    }

    /// Use a host-supplied link service instead of [`SimpleLinkService`]
    #[must_use]
    pub fn with_link_service(mut self, link_service: Rc<dyn LinkService>) -> Self {
        self.link_service = link_service;
        self
    }

    /// Event stream for the host
    #[must_use]
    pub fn events(&self) -> &Receiver<ViewerEvent> {
        &self.receiver
    }

    /// Drain pending events without waiting
    pub fn poll_events(&self) -> Vec<ViewerEvent> {
        self.receiver.try_iter().collect()
    }

    #[must_use]
    pub fn options(&self) -> ViewerOptions {
        self.options.borrow().clone()
    }

    #[must_use]
    pub fn page_count(&self) -> u32 {
        self.document
            .borrow()
            .as_ref()
            .map_or(0, |document| document.page_count())
    }

    /// Page numbers with a controller, in display order
    #[must_use]
    pub fn pages(&self) -> Vec<u32> {
        self.controllers
            .borrow()
            .iter()
            .map(|controller| controller.page_number())
            .collect()
    }

    #[must_use]
    pub fn controller(&self, page: u32) -> Option<Rc<PageController>> {
        self.controllers
            .borrow()
            .iter()
            .find(|controller| controller.page_number() == page)
            .cloned()
    }

    #[must_use]
    pub fn visible_pages(&self) -> BTreeSet<u32> {
        self.router.borrow().visible()
    }

    #[must_use]
    pub fn render_set(&self) -> BTreeSet<u32> {
        self.router.borrow().render_set()
    }

    /// Load a document, replacing the current one on success.
    ///
    /// Failures are also reported as events; the page sequence is empty
    /// afterwards.
    pub async fn load(&self, source: DocumentSource) -> Result<u32, EngineError> {
        let generation = self.load_generation.get() + 1;
        self.load_generation.set(generation);

        let events = self.events.clone();
        let progress = move |progress: LoadProgress| events.emit(ViewerEvent::Progress(progress));
        let result = self.engine.load(&source, &progress).await;

        if self.load_generation.get() != generation {
            debug!("discarding superseded document load");
            if let Ok(document) = result {
                document.destroy();
            }
            return Err(EngineError::Load("superseded by a newer load".into()));
        }

        match result {
            Ok(document) => Ok(self.install(document)),
            Err(error) => {
                self.reset();
                match &error {
                    EngineError::PasswordRequired { wrong_password } => {
                        info!("document needs a password (wrong: {wrong_password})");
                        self.events.emit(ViewerEvent::PasswordRequested {
                            wrong_password: *wrong_password,
                        });
                    }
                    _ => {
                        warn!("document load failed: {error}");
                        self.events.emit(ViewerEvent::LoadingFailed(error.clone()));
                    }
                }
                Err(error)
            }
        }
    }

    fn install(&self, document: DocumentRef) -> u32 {
        self.reset();

        let page_count = document.page_count();
        info!("loaded document with {page_count} pages");
        self.link_service.set_page_count(page_count);
        let router = Rc::new(VisibilityRouter::new(page_count));
        *self.router.borrow_mut() = Rc::clone(&router);
        *self.document.borrow_mut() = Some(Rc::clone(&document));
        self.events.emit(ViewerEvent::Loaded { page_count });

        let pages = page_sequence(self.options.borrow().page, page_count);
        let (tx, rx) = oneshot::channel();
        let context = ControllerContext {
            slot: rx.shared(),
            router: Rc::clone(&router),
            events: self.events.clone(),
            link_service: Rc::clone(&self.link_service),
            layout: Rc::clone(&self.layout),
        };
        let props = self.page_props();
        let controllers: Vec<_> = pages
            .iter()
            .map(|&page| PageController::new(page, props.clone(), context.clone()))
            .collect();
        for controller in &controllers {
            router.register(controller);
            controller.apply(Command::Mount);
        }
        *self.controllers.borrow_mut() = controllers;

        if tx.send(document).is_err() {
            warn!("no controller is waiting for the document");
        }
        if !pages.is_empty() {
            self.events.emit(ViewerEvent::Rendered);
        }
        page_count
    }

    /// Unmount every controller and destroy the document
    fn reset(&self) {
        let controllers = std::mem::take(&mut *self.controllers.borrow_mut());
        for controller in &controllers {
            controller.apply(Command::Unmount);
        }
        let document = self.document.borrow_mut().take();
        if let Some(document) = document {
            debug!("destroying previous document");
            document.destroy();
        }
        self.layout.notify_waiters();
    }

    /// Tear everything down; the session can load again afterwards.
    pub fn unmount(&self) {
        self.load_generation.set(self.load_generation.get() + 1);
        self.reset();
        *self.router.borrow_mut() = Rc::new(VisibilityRouter::default());
    }

    /// Feed an intersection report for `page`. Reports for pages still
    /// being measured take effect once the page is measured.
    pub fn report_intersection(&self, page: u32, fraction: f64) {
        let router = Rc::clone(&self.router.borrow());
        router.report(page, fraction);
    }

    /// Wait until no controller is still waiting for the document or
    /// measuring its page.
    pub async fn wait_for_layout(&self) {
        loop {
            let settled = self.layout.notified();
            if !self.layout_pending() {
                return;
            }
            settled.await;
        }
    }

    fn layout_pending(&self) -> bool {
        self.controllers.borrow().iter().any(|controller| {
            matches!(
                controller.state(),
                PageState::Uninitialized | PageState::Probing
            )
        })
    }

    pub fn set_container_width(&self, width: f64) {
        if self.container_width.replace(Some(width)) != Some(width) {
            self.push_props();
        }
    }

    /// Replace the options; every controller sees the change.
    pub fn update_options(&self, options: ViewerOptions) {
        if *self.options.borrow() == options {
            return;
        }
        *self.options.borrow_mut() = options;
        self.push_props();
    }

    /// Activate the `index`-th annotation link on `page`
    pub fn activate_link(&self, page: u32, index: usize) -> bool {
        self.controller(page)
            .is_some_and(|controller| controller.activate_link(index))
    }

    /// Save the document bytes through the host
    pub async fn download(&self, filename: Option<&str>) -> Result<(), ExportFault> {
        let Some(document) = self.document.borrow().clone() else {
            debug!("download requested without a document");
            return Ok(());
        };
        download_document(&document, filename, self.host.as_ref()).await
    }

    /// Render the selected pages off-screen and open the host print dialog.
    pub async fn print(&self, options: PrintOptions) -> Result<(), ExportFault> {
        let Some(document) = self.document.borrow().clone() else {
            debug!("print requested without a document");
            return Ok(());
        };
        let page_count = document.page_count();
        let pages = match self.options.borrow().page {
            Some(page) if !options.all_pages && (1..=page_count).contains(&page) => vec![page],
            _ => (1..=page_count).collect(),
        };
        print_pages(&document, &pages, &options, self.host.as_ref()).await
    }

    fn page_props(&self) -> PageProps {
        let options = self.options.borrow();
        PageProps {
            scale: options.scale,
            rotation: options.rotation,
            width: options.width,
            height: options.height,
            container_width: self.container_width.get(),
            device_pixel_ratio: options.device_pixel_ratio,
            layers: options.layer_flags(),
            image_resources_path: options.image_resources_path.clone(),
        }
    }

    fn push_props(&self) {
        let props = self.page_props();
        let controllers = self.controllers.borrow().clone();
        for controller in controllers {
            controller.set_props(props.clone());
        }
    }
}

impl Drop for DocumentSession {
    fn drop(&mut self) {
        self.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_page_sequence_when_in_range() {
        assert_eq!(page_sequence(Some(3), 5), vec![3]);
        assert_eq!(page_sequence(None, 3), vec![1, 2, 3]);
        assert_eq!(page_sequence(Some(9), 2), vec![1, 2]);
        assert!(page_sequence(None, 0).is_empty());
    }
}
