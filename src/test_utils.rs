pub mod test_helpers {
    //! In-memory engine and host used by unit and integration tests

    use std::cell::{Cell, RefCell};
    use std::collections::BTreeMap;
    use std::rc::Rc;

    use async_trait::async_trait;
    use tokio::sync::watch;

    use crate::pdf::{
        Annotation, AnnotationIntent, ContentBox, DocumentHandle, DocumentMetadata, DocumentRef,
        DocumentSource, EngineError, ExportFault, HostPlatform, LoadProgress, PageHandle, PageRef,
        PdfEngine, Pixmap, PrintJob, RasterRequest, RenderOutcome, RenderTask, RenderTaskRef,
        TextContent,
    };

    /// Shape and behaviour of one fake page
    #[derive(Clone, Debug)]
    pub struct FakePageSpec {
        pub view_box: ContentBox,
        pub rotate: i32,
        pub text: TextContent,
        pub annotations: Vec<Annotation>,
        pub fail_fetch: bool,
        pub fail_render: bool,
        pub fail_text: bool,
    }

    impl Default for FakePageSpec {
        fn default() -> Self {
            Self {
                view_box: [0.0, 0.0, 600.0, 800.0],
                rotate: 0,
                text: TextContent::default(),
                annotations: Vec::new(),
                fail_fetch: false,
                fail_render: false,
                fail_text: false,
            }
        }
    }

    /// Counters shared by a document, its pages and their render tasks
    #[derive(Debug, Default)]
    pub struct FakeStats {
        pub page_fetches: Cell<usize>,
        pub renders_started: Cell<usize>,
        pub cancelled: Cell<usize>,
        pub live_tasks: Cell<usize>,
        pub annotation_fetches: Cell<usize>,
        pub cleanups: Cell<usize>,
        pub destroyed: Cell<bool>,
        live_by_page: RefCell<BTreeMap<u32, usize>>,
        max_live_by_page: RefCell<BTreeMap<u32, usize>>,
    }

    impl FakeStats {
        /// Highest number of simultaneously live tasks seen for `page`
        pub fn max_live_tasks_for(&self, page: u32) -> usize {
            self.max_live_by_page
                .borrow()
                .get(&page)
                .copied()
                .unwrap_or(0)
        }

        pub fn live_tasks_for(&self, page: u32) -> usize {
            self.live_by_page.borrow().get(&page).copied().unwrap_or(0)
        }

        fn task_started(&self, page: u32) {
            self.renders_started.set(self.renders_started.get() + 1);
            self.live_tasks.set(self.live_tasks.get() + 1);
            let mut live = self.live_by_page.borrow_mut();
            let count = live.entry(page).or_default();
            *count += 1;
            let mut max = self.max_live_by_page.borrow_mut();
            let peak = max.entry(page).or_default();
            *peak = (*peak).max(*count);
        }

        fn task_settled(&self, page: u32) {
            self.live_tasks.set(self.live_tasks.get() - 1);
            if let Some(count) = self.live_by_page.borrow_mut().get_mut(&page) {
                *count -= 1;
            }
        }
    }

    /// A document whose pages are described by [`FakePageSpec`]s.
    ///
    /// Renders complete as soon as they are awaited unless the document is
    /// holding them with [`FakeDocument::hold_renders`].
    pub struct FakeDocument {
        pages: Vec<FakePageSpec>,
        data: Vec<u8>,
        metadata: DocumentMetadata,
        stats: Rc<FakeStats>,
        gate: watch::Sender<bool>,
    }

    impl FakeDocument {
        pub fn new(pages: Vec<FakePageSpec>) -> Self {
            let (gate, _) = watch::channel(true);
            Self {
                pages,
                data: b"%PDF-1.7 fake".to_vec(),
                metadata: DocumentMetadata::default(),
                stats: Rc::new(FakeStats::default()),
                gate,
            }
        }

        pub fn with_pages(count: u32) -> Self {
            Self::new(vec![FakePageSpec::default(); count as usize])
        }

        pub fn with_data(mut self, data: Vec<u8>) -> Self {
            self.data = data;
            self
        }

        pub fn with_title(mut self, title: &str) -> Self {
            self.metadata.title = Some(title.into());
            self
        }

        pub fn with_suggested_filename(mut self, filename: &str) -> Self {
            self.metadata.content_disposition_filename = Some(filename.into());
            self
        }

        pub fn stats(&self) -> Rc<FakeStats> {
            Rc::clone(&self.stats)
        }

        /// Keep every render pending until [`FakeDocument::release_renders`]
        pub fn hold_renders(&self) {
            self.gate.send_replace(false);
        }

        pub fn release_renders(&self) {
            self.gate.send_replace(true);
        }
    }

    #[async_trait(?Send)]
    impl DocumentHandle for FakeDocument {
        fn page_count(&self) -> u32 {
            self.pages.len() as u32
        }

        async fn page(&self, number: u32) -> Result<PageRef, EngineError> {
            self.stats.page_fetches.set(self.stats.page_fetches.get() + 1);
            let index = number
                .checked_sub(1)
                .ok_or_else(|| EngineError::fetch("page", "page numbers start at 1"))?;
            let spec = self
                .pages
                .get(index as usize)
                .ok_or_else(|| EngineError::fetch("page", format!("no page {number}")))?;
            if spec.fail_fetch {
                return Err(EngineError::fetch("page", format!("page {number} is broken")));
            }
            Ok(Rc::new(FakePage {
                number,
                spec: spec.clone(),
                stats: Rc::clone(&self.stats),
                gate: self.gate.subscribe(),
            }))
        }

        async fn data(&self) -> Result<Vec<u8>, EngineError> {
            Ok(self.data.clone())
        }

        async fn metadata(&self) -> Result<DocumentMetadata, EngineError> {
            Ok(self.metadata.clone())
        }

        fn destroy(&self) {
            self.stats.destroyed.set(true);
        }
    }

    pub struct FakePage {
        number: u32,
        spec: FakePageSpec,
        stats: Rc<FakeStats>,
        gate: watch::Receiver<bool>,
    }

    #[async_trait(?Send)]
    impl PageHandle for FakePage {
        fn number(&self) -> u32 {
            self.number
        }

        fn view_box(&self) -> ContentBox {
            self.spec.view_box
        }

        fn rotate(&self) -> i32 {
            self.spec.rotate
        }

        fn render(&self, request: RasterRequest) -> RenderTaskRef {
            self.stats.task_started(self.number);
            let (cancel, _) = watch::channel(false);
            Rc::new(FakeRenderTask {
                page: self.number,
                size: request.viewport.pixel_size(),
                fail: self.spec.fail_render,
                stats: Rc::clone(&self.stats),
                gate: self.gate.clone(),
                cancel,
                settled: Cell::new(false),
            })
        }

        async fn text_content(&self) -> Result<TextContent, EngineError> {
            if self.spec.fail_text {
                return Err(EngineError::fetch("text content", "stream is corrupt"));
            }
            Ok(self.spec.text.clone())
        }

        async fn annotations(
            &self,
            _intent: AnnotationIntent,
        ) -> Result<Vec<Annotation>, EngineError> {
            self.stats
                .annotation_fetches
                .set(self.stats.annotation_fetches.get() + 1);
            Ok(self.spec.annotations.clone())
        }

        fn cleanup(&self) {
            self.stats.cleanups.set(self.stats.cleanups.get() + 1);
        }
    }

    pub struct FakeRenderTask {
        page: u32,
        size: (u32, u32),
        fail: bool,
        stats: Rc<FakeStats>,
        gate: watch::Receiver<bool>,
        cancel: watch::Sender<bool>,
        settled: Cell<bool>,
    }

    impl FakeRenderTask {
        fn settle(&self) {
            if !self.settled.replace(true) {
                self.stats.task_settled(self.page);
            }
        }
    }

    #[async_trait(?Send)]
    impl RenderTask for FakeRenderTask {
        fn cancel(&self) {
            if self.settled.get() {
                return;
            }
            self.cancel.send_replace(true);
            self.stats.cancelled.set(self.stats.cancelled.get() + 1);
            self.settle();
        }

        async fn completion(&self) -> RenderOutcome {
            let mut gate = self.gate.clone();
            let mut cancelled = self.cancel.subscribe();
            tokio::select! {
                biased;
                _ = cancelled.wait_for(|c| *c) => {}
                _ = gate.wait_for(|open| *open) => {}
            }

            if *self.cancel.borrow() {
                return RenderOutcome::Cancelled;
            }
            self.settle();
            if self.fail {
                return RenderOutcome::Failed(EngineError::Render(format!(
                    "page {} raster failed",
                    self.page
                )));
            }

            let (width, height) = self.size;
            let shade = (self.page % 256) as u8;
            let pixels = [shade, 0x80, 0x40, 0xFF].repeat(width as usize * height as usize);
            RenderOutcome::Completed(Pixmap {
                width,
                height,
                pixels,
            })
        }
    }

    /// Engine serving one prepared document
    pub struct FakeEngine {
        document: RefCell<Option<Rc<FakeDocument>>>,
        password: Option<String>,
        failure: Option<String>,
        loads: Cell<usize>,
    }

    impl FakeEngine {
        pub fn new(document: FakeDocument) -> Self {
            Self {
                document: RefCell::new(Some(Rc::new(document))),
                password: None,
                failure: None,
                loads: Cell::new(0),
            }
        }

        /// Every load fails with `EngineError::Load(message)`
        pub fn failing(message: &str) -> Self {
            Self {
                document: RefCell::new(None),
                password: None,
                failure: Some(message.into()),
                loads: Cell::new(0),
            }
        }

        pub fn with_password(mut self, password: &str) -> Self {
            self.password = Some(password.into());
            self
        }

        /// Serve `document` to the next load
        pub fn replace_document(&self, document: FakeDocument) {
            *self.document.borrow_mut() = Some(Rc::new(document));
        }

        pub fn document(&self) -> Option<Rc<FakeDocument>> {
            self.document.borrow().clone()
        }

        pub fn loads(&self) -> usize {
            self.loads.get()
        }
    }

    #[async_trait(?Send)]
    impl PdfEngine for FakeEngine {
        async fn load(
            &self,
            source: &DocumentSource,
            progress: &dyn Fn(LoadProgress),
        ) -> Result<DocumentRef, EngineError> {
            self.loads.set(self.loads.get() + 1);
            tokio::task::yield_now().await;

            if let Some(message) = &self.failure {
                return Err(EngineError::Load(message.clone()));
            }
            if let Some(expected) = &self.password {
                match &source.password {
                    None => return Err(EngineError::PasswordRequired { wrong_password: false }),
                    Some(given) if given != expected => {
                        return Err(EngineError::PasswordRequired { wrong_password: true });
                    }
                    Some(_) => {}
                }
            }

            let document = self
                .document()
                .ok_or_else(|| EngineError::Load("no document prepared".into()))?;
            let total = document.data.len() as u64;
            progress(LoadProgress {
                loaded: total / 2,
                total: Some(total),
            });
            progress(LoadProgress {
                loaded: total,
                total: Some(total),
            });
            Ok(document)
        }
    }

    /// Host that records every request
    #[derive(Default)]
    pub struct FakeHost {
        title: RefCell<String>,
        titles_set: RefCell<Vec<String>>,
        print_jobs: RefCell<Vec<PrintJob>>,
        saved: RefCell<Vec<(Vec<u8>, String)>>,
        reject_print: Cell<bool>,
    }

    impl FakeHost {
        pub fn new(title: &str) -> Self {
            Self {
                title: RefCell::new(title.into()),
                ..Self::default()
            }
        }

        pub fn reject_print(&self) {
            self.reject_print.set(true);
        }

        pub fn title(&self) -> String {
            self.title.borrow().clone()
        }

        pub fn titles_set(&self) -> Vec<String> {
            self.titles_set.borrow().clone()
        }

        pub fn print_jobs(&self) -> Vec<PrintJob> {
            self.print_jobs.borrow().clone()
        }

        pub fn saved(&self) -> Vec<(Vec<u8>, String)> {
            self.saved.borrow().clone()
        }
    }

    #[async_trait(?Send)]
    impl HostPlatform for FakeHost {
        fn document_title(&self) -> String {
            self.title()
        }

        fn set_document_title(&self, title: &str) {
            *self.title.borrow_mut() = title.into();
            self.titles_set.borrow_mut().push(title.into());
        }

        async fn print(&self, job: PrintJob) -> Result<(), ExportFault> {
            if self.reject_print.get() {
                return Err(ExportFault::host("print dialog unavailable"));
            }
            self.print_jobs.borrow_mut().push(job);
            Ok(())
        }

        async fn save(&self, data: Vec<u8>, filename: &str) -> Result<(), ExportFault> {
            self.saved.borrow_mut().push((data, filename.into()));
            Ok(())
        }
    }
}

pub use test_helpers::*;
