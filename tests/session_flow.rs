use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;
use std::time::Duration;

use pdfpane::pdf::{
    Annotation, DocumentSession, DocumentSource, EngineError, LinkService, LinkTarget,
    LoadProgress, PageState, RenderFault, ViewerEvent,
};
use pdfpane::settings::ViewerOptions;
use pdfpane::test_utils::{FakeDocument, FakeEngine, FakeHost, FakePageSpec};
use tokio::task::LocalSet;

fn session_for(engine: &Rc<FakeEngine>, options: ViewerOptions) -> DocumentSession {
    let session = DocumentSession::new(engine.clone(), Rc::new(FakeHost::new("Viewer")), options);
    session.set_container_width(600.0);
    session
}

async fn next_event(session: &DocumentSession) -> ViewerEvent {
    tokio::time::timeout(Duration::from_secs(5), session.events().recv_async())
        .await
        .expect("timed out waiting for a viewer event")
        .expect("event channel closed")
}

/// Wait for `count` page outcomes; returns rendered pages and failures
async fn page_outcomes(
    session: &DocumentSession,
    count: usize,
) -> (BTreeSet<u32>, Vec<(u32, RenderFault)>) {
    let mut rendered = BTreeSet::new();
    let mut failed = Vec::new();
    while rendered.len() + failed.len() < count {
        match next_event(session).await {
            ViewerEvent::PageRendered { page } => {
                rendered.insert(page);
            }
            ViewerEvent::RenderingFailed { page, error } => failed.push((page, error)),
            _ => {}
        }
    }
    (rendered, failed)
}

async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

fn pages(list: &[u32]) -> BTreeSet<u32> {
    list.iter().copied().collect()
}

#[tokio::test]
async fn load_mounts_one_controller_per_page() {
    LocalSet::new()
        .run_until(async {
            let engine = Rc::new(FakeEngine::new(FakeDocument::with_pages(10)));
            let session = session_for(&engine, ViewerOptions::default());

            assert_eq!(session.load(DocumentSource::bytes(vec![1, 2, 3])).await, Ok(10));
            assert_eq!(
                session.poll_events(),
                vec![
                    ViewerEvent::Progress(LoadProgress {
                        loaded: 6,
                        total: Some(13)
                    }),
                    ViewerEvent::Progress(LoadProgress {
                        loaded: 13,
                        total: Some(13)
                    }),
                    ViewerEvent::Loaded { page_count: 10 },
                    ViewerEvent::Rendered,
                ]
            );
            assert_eq!(session.pages(), (1..=10).collect::<Vec<_>>());

            session.wait_for_layout().await;
            for page in 1..=10 {
                let controller = session.controller(page).unwrap();
                assert!(controller.is_registered());
                assert_eq!(controller.state(), PageState::Idle);
                assert_eq!(controller.layout_size(), Some((600, 800)));
                assert!(!controller.has_live_task());
            }
        })
        .await;
}

#[tokio::test]
async fn visible_page_renders_with_neighbours() {
    LocalSet::new()
        .run_until(async {
            let engine = Rc::new(FakeEngine::new(FakeDocument::with_pages(10)));
            let session = session_for(&engine, ViewerOptions::default());
            session.load(DocumentSource::bytes(vec![])).await.unwrap();
            session.wait_for_layout().await;
            session.poll_events();

            session.report_intersection(5, 0.05);
            assert!(session.render_set().is_empty());

            session.report_intersection(5, 0.5);
            assert_eq!(session.visible_pages(), pages(&[5]));
            assert_eq!(session.render_set(), pages(&[4, 5, 6]));

            let (rendered, failed) = page_outcomes(&session, 3).await;
            assert_eq!(rendered, pages(&[4, 5, 6]));
            assert!(failed.is_empty());

            for page in 1..=10 {
                let controller = session.controller(page).unwrap();
                let drawn = !controller.surfaces().canvas.is_blank();
                assert_eq!(drawn, (4..=6).contains(&page), "page {page}");
            }
            assert_eq!(
                session.controller(5).unwrap().surfaces().canvas.size(),
                (600, 800)
            );
        })
        .await;
}

#[tokio::test]
async fn report_before_measurement_renders_once_measured() {
    LocalSet::new()
        .run_until(async {
            let engine = Rc::new(FakeEngine::new(FakeDocument::with_pages(6)));
            let session = session_for(&engine, ViewerOptions::default());
            session.load(DocumentSource::bytes(vec![])).await.unwrap();

            // No page has been measured yet.
            session.report_intersection(2, 1.0);
            assert!(session.visible_pages().is_empty());

            let (rendered, failed) = page_outcomes(&session, 3).await;
            assert_eq!(rendered, pages(&[1, 2, 3]));
            assert!(failed.is_empty());
            assert_eq!(session.visible_pages(), pages(&[2]));
            assert_eq!(session.render_set(), pages(&[1, 2, 3]));
        })
        .await;
}

#[tokio::test]
async fn container_width_after_load_measures_pages() {
    LocalSet::new()
        .run_until(async {
            let engine = Rc::new(FakeEngine::new(FakeDocument::with_pages(3)));
            let session = DocumentSession::new(
                engine.clone(),
                Rc::new(FakeHost::new("Viewer")),
                ViewerOptions::default(),
            );
            session.load(DocumentSource::bytes(vec![])).await.unwrap();
            session.wait_for_layout().await;

            assert!(
                !session
                    .poll_events()
                    .iter()
                    .any(|event| matches!(event, ViewerEvent::RenderingFailed { .. }))
            );
            let first = session.controller(1).unwrap();
            assert!(!first.is_registered());
            assert_eq!(first.layout_size(), None);

            session.set_container_width(300.0);
            session.wait_for_layout().await;
            assert!(first.is_registered());
            assert_eq!(first.layout_size(), Some((300, 400)));

            session.report_intersection(1, 1.0);
            let (rendered, failed) = page_outcomes(&session, 2).await;
            assert_eq!(rendered, pages(&[1, 2]));
            assert!(failed.is_empty());
            assert_eq!(first.surfaces().canvas.size(), (300, 400));
        })
        .await;
}

#[tokio::test]
async fn leaving_render_set_releases_page() {
    LocalSet::new()
        .run_until(async {
            let engine = Rc::new(FakeEngine::new(FakeDocument::with_pages(4)));
            let session = session_for(&engine, ViewerOptions::default());
            session.load(DocumentSource::bytes(vec![])).await.unwrap();
            session.wait_for_layout().await;

            session.report_intersection(1, 1.0);
            page_outcomes(&session, 2).await;

            session.report_intersection(3, 1.0);
            session.report_intersection(1, 0.0);
            assert_eq!(session.render_set(), pages(&[2, 3, 4]));
            page_outcomes(&session, 2).await;

            let first = session.controller(1).unwrap();
            assert_eq!(first.state(), PageState::Idle);
            assert!(first.surfaces().is_empty());
            assert!(!first.has_live_task());
            assert!(!first.holds_page());

            let second = session.controller(2).unwrap();
            assert_eq!(second.state(), PageState::Rendering);
            assert!(!second.surfaces().canvas.is_blank());
        })
        .await;
}

#[tokio::test]
async fn single_page_option_limits_sequence() {
    LocalSet::new()
        .run_until(async {
            let engine = Rc::new(FakeEngine::new(FakeDocument::with_pages(5)));
            let options = ViewerOptions {
                page: Some(3),
                ..ViewerOptions::default()
            };
            let session = session_for(&engine, options);

            session.load(DocumentSource::bytes(vec![])).await.unwrap();
            assert_eq!(session.pages(), vec![3]);
            assert_eq!(session.page_count(), 5);
        })
        .await;
}

#[tokio::test]
async fn load_failure_leaves_no_pages() {
    LocalSet::new()
        .run_until(async {
            let engine = Rc::new(FakeEngine::failing("corrupt xref"));
            let session = session_for(&engine, ViewerOptions::default());

            let result = session.load(DocumentSource::bytes(vec![])).await;
            let error = EngineError::Load("corrupt xref".into());
            assert_eq!(result, Err(error.clone()));
            assert_eq!(session.poll_events(), vec![ViewerEvent::LoadingFailed(error)]);
            assert!(session.pages().is_empty());
            assert_eq!(session.page_count(), 0);
        })
        .await;
}

#[tokio::test]
async fn password_is_requested_until_correct() {
    LocalSet::new()
        .run_until(async {
            let engine =
                Rc::new(FakeEngine::new(FakeDocument::with_pages(2)).with_password("secret"));
            let session = session_for(&engine, ViewerOptions::default());

            assert!(session.load(DocumentSource::bytes(vec![])).await.is_err());
            assert_eq!(
                session.poll_events(),
                vec![ViewerEvent::PasswordRequested {
                    wrong_password: false
                }]
            );

            let wrong = DocumentSource::bytes(vec![]).with_password("guess");
            assert!(session.load(wrong).await.is_err());
            assert_eq!(
                session.poll_events(),
                vec![ViewerEvent::PasswordRequested {
                    wrong_password: true
                }]
            );

            let right = DocumentSource::bytes(vec![]).with_password("secret");
            assert_eq!(session.load(right).await, Ok(2));
            assert!(
                session
                    .poll_events()
                    .contains(&ViewerEvent::Loaded { page_count: 2 })
            );
        })
        .await;
}

#[tokio::test]
async fn failing_page_does_not_affect_siblings() {
    LocalSet::new()
        .run_until(async {
            let broken = FakePageSpec {
                fail_render: true,
                ..FakePageSpec::default()
            };
            let document = FakeDocument::new(vec![
                FakePageSpec::default(),
                broken,
                FakePageSpec::default(),
            ]);
            let engine = Rc::new(FakeEngine::new(document));
            let session = session_for(&engine, ViewerOptions::default());
            session.load(DocumentSource::bytes(vec![])).await.unwrap();
            session.wait_for_layout().await;

            session.report_intersection(2, 1.0);
            let (rendered, failed) = page_outcomes(&session, 3).await;

            assert_eq!(rendered, pages(&[1, 3]));
            assert_eq!(failed.len(), 1);
            assert_eq!(failed[0].0, 2);
            assert!(matches!(
                failed[0].1,
                RenderFault::Engine(EngineError::Render(_))
            ));
            assert!(session.controller(2).unwrap().surfaces().canvas.is_blank());
        })
        .await;
}

#[tokio::test]
async fn page_that_cannot_be_fetched_stays_placeholder() {
    LocalSet::new()
        .run_until(async {
            let missing = FakePageSpec {
                fail_fetch: true,
                ..FakePageSpec::default()
            };
            let document = FakeDocument::new(vec![FakePageSpec::default(), missing]);
            let engine = Rc::new(FakeEngine::new(document));
            let session = session_for(&engine, ViewerOptions::default());
            session.load(DocumentSource::bytes(vec![])).await.unwrap();
            session.wait_for_layout().await;

            let events = session.poll_events();
            assert!(events.iter().any(|event| matches!(
                event,
                ViewerEvent::RenderingFailed {
                    page: 2,
                    error: RenderFault::Engine(EngineError::Fetch { .. })
                }
            )));
            let second = session.controller(2).unwrap();
            assert!(!second.is_registered());

            session.report_intersection(1, 1.0);
            assert_eq!(session.render_set(), pages(&[1, 2]));
            let (rendered, _) = page_outcomes(&session, 1).await;
            assert_eq!(rendered, pages(&[1]));

            settle().await;
            assert_eq!(second.state(), PageState::Idle);
            assert!(second.surfaces().is_empty());
        })
        .await;
}

#[tokio::test]
async fn option_change_rerenders_visible_pages() {
    LocalSet::new()
        .run_until(async {
            let engine = Rc::new(FakeEngine::new(FakeDocument::with_pages(5)));
            let session = session_for(&engine, ViewerOptions::default());
            session.load(DocumentSource::bytes(vec![])).await.unwrap();
            session.wait_for_layout().await;
            session.report_intersection(1, 1.0);
            page_outcomes(&session, 2).await;

            session.update_options(ViewerOptions {
                scale: 2.0,
                ..ViewerOptions::default()
            });
            let (rendered, _) = page_outcomes(&session, 2).await;
            assert_eq!(rendered, pages(&[1, 2]));

            let first = session.controller(1).unwrap();
            assert_eq!(first.surfaces().canvas.size(), (1200, 1600));
            assert_eq!(first.layout_size(), Some((600, 800)));

            session.set_container_width(300.0);
            page_outcomes(&session, 2).await;
            settle().await;
            assert_eq!(first.layout_size(), Some((300, 400)));
            assert_eq!(session.controller(4).unwrap().layout_size(), Some((300, 400)));
        })
        .await;
}

#[tokio::test]
async fn reload_replaces_document_and_controllers() {
    LocalSet::new()
        .run_until(async {
            let engine = Rc::new(FakeEngine::new(FakeDocument::with_pages(3)));
            let session = session_for(&engine, ViewerOptions::default());
            session.load(DocumentSource::bytes(vec![])).await.unwrap();
            session.wait_for_layout().await;
            session.report_intersection(1, 1.0);
            page_outcomes(&session, 2).await;

            let old_document = engine.document().unwrap();
            let old_first = session.controller(1).unwrap();

            engine.replace_document(FakeDocument::with_pages(2));
            assert_eq!(session.load(DocumentSource::bytes(vec![])).await, Ok(2));

            assert!(old_document.stats().destroyed.get());
            assert_eq!(old_first.state(), PageState::TornDown);
            assert!(old_first.surfaces().is_empty());
            assert_eq!(session.pages(), vec![1, 2]);
            assert!(session.render_set().is_empty());
        })
        .await;
}

#[tokio::test]
async fn activating_internal_link_emits_event() {
    LocalSet::new()
        .run_until(async {
            let linked = FakePageSpec {
                annotations: vec![Annotation {
                    id: "toc".into(),
                    subtype: "Link".into(),
                    rect: [72.0, 700.0, 300.0, 720.0],
                    dest_page: Some(3),
                    ..Annotation::default()
                }],
                ..FakePageSpec::default()
            };
            let document = FakeDocument::new(vec![
                linked,
                FakePageSpec::default(),
                FakePageSpec::default(),
            ]);
            let engine = Rc::new(FakeEngine::new(document));
            let session = session_for(&engine, ViewerOptions::default());
            session.load(DocumentSource::bytes(vec![])).await.unwrap();
            session.wait_for_layout().await;
            session.report_intersection(1, 1.0);
            page_outcomes(&session, 2).await;

            assert!(session.activate_link(1, 0));
            assert!(!session.activate_link(1, 1));
            assert!(!session.activate_link(2, 0));
            assert_eq!(
                session.poll_events(),
                vec![ViewerEvent::InternalLinkClicked { page: 3 }]
            );
        })
        .await;
}

#[derive(Default)]
struct RecordingLinks {
    page_count: RefCell<u32>,
    visited: RefCell<Vec<LinkTarget>>,
}

impl LinkService for RecordingLinks {
    fn set_page_count(&self, page_count: u32) {
        *self.page_count.borrow_mut() = page_count;
    }

    fn navigate(&self, target: &LinkTarget) {
        self.visited.borrow_mut().push(target.clone());
    }
}

#[tokio::test]
async fn host_link_service_receives_navigation() {
    LocalSet::new()
        .run_until(async {
            let linked = FakePageSpec {
                annotations: vec![Annotation {
                    id: "site".into(),
                    subtype: "Link".into(),
                    rect: [72.0, 72.0, 200.0, 90.0],
                    url: Some("https://example.com".into()),
                    ..Annotation::default()
                }],
                ..FakePageSpec::default()
            };
            let engine = Rc::new(FakeEngine::new(FakeDocument::new(vec![linked])));
            let links = Rc::new(RecordingLinks::default());
            let session = session_for(&engine, ViewerOptions::default())
                .with_link_service(links.clone());
            session.load(DocumentSource::bytes(vec![])).await.unwrap();
            session.wait_for_layout().await;
            session.report_intersection(1, 1.0);
            page_outcomes(&session, 1).await;

            assert!(session.activate_link(1, 0));
            assert_eq!(*links.page_count.borrow(), 1);
            assert_eq!(
                *links.visited.borrow(),
                vec![LinkTarget::External {
                    uri: "https://example.com".into()
                }]
            );
        })
        .await;
}
