//! Link navigation

use std::cell::Cell;

use log::{info, warn};

use super::events::{EventSink, ViewerEvent};
use super::types::LinkTarget;

/// Resolves activated links. Hosts may supply their own implementation.
pub trait LinkService {
    /// Called whenever a new document is loaded
    fn set_page_count(&self, page_count: u32);

    fn navigate(&self, target: &LinkTarget);
}

/// Default service: internal links become `InternalLinkClicked` events,
/// external links are only logged.
#[derive(Debug)]
pub struct SimpleLinkService {
    events: EventSink,
    page_count: Cell<u32>,
}

impl SimpleLinkService {
    #[must_use]
    pub fn new(events: EventSink) -> Self {
        Self {
            events,
            page_count: Cell::new(0),
        }
    }
}

impl LinkService for SimpleLinkService {
    fn set_page_count(&self, page_count: u32) {
        self.page_count.set(page_count);
    }

    fn navigate(&self, target: &LinkTarget) {
        match target {
            LinkTarget::Internal { page } => {
                if (1..=self.page_count.get()).contains(page) {
                    self.events.emit(ViewerEvent::InternalLinkClicked { page: *page });
                } else {
                    warn!(
                        "link to page {page} outside document of {} pages",
                        self.page_count.get()
                    );
                }
            }
            LinkTarget::External { uri } => {
                info!("external link activated: {uri}");
            }
        }
    }
}
