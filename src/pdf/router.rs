//! Routes visibility changes to page controllers

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::{Rc, Weak};

use log::debug;

use super::controller::PageController;
use super::state::Command;
use super::visibility::{RenderSetDelta, VisibilityTracker};

/// Owns the session's [`VisibilityTracker`] and turns render-set deltas
/// into lifecycle commands for the affected controllers.
#[derive(Default)]
pub struct VisibilityRouter {
    tracker: RefCell<VisibilityTracker>,
    controllers: RefCell<BTreeMap<u32, Weak<PageController>>>,
}

impl VisibilityRouter {
    #[must_use]
    pub fn new(page_count: u32) -> Self {
        Self {
            tracker: RefCell::new(VisibilityTracker::new(page_count)),
            controllers: RefCell::new(BTreeMap::new()),
        }
    }

    /// Make `controller` reachable by its page number
    pub fn register(&self, controller: &Rc<PageController>) {
        self.controllers
            .borrow_mut()
            .insert(controller.page_number(), Rc::downgrade(controller));
    }

    /// Feed an intersection report for `page`.
    pub fn report(&self, page: u32, fraction: f64) {
        let delta = {
            let mut tracker = self.tracker.borrow_mut();
            let Some(change) = tracker.report(page, fraction) else {
                return;
            };
            tracker.apply(change)
        };
        self.dispatch(delta);
    }

    /// Start tracking a measured page; it renders at once when it already
    /// belongs to the render set.
    pub fn observe(&self, page: u32) {
        let delta = {
            let mut tracker = self.tracker.borrow_mut();
            tracker.observe(page).map(|change| tracker.apply(change))
        };
        if let Some(delta) = delta {
            self.dispatch(delta);
        }
        let in_render_set = self.tracker.borrow().in_render_set(page);
        if in_render_set {
            self.send(page, Command::EnterRenderSet);
        }
    }

    pub fn unobserve(&self, page: u32) {
        self.tracker.borrow_mut().unobserve(page);
    }

    #[must_use]
    pub fn visible(&self) -> BTreeSet<u32> {
        self.tracker.borrow().visible().clone()
    }

    #[must_use]
    pub fn render_set(&self) -> BTreeSet<u32> {
        self.tracker.borrow().render_set().clone()
    }

    fn dispatch(&self, delta: RenderSetDelta) {
        if delta.is_empty() {
            return;
        }
        debug!("render set +{:?} -{:?}", delta.entered, delta.left);
        for page in delta.left {
            self.send(page, Command::LeaveRenderSet);
        }
        for page in delta.entered {
            self.send(page, Command::EnterRenderSet);
        }
    }

    fn send(&self, page: u32, command: Command) {
        let controller = self.controllers.borrow().get(&page).and_then(Weak::upgrade);
        if let Some(controller) = controller {
            controller.apply(command);
        }
    }
}
