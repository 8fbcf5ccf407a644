//! Visibility tracking and render-set computation

use std::collections::{BTreeMap, BTreeSet};

use log::trace;

/// Fraction of a page that must intersect the viewport to count as visible
pub const VISIBILITY_THRESHOLD: f64 = 0.1;

/// A page crossed the visibility threshold
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VisibilityChange {
    pub page: u32,
    pub visible: bool,
}

/// Pages that entered and left the render set after a change
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RenderSetDelta {
    pub entered: Vec<u32>,
    pub left: Vec<u32>,
}

impl RenderSetDelta {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entered.is_empty() && self.left.is_empty()
    }
}

/// Every visible page plus its immediate neighbours, clamped to the document
#[must_use]
pub fn render_set(visible: &BTreeSet<u32>, page_count: u32) -> BTreeSet<u32> {
    visible
        .iter()
        .flat_map(|&page| [page.saturating_sub(1), page, page.saturating_add(1)])
        .filter(|page| (1..=page_count).contains(page))
        .collect()
}

/// Maps intersection reports to visibility transitions and keeps the
/// visible and render sets.
#[derive(Debug, Default)]
pub struct VisibilityTracker {
    page_count: u32,
    /// Observed pages and their last known visibility
    observed: BTreeMap<u32, bool>,
    /// Last fraction reported for pages not observed yet
    pending: BTreeMap<u32, f64>,
    visible: BTreeSet<u32>,
    render_set: BTreeSet<u32>,
}

impl VisibilityTracker {
    #[must_use]
    pub fn new(page_count: u32) -> Self {
        Self {
            page_count,
            ..Self::default()
        }
    }

    /// Start watching `page`. A fraction reported before this call is
    /// applied now, so the returned change may make the page visible.
    pub fn observe(&mut self, page: u32) -> Option<VisibilityChange> {
        if self.observed.contains_key(&page) {
            return None;
        }
        self.observed.insert(page, false);
        let fraction = self.pending.remove(&page)?;
        self.report(page, fraction)
    }

    /// Stop watching `page`.
    pub fn unobserve(&mut self, page: u32) {
        self.observed.remove(&page);
        self.pending.remove(&page);
    }

    #[must_use]
    pub fn is_observed(&self, page: u32) -> bool {
        self.observed.contains_key(&page)
    }

    /// Feed an intersection report; returns a change only on a transition.
    pub fn report(&mut self, page: u32, fraction: f64) -> Option<VisibilityChange> {
        let Some(last) = self.observed.get_mut(&page) else {
            if (1..=self.page_count).contains(&page) {
                self.pending.insert(page, fraction);
            }
            return None;
        };
        let visible = fraction >= VISIBILITY_THRESHOLD;
        if *last == visible {
            return None;
        }
        *last = visible;
        trace!("page {page} visibility -> {visible} ({fraction:.3})");
        Some(VisibilityChange { page, visible })
    }

    /// Update the visible set and recompute the render set from scratch.
    pub fn apply(&mut self, change: VisibilityChange) -> RenderSetDelta {
        if change.visible {
            self.visible.insert(change.page);
        } else {
            self.visible.remove(&change.page);
        }

        let next = render_set(&self.visible, self.page_count);
        let delta = RenderSetDelta {
            entered: next.difference(&self.render_set).copied().collect(),
            left: self.render_set.difference(&next).copied().collect(),
        };
        self.render_set = next;
        delta
    }

    #[must_use]
    pub fn visible(&self) -> &BTreeSet<u32> {
        &self.visible
    }

    #[must_use]
    pub fn render_set(&self) -> &BTreeSet<u32> {
        &self.render_set
    }

    #[must_use]
    pub fn in_render_set(&self, page: u32) -> bool {
        self.render_set.contains(&page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(pages: &[u32]) -> BTreeSet<u32> {
        pages.iter().copied().collect()
    }

    #[test]
    fn render_set_includes_neighbours() {
        assert_eq!(render_set(&set(&[5]), 10), set(&[4, 5, 6]));
        assert_eq!(render_set(&set(&[1]), 10), set(&[1, 2]));
        assert_eq!(render_set(&set(&[10]), 10), set(&[9, 10]));
        assert_eq!(render_set(&set(&[]), 10), set(&[]));
        assert_eq!(render_set(&set(&[2, 6]), 10), set(&[1, 2, 3, 5, 6, 7]));
    }

    #[test]
    fn only_transitions_are_reported() {
        let mut tracker = VisibilityTracker::new(3);
        tracker.observe(1);

        assert_eq!(tracker.report(1, 0.05), None);
        assert_eq!(
            tracker.report(1, 0.1),
            Some(VisibilityChange {
                page: 1,
                visible: true
            })
        );
        assert_eq!(tracker.report(1, 0.8), None);
        assert_eq!(
            tracker.report(1, 0.0),
            Some(VisibilityChange {
                page: 1,
                visible: false
            })
        );
    }

    #[test]
    fn early_reports_apply_once_observed() {
        let mut tracker = VisibilityTracker::new(3);
        assert_eq!(tracker.report(2, 0.3), None);
        assert_eq!(tracker.report(2, 1.0), None);
        assert_eq!(tracker.report(3, 0.0), None);
        assert_eq!(tracker.report(7, 1.0), None);
        assert!(tracker.visible().is_empty());

        assert_eq!(
            tracker.observe(2),
            Some(VisibilityChange {
                page: 2,
                visible: true
            })
        );
        assert_eq!(tracker.observe(2), None);
        assert_eq!(tracker.observe(3), None);
        assert_eq!(tracker.observe(1), None);
        assert_eq!(tracker.report(2, 1.0), None);
    }

    #[test]
    fn unobserve_forgets_early_reports() {
        let mut tracker = VisibilityTracker::new(3);
        tracker.report(1, 1.0);
        tracker.unobserve(1);
        assert_eq!(tracker.observe(1), None);
    }

    #[test]
    fn apply_reports_render_set_delta() {
        let mut tracker = VisibilityTracker::new(10);
        let delta = tracker.apply(VisibilityChange {
            page: 5,
            visible: true,
        });
        assert_eq!(delta.entered, vec![4, 5, 6]);
        assert!(delta.left.is_empty());

        let delta = tracker.apply(VisibilityChange {
            page: 6,
            visible: true,
        });
        assert_eq!(delta.entered, vec![7]);

        let delta = tracker.apply(VisibilityChange {
            page: 5,
            visible: false,
        });
        assert_eq!(delta.left, vec![4]);
        assert_eq!(tracker.render_set(), &set(&[5, 6, 7]));
    }
}
