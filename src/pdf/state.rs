//! Page lifecycle state machine

/// Where a page controller is in its life
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PageState {
    /// Waiting for the document
    #[default]
    Uninitialized,
    /// Fetching the page to measure it
    Probing,
    /// Measured, nothing on the canvas
    Idle,
    /// In the render set with a render in flight or finished
    Rendering,
    /// Terminal
    TornDown,
}

/// Lifecycle of one page controller
#[derive(Clone, Debug, Default)]
pub struct PageLifecycle {
    pub state: PageState,

    /// Registered with the visibility tracker
    pub registered: bool,

    /// Measurement waits for a usable width
    pub deferred: bool,
}

impl PageLifecycle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a command and return resulting effects
    #[must_use]
    pub fn apply(&mut self, cmd: Command) -> Vec<Effect> {
        use PageState::{Idle, Probing, Rendering, TornDown, Uninitialized};

        match (self.state, cmd) {
            (TornDown, _) => vec![],

            (_, Command::Unmount) => {
                self.state = TornDown;
                if std::mem::take(&mut self.registered) {
                    vec![Effect::Unobserve, Effect::Teardown]
                } else {
                    vec![Effect::Teardown]
                }
            }

            (Uninitialized, Command::Mount) => vec![Effect::AwaitDocument],

            (Uninitialized, Command::DocumentReady) => {
                self.state = Probing;
                vec![Effect::Probe]
            }

            (Probing, Command::ProbeSucceeded) => {
                self.state = Idle;
                self.registered = true;
                vec![Effect::Observe]
            }

            // Not registered, so the page stays a placeholder for good.
            (Probing, Command::ProbeFailed) => {
                self.state = Idle;
                vec![]
            }

            (Probing, Command::ProbeDeferred) => {
                self.state = Idle;
                self.deferred = true;
                vec![]
            }

            (Idle, Command::PropsChanged) if self.deferred => {
                self.state = Probing;
                self.deferred = false;
                vec![Effect::Probe]
            }

            (Idle, Command::EnterRenderSet) if self.registered => {
                self.state = Rendering;
                vec![Effect::Render]
            }

            (Rendering, Command::LeaveRenderSet) => {
                self.state = Idle;
                vec![Effect::Cleanup]
            }

            (Rendering, Command::PropsChanged) => vec![Effect::Cleanup, Effect::Render],

            (Idle, Command::PropsChanged) => vec![Effect::Measure],

            _ => vec![],
        }
    }

    #[must_use]
    pub fn is_torn_down(&self) -> bool {
        self.state == PageState::TornDown
    }
}

/// Commands that drive a page's lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    /// Controller attached to the session
    Mount,
    /// The document handle became available
    DocumentReady,
    ProbeSucceeded,
    ProbeFailed,
    /// The page could not be measured yet; retry on the next props change
    ProbeDeferred,
    EnterRenderSet,
    LeaveRenderSet,
    /// Scale, rotation, size or layer options changed
    PropsChanged,
    Unmount,
}

/// Effects produced by lifecycle transitions
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Effect {
    /// Wait for the document slot to be filled
    AwaitDocument,
    /// Fetch the page and compute its layout size
    Probe,
    /// Register with the visibility tracker
    Observe,
    /// Run the render pipeline
    Render,
    /// Recompute the layout size without rendering
    Measure,
    /// Cancel the render task and release surfaces and page
    Cleanup,
    /// Deregister from the visibility tracker
    Unobserve,
    /// Final cleanup
    Teardown,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idle_registered() -> PageLifecycle {
        let mut lifecycle = PageLifecycle::new();
        let _ = lifecycle.apply(Command::DocumentReady);
        let _ = lifecycle.apply(Command::ProbeSucceeded);
        lifecycle
    }

    #[test]
    fn mount_waits_for_document() {
        let mut lifecycle = PageLifecycle::new();
        assert_eq!(lifecycle.apply(Command::Mount), vec![Effect::AwaitDocument]);
        assert_eq!(lifecycle.state, PageState::Uninitialized);

        assert_eq!(lifecycle.apply(Command::DocumentReady), vec![Effect::Probe]);
        assert_eq!(lifecycle.state, PageState::Probing);
    }

    #[test]
    fn successful_probe_registers() {
        let mut lifecycle = PageLifecycle::new();
        let _ = lifecycle.apply(Command::DocumentReady);

        assert_eq!(lifecycle.apply(Command::ProbeSucceeded), vec![Effect::Observe]);
        assert_eq!(lifecycle.state, PageState::Idle);
        assert!(lifecycle.registered);
    }

    #[test]
    fn failed_probe_never_renders() {
        let mut lifecycle = PageLifecycle::new();
        let _ = lifecycle.apply(Command::DocumentReady);

        assert!(lifecycle.apply(Command::ProbeFailed).is_empty());
        assert_eq!(lifecycle.state, PageState::Idle);
        assert!(lifecycle.apply(Command::EnterRenderSet).is_empty());
        assert_eq!(lifecycle.state, PageState::Idle);
    }

    #[test]
    fn deferred_probe_retries_on_props_change() {
        let mut lifecycle = PageLifecycle::new();
        let _ = lifecycle.apply(Command::DocumentReady);

        assert!(lifecycle.apply(Command::ProbeDeferred).is_empty());
        assert_eq!(lifecycle.state, PageState::Idle);
        assert!(!lifecycle.registered);
        assert!(lifecycle.apply(Command::EnterRenderSet).is_empty());

        assert_eq!(lifecycle.apply(Command::PropsChanged), vec![Effect::Probe]);
        assert_eq!(lifecycle.state, PageState::Probing);
        assert!(!lifecycle.deferred);

        // Deferring again keeps the page waiting for the next change.
        let _ = lifecycle.apply(Command::ProbeDeferred);
        assert_eq!(lifecycle.apply(Command::PropsChanged), vec![Effect::Probe]);
        assert_eq!(lifecycle.apply(Command::ProbeSucceeded), vec![Effect::Observe]);
        assert!(lifecycle.registered);
    }

    #[test]
    fn failed_probe_is_not_retried_on_props_change() {
        let mut lifecycle = PageLifecycle::new();
        let _ = lifecycle.apply(Command::DocumentReady);
        let _ = lifecycle.apply(Command::ProbeFailed);

        assert_eq!(lifecycle.apply(Command::PropsChanged), vec![Effect::Measure]);
        assert_eq!(lifecycle.state, PageState::Idle);
    }

    #[test]
    fn render_set_membership_drives_rendering() {
        let mut lifecycle = idle_registered();

        assert_eq!(lifecycle.apply(Command::EnterRenderSet), vec![Effect::Render]);
        assert_eq!(lifecycle.state, PageState::Rendering);
        assert!(lifecycle.apply(Command::EnterRenderSet).is_empty());

        assert_eq!(lifecycle.apply(Command::LeaveRenderSet), vec![Effect::Cleanup]);
        assert_eq!(lifecycle.state, PageState::Idle);
        assert!(lifecycle.apply(Command::LeaveRenderSet).is_empty());
    }

    #[test]
    fn props_change_rerenders_or_remeasures() {
        let mut lifecycle = idle_registered();
        assert_eq!(lifecycle.apply(Command::PropsChanged), vec![Effect::Measure]);

        let _ = lifecycle.apply(Command::EnterRenderSet);
        assert_eq!(
            lifecycle.apply(Command::PropsChanged),
            vec![Effect::Cleanup, Effect::Render]
        );
        assert_eq!(lifecycle.state, PageState::Rendering);
    }

    #[test]
    fn props_change_before_probe_is_ignored() {
        let mut lifecycle = PageLifecycle::new();
        assert!(lifecycle.apply(Command::PropsChanged).is_empty());
        let _ = lifecycle.apply(Command::DocumentReady);
        assert!(lifecycle.apply(Command::PropsChanged).is_empty());
    }

    #[test]
    fn unmount_is_terminal() {
        let mut lifecycle = idle_registered();
        let _ = lifecycle.apply(Command::EnterRenderSet);

        assert_eq!(
            lifecycle.apply(Command::Unmount),
            vec![Effect::Unobserve, Effect::Teardown]
        );
        assert!(lifecycle.is_torn_down());
        assert!(!lifecycle.registered);
        assert!(lifecycle.apply(Command::Unmount).is_empty());
        assert!(lifecycle.apply(Command::DocumentReady).is_empty());
    }

    #[test]
    fn unmount_before_registration_skips_unobserve() {
        let mut lifecycle = PageLifecycle::new();
        let _ = lifecycle.apply(Command::Mount);
        assert_eq!(lifecycle.apply(Command::Unmount), vec![Effect::Teardown]);
    }
}
