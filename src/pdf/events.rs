//! Host-facing viewer events

use flume::{Receiver, Sender};
use log::warn;

use super::engine::{EngineError, LoadProgress};
use super::request::RenderFault;

/// Lifecycle notifications for the host UI
#[derive(Clone, Debug, PartialEq)]
pub enum ViewerEvent {
    /// Document parsed
    Loaded { page_count: u32 },
    LoadingFailed(EngineError),
    /// The host should ask for a password and reload with it
    PasswordRequested { wrong_password: bool },
    Progress(LoadProgress),
    PageRendered { page: u32 },
    /// The page sequence became non-empty
    Rendered,
    RenderingFailed { page: u32, error: RenderFault },
    InternalLinkClicked { page: u32 },
}

/// Sending half of the event stream, cloned into every component
#[derive(Clone, Debug)]
pub struct EventSink {
    tx: Sender<ViewerEvent>,
}

impl EventSink {
    /// Create a sink and the receiver the host listens on
    #[must_use]
    pub fn channel() -> (Self, Receiver<ViewerEvent>) {
        let (tx, rx) = flume::unbounded();
        (Self { tx }, rx)
    }

    pub fn emit(&self, event: ViewerEvent) {
        if self.tx.send(event).is_err() {
            warn!("viewer event dropped: no listener");
        }
    }
}
