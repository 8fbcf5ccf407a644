//! Render task identifiers, statuses and faults

use super::engine::EngineError;
use super::geometry::GeometryError;

/// Identifies one raster render started by a pipeline
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl TaskId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

/// Errors from a render pass
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum RenderFault {
    /// Superseded by a newer render or torn down; never reported to the host
    #[error("rendering cancelled")]
    Cancelled,

    #[error("page geometry: {0}")]
    Geometry(#[from] GeometryError),

    #[error("PDF engine: {0}")]
    Engine(#[from] EngineError),

    #[error("{detail}")]
    Surface { detail: String },
}

impl RenderFault {
    pub fn surface(msg: impl Into<String>) -> Self {
        Self::Surface { detail: msg.into() }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Result of one pipeline render
#[derive(Clone, Debug, PartialEq)]
pub enum RenderStatus {
    Rendered,
    Cancelled,
    Failed(RenderFault),
}

impl RenderStatus {
    /// Fold a pass result, routing cancellation into its own status
    #[must_use]
    pub fn from_result(result: Result<(), RenderFault>) -> Self {
        match result {
            Ok(()) => Self::Rendered,
            Err(fault) if fault.is_cancelled() => Self::Cancelled,
            Err(fault) => Self::Failed(fault),
        }
    }
}
