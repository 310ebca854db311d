//! Error types for the geometry builders and the renderer.

use thiserror::Error;

use crate::board::Side;

/// Failures raised by the geometry builders and viewport math.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("malformed path: {reason}")]
    MalformedPath { reason: String },

    #[error("degenerate viewport: {width} x {height}")]
    DegenerateViewport { width: f64, height: f64 },

    #[error("data integrity: {reason}")]
    DataIntegrity { reason: String },

    /// Expected outcome of cooperative cancellation, not a failure.
    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Error::MalformedPath { reason: reason.into() }
    }

    pub fn integrity(reason: impl Into<String>) -> Self {
        Error::DataIntegrity { reason: reason.into() }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Why a render pass did not complete.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RenderError {
    #[error("{layer} layer ({file}): {source}")]
    Layer {
        layer: String,
        file: String,
        #[source]
        source: Error,
    },

    #[error("viewport: {0}")]
    Viewport(#[source] Error),

    /// A builder failed outside any one layer.
    #[error("geometry: {0}")]
    Geometry(#[source] Error),

    /// The session must already be on the side being rendered; its
    /// geometry cache belongs to that side.
    #[error("session is on the {session:?} side, render asked for {requested:?}")]
    SideMismatch { session: Side, requested: Side },

    #[error("cannot allocate {width}x{height} raster")]
    Raster { width: u32, height: u32 },

    #[error("render worker panicked: {0}")]
    Panicked(String),

    #[error("render cancelled")]
    Cancelled,
}

impl RenderError {
    /// Attach layer context to a builder error. Cancellation stays bare.
    pub fn layer(layer: impl Into<String>, file: impl Into<String>, source: Error) -> Self {
        if source.is_cancelled() {
            return RenderError::Cancelled;
        }
        RenderError::Layer { layer: layer.into(), file: file.into(), source }
    }
}

impl From<Error> for RenderError {
    fn from(err: Error) -> Self {
        match err {
            Error::Cancelled => RenderError::Cancelled,
            err @ Error::DegenerateViewport { .. } => RenderError::Viewport(err),
            err @ (Error::MalformedPath { .. } | Error::DataIntegrity { .. }) => RenderError::Geometry(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layer_context_in_message() {
        let err = RenderError::layer("Profile", "board-Edge_Cuts.gm1", Error::integrity("object 3 has no stroke path"));
        let msg = err.to_string();
        assert!(msg.contains("Profile"), "missing layer in {}", msg);
        assert!(msg.contains("board-Edge_Cuts.gm1"), "missing file in {}", msg);
        assert!(msg.contains("object 3"), "missing cause in {}", msg);
    }

    #[test]
    fn cancellation_is_not_wrapped() {
        assert_eq!(RenderError::layer("Legend", "silk.gto", Error::Cancelled), RenderError::Cancelled);
        assert_eq!(RenderError::from(Error::Cancelled), RenderError::Cancelled);
    }

    #[test]
    fn builder_errors_are_not_reported_as_viewport() {
        let degenerate = Error::DegenerateViewport { width: 0.0, height: 4.0 };
        assert!(matches!(RenderError::from(degenerate), RenderError::Viewport(_)));
        assert!(matches!(RenderError::from(Error::malformed("1 point")), RenderError::Geometry(_)));
        assert!(matches!(RenderError::from(Error::integrity("no stroke")), RenderError::Geometry(_)));
    }
}
