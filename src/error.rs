//! Error types for the planner core.

/// Top-level error type for the day planner.
///
/// Only [`PlannerError::Transport`] and [`PlannerError::Timeout`] are expected
/// to reach the user from an assistant session. Resolution failures, malformed
/// actions, and corrupt audio chunks are absorbed where they occur.
#[derive(Debug, thiserror::Error)]
pub enum PlannerError {
    /// Connection to the remote model failed or dropped.
    #[error("transport error: {0}")]
    Transport(String),

    /// The remote model did not answer within the request deadline.
    #[error("assistant request timed out after {0} ms")]
    Timeout(u64),

    /// A frame could not be built or the session was used in the wrong state.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Audio device or stream error.
    #[error("audio error: {0}")]
    Audio(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Reminders import error.
    #[error("import error: {0}")]
    Import(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PlannerError {
    /// Whether this error should be shown to the user as a retry prompt.
    pub fn is_user_visible(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout(_))
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, PlannerError>;
