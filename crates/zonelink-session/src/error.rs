//! Error types for the session layer.

use crate::LookupError;

/// Errors raised by the session collaborators.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The identity resolver could not produce a display name.
    #[error("display name lookup for user {user_id} failed: {source}")]
    LookupFailed {
        user_id: i32,
        #[source]
        source: LookupError,
    },

    /// The feedback sink could not store a line.
    #[error("feedback sink failed: {0}")]
    Feedback(#[source] std::io::Error),
}
