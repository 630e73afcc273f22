//! Error types for the lobby layer.

use zonelink_transport::ConnectionId;

/// Errors that can occur during lobby operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LobbyError {
    /// Every short id from the base upward is held or still referenced
    /// by the chat log.
    #[error("no free short id in lobby")]
    NoFreeShortId,

    /// The connection is not a member of this lobby.
    #[error("{0} is not a lobby member")]
    NotMember(ConnectionId),

    /// The connection already joined this lobby.
    #[error("{0} already joined the lobby")]
    AlreadyMember(ConnectionId),
}
