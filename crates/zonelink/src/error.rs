//! Unified error type for zonelink.

use zonelink_lobby::LobbyError;
use zonelink_protocol::ProtocolError;
use zonelink_session::SessionError;
use zonelink_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant lets `?` convert sub-crate
/// errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum ZoneError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (framing, layouts, compression).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A collaborator failed (identity lookup, feedback sink).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A lobby refused a join, leave, or chat line.
    #[error(transparent)]
    Lobby(#[from] LobbyError),

    /// The configuration could not be loaded or is inconsistent.
    #[error("configuration error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use zonelink_transport::ConnectionId;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::AcceptFailed(std::io::Error::other("gone"));
        let zone_err: ZoneError = err.into();
        assert!(matches!(zone_err, ZoneError::Transport(_)));
        assert!(zone_err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::Incomplete {
            needed: 16,
            available: 3,
        };
        let zone_err: ZoneError = err.into();
        assert!(matches!(zone_err, ZoneError::Protocol(_)));
    }

    #[test]
    fn test_from_session_error() {
        let err = SessionError::Feedback(std::io::Error::other("disk full"));
        let zone_err: ZoneError = err.into();
        assert!(matches!(zone_err, ZoneError::Session(_)));
    }

    #[test]
    fn test_from_lobby_error() {
        let err = LobbyError::NotMember(ConnectionId::new(4));
        let zone_err: ZoneError = err.into();
        assert!(matches!(zone_err, ZoneError::Lobby(_)));
        assert!(zone_err.to_string().contains("conn-4"));
    }
}
