//! The per-connection protocol phase.

use std::fmt;

/// Where a connection is in its lifecycle.
///
/// Phases advance one step per successfully handled inbound frame:
///
/// ```text
/// Connecting → ExchangingHandshake → EstablishingSecurity
///            → Authenticating → Linking → Online
/// ```
///
/// `Offline` is terminal and can be entered from any phase when the
/// connection signs off or its socket closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Phase {
    /// Socket accepted; waiting for the client's first bytes.
    #[default]
    Connecting,
    /// Handshake-init sent; waiting for the client hello.
    ExchangingHandshake,
    /// Waiting for the security-context request carrying the user id.
    EstablishingSecurity,
    /// Waiting for the authenticate message.
    Authenticating,
    /// Access granted; waiting for connect or room-connect.
    Linking,
    /// Fully signed on.
    Online,
    /// Gone. Nothing more is processed.
    Offline,
}

impl Phase {
    /// The phase a successful exchange moves to, or `None` if this phase
    /// does not advance on its own.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Connecting => Some(Self::ExchangingHandshake),
            Self::ExchangingHandshake => Some(Self::EstablishingSecurity),
            Self::EstablishingSecurity => Some(Self::Authenticating),
            Self::Authenticating => Some(Self::Linking),
            Self::Linking => Some(Self::Online),
            Self::Online | Self::Offline => None,
        }
    }

    /// Returns `true` if moving to `target` is allowed.
    pub fn can_transition_to(self, target: Self) -> bool {
        match target {
            Self::Offline => self != Self::Offline,
            _ => self.next() == Some(target),
        }
    }

    /// Returns `true` once the handshake is complete.
    pub fn is_online(self) -> bool {
        self == Self::Online
    }

    pub fn is_offline(self) -> bool {
        self == Self::Offline
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "Connecting",
            Self::ExchangingHandshake => "ExchangingHandshake",
            Self::EstablishingSecurity => "EstablishingSecurity",
            Self::Authenticating => "Authenticating",
            Self::Linking => "Linking",
            Self::Online => "Online",
            Self::Offline => "Offline",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_walks_handshake_in_order() {
        let mut phase = Phase::default();
        let mut seen = vec![phase];
        while let Some(next) = phase.next() {
            phase = next;
            seen.push(phase);
        }
        assert_eq!(
            seen,
            vec![
                Phase::Connecting,
                Phase::ExchangingHandshake,
                Phase::EstablishingSecurity,
                Phase::Authenticating,
                Phase::Linking,
                Phase::Online,
            ]
        );
    }

    #[test]
    fn test_can_transition_to_rejects_skips() {
        assert!(!Phase::Connecting.can_transition_to(Phase::Online));
        assert!(!Phase::Online.can_transition_to(Phase::Linking));
        assert!(Phase::Linking.can_transition_to(Phase::Online));
    }

    #[test]
    fn test_can_transition_to_offline_from_any_live_phase() {
        assert!(Phase::Connecting.can_transition_to(Phase::Offline));
        assert!(Phase::Online.can_transition_to(Phase::Offline));
        assert!(!Phase::Offline.can_transition_to(Phase::Offline));
    }

    #[test]
    fn test_display_names() {
        assert_eq!(Phase::EstablishingSecurity.to_string(), "EstablishingSecurity");
        assert_eq!(Phase::Offline.to_string(), "Offline");
    }
}
