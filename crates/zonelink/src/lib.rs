//! # Zonelink
//!
//! Lobby server for the zone protocol spoken by legacy game clients.
//!
//! A zone client opens a TCP connection, receives a handshake-init record
//! carrying its secure key, then walks through hello, security context,
//! and authentication before it is either registered as online (direct
//! listener) or seated in a chat lobby (lobby listeners). Online users
//! watch each other's presence, exchange data messages, and chat.
//!
//! The layers live in their own crates: `zonelink-transport` (TCP),
//! `zonelink-protocol` (frames and messages), `zonelink-session`
//! (per-connection state, outbox, presence directory) and
//! `zonelink-lobby` (rooms). This crate wires them into an [`Engine`] and
//! a [`ZoneServer`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use zonelink::prelude::*;
//!
//! # async fn start() -> Result<(), ZoneError> {
//! let server = ZoneServer::builder()
//!     .config(ServerConfig::from_file("zone.json")?)
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```

mod config;
mod engine;
mod error;
mod handler;
mod server;

pub use config::{
    DEFAULT_CONNECT_ACK, DEFAULT_DIRECT_PORT, DEFAULT_LOBBY_BASE_PORT, DEFAULT_LOBBY_COUNT,
    DEFAULT_UDP_PORT, DEFAULT_WELCOME, IdentityConfig, LookupFailure, ServerConfig,
};
pub use engine::{ConnectionState, Engine, Flow, Listener, MAX_FRAME_LEN};
pub use error::ZoneError;
pub use server::{ConfiguredFeedback, ZoneServer, ZoneServerBuilder};

/// Convenient re-exports for building and embedding a zone server.
pub mod prelude {
    pub use crate::{
        ConfiguredFeedback, Engine, Flow, IdentityConfig, Listener, LookupFailure, ServerConfig,
        ZoneError, ZoneServer, ZoneServerBuilder,
    };
    pub use zonelink_lobby::{Lobby, LobbyError};
    pub use zonelink_protocol::{Presence, ProtocolError, WatchNameLayout};
    pub use zonelink_session::{
        FeedbackSink, FileFeedbackSink, HandshakeConfig, IdentityResolver, LookupError,
        NullFeedbackSink, Peer, Phase, PresenceDirectory, SessionError, StaticResolver,
    };
    pub use zonelink_transport::{ConnectionId, TransportError};
}
