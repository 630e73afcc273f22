//! The protocol engine: one connection's inbound bytes in, frames out.
//!
//! Each connection is driven through the handshake phases by the frames
//! it sends:
//!
//! ```text
//! Connecting           any bytes          → handshake-init
//! ExchangingHandshake  ClientHello        → ServerHello
//! EstablishingSecurity SecurityContext    → SecurityContextReply
//! Authenticating       Authenticate       → AccessGranted
//! Linking              Connect            → ConnectAck + welcome line   (direct)
//!                      RoomConnect        → RoomAccessed + roster        (lobby)
//! Online               Watch / State / Data / Talk
//! ```
//!
//! Replies go straight onto the connection's own outbox. Anything bound
//! for other connections (presence fan-out, routed data, lobby traffic)
//! goes onto theirs.

use std::net::SocketAddr;
use std::sync::Arc;

use zonelink_lobby::{Lobby, LobbyError};
use zonelink_protocol::{
    AccessDenied, AccessGranted, ClientMessage, ConnectAck, DataAck, DataMessage, DataPayload,
    Frame, Message, Presence, ProtocolError, RoomConnect, Scope, SecurityContextReply,
    SecurityContextRequest, ServerHello, ServerMessage, StateAck, StateUpdate, Talk, UnionType,
    UserPresence, Watch, WatchAck, decode_frame, registry,
};
use zonelink_session::{
    FeedbackSink, IdentityResolver, Peer, Phase, PresenceDirectory, WriteReceiver,
    generate_handshake,
};
use zonelink_transport::ConnectionId;

use crate::ZoneError;
use crate::config::{LookupFailure, ServerConfig};

/// Largest frame the engine will wait for. A header declaring more than
/// this is treated as garbage.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Which listener accepted a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Listener {
    Direct,
    /// Index into the server's lobbies.
    Lobby(usize),
}

/// Whether the connection should stay open after processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// The connection signed off or was refused; close the socket.
    Close,
}

/// Engine-side state of one connection.
pub struct ConnectionState {
    peer: Arc<Peer>,
    lobby: Option<Arc<Lobby>>,
    /// Bytes received but not yet forming a whole frame.
    inbound: Vec<u8>,
}

impl ConnectionState {
    pub fn peer(&self) -> &Arc<Peer> {
        &self.peer
    }

    pub fn id(&self) -> ConnectionId {
        self.peer.id()
    }

    pub fn phase(&self) -> Phase {
        self.peer.phase()
    }

    /// Bytes held back waiting for the rest of a frame.
    pub fn buffered(&self) -> usize {
        self.inbound.len()
    }
}

/// Shared server context: configuration, directory, lobbies, and the
/// collaborators. One per server, shared by every connection task.
pub struct Engine<R, F> {
    config: ServerConfig,
    directory: PresenceDirectory,
    lobbies: Vec<Arc<Lobby>>,
    resolver: R,
    feedback: F,
}

impl<R, F> Engine<R, F>
where
    R: IdentityResolver,
    F: FeedbackSink,
{
    /// Creates the context with one lobby per configured lobby port.
    pub fn new(config: ServerConfig, resolver: R, feedback: F) -> Self {
        let lobbies = config
            .lobby_ports()
            .map(|port| Arc::new(Lobby::new(port)))
            .collect();
        Self {
            config,
            directory: PresenceDirectory::new(),
            lobbies,
            resolver,
            feedback,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn directory(&self) -> &PresenceDirectory {
        &self.directory
    }

    pub fn lobbies(&self) -> &[Arc<Lobby>] {
        &self.lobbies
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    pub fn feedback(&self) -> &F {
        &self.feedback
    }

    /// Sets up state for a freshly accepted connection, returning the
    /// buffers its writer must send.
    pub fn open(
        &self,
        id: ConnectionId,
        addr: SocketAddr,
        listener: Listener,
    ) -> (ConnectionState, WriteReceiver) {
        let lobby = match listener {
            Listener::Direct => None,
            Listener::Lobby(index) => self.lobbies.get(index).cloned(),
        };
        let scope = if lobby.is_some() {
            Scope::Room
        } else {
            Scope::Direct
        };
        let (peer, writes) = Peer::new(id, addr, scope);
        let state = ConnectionState {
            peer,
            lobby,
            inbound: Vec::new(),
        };
        (state, writes)
    }

    /// Feeds received bytes through the engine.
    ///
    /// Every whole frame in the buffer is handled in order; a trailing
    /// partial frame stays buffered for the next call.
    ///
    /// # Errors
    /// Only if an outbound message cannot be serialized.
    pub async fn process(
        &self,
        conn: &mut ConnectionState,
        bytes: &[u8],
    ) -> Result<Flow, ZoneError> {
        conn.inbound.extend_from_slice(bytes);

        loop {
            match conn.phase() {
                Phase::Offline => {
                    conn.inbound.clear();
                    return Ok(Flow::Close);
                }
                Phase::Connecting => {
                    // The client's opening bytes carry nothing we use.
                    conn.inbound.clear();
                    self.begin_handshake(conn);
                    return Ok(Flow::Continue);
                }
                _ => {}
            }

            let Some(frame) = next_frame(conn) else {
                return Ok(Flow::Continue);
            };
            if self.handle_frame(conn, frame).await? == Flow::Close {
                conn.inbound.clear();
                return Ok(Flow::Close);
            }
        }
    }

    /// Takes a connection offline: leaves its lobby, or tells watchers it
    /// went offline and drops it from the directory.
    ///
    /// Safe to call any number of times; only the first call acts.
    pub fn disconnect(&self, conn: &ConnectionState) {
        let (previous, name) = {
            let mut profile = conn.peer.profile();
            if profile.phase.is_offline() {
                return;
            }
            let previous = profile.phase;
            profile.phase = Phase::Offline;
            profile.presence = Presence::OFFLINE;
            (previous, profile.name.clone())
        };

        if let Some(lobby) = &conn.lobby {
            match lobby.leave(conn.id()) {
                Ok(()) | Err(LobbyError::NotMember(_)) => {}
                Err(e) => tracing::warn!(conn_id = %conn.id(), error = %e, "lobby leave failed"),
            }
        } else if previous.is_online() {
            let offline = ServerMessage::from(UserPresence {
                name: name.clone(),
                presence: Presence::OFFLINE,
            });
            for watcher in self.directory.watchers_of(&name) {
                if watcher.id() != conn.id() {
                    send_to(&watcher, &offline);
                }
            }
            self.directory.unregister(&name, conn.id());
        }
        tracing::info!(conn_id = %conn.id(), name = %name, was = %previous, "offline");
    }

    // -----------------------------------------------------------------------
    // Frames
    // -----------------------------------------------------------------------

    fn begin_handshake(&self, conn: &ConnectionState) {
        let union_type = UnionType::for_listener(conn.lobby.is_some());
        let init = generate_handshake(union_type, &self.config.handshake);
        conn.peer.outbox().send_handshake(init);
        advance(conn, Phase::Connecting);
        tracing::debug!(
            conn_id = %conn.id(),
            key = init.secure_key,
            sequence = init.sequence_id,
            "handshake sent"
        );
    }

    async fn handle_frame(&self, conn: &mut ConnectionState, frame: Frame) -> Result<Flow, ZoneError> {
        if !frame.has_valid_signature() {
            tracing::debug!(
                conn_id = %conn.id(),
                signature = frame.signature,
                "unexpected frame signature"
            );
        }

        let message = match Message::decode(&frame.data) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(conn_id = %conn.id(), error = %e, "frame carries no whole message");
                return Ok(Flow::Continue);
            }
        };

        match registry::dispatch(&message, conn.peer.scope()) {
            Ok(Some(parsed)) => {
                tracing::debug!(conn_id = %conn.id(), kind = parsed.name(), phase = %conn.phase(), "inbound");
                self.handle(conn, parsed).await
            }
            Ok(None) => {
                tracing::warn!(conn_id = %conn.id(), type_id = message.type_id, "unknown message type");
                Ok(Flow::Continue)
            }
            Err(e) => {
                tracing::warn!(conn_id = %conn.id(), type_id = message.type_id, error = %e, "malformed message");
                Ok(Flow::Continue)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Messages
    // -----------------------------------------------------------------------

    async fn handle(&self, conn: &mut ConnectionState, message: ClientMessage) -> Result<Flow, ZoneError> {
        let phase = conn.phase();
        match (phase, message) {
            (_, ClientMessage::KeepAlive) => {}
            (_, ClientMessage::Disconnect) => {
                self.disconnect(conn);
                return Ok(Flow::Close);
            }
            (Phase::ExchangingHandshake, ClientMessage::Hello(_)) => {
                reply(conn, ServerHello::default())?;
                advance(conn, phase);
            }
            (Phase::EstablishingSecurity, ClientMessage::SecurityContext(request)) => {
                return self.establish_security(conn, request).await;
            }
            (Phase::Authenticating, ClientMessage::Authenticate(_)) => {
                let (user_id, name) = {
                    let profile = conn.peer.profile();
                    (profile.user_id, profile.name.clone())
                };
                tracing::info!(conn_id = %conn.id(), user_id, name = %name, "access granted");
                reply(conn, AccessGranted { user_id, name })?;
                advance(conn, phase);
            }
            (Phase::Linking, ClientMessage::Connect(_)) => self.link_direct(conn)?,
            (Phase::Linking, ClientMessage::RoomConnect(request)) => {
                return self.link_lobby(conn, request);
            }
            (Phase::Online, ClientMessage::Watch(watch)) => self.watch(conn, watch)?,
            (Phase::Online, ClientMessage::State(update)) => self.update_state(conn, update)?,
            (Phase::Online, ClientMessage::Data(data)) => self.route_data(conn, data).await?,
            (Phase::Online, ClientMessage::Talk(talk)) => self.talk(conn, talk),
            (phase, other) => {
                tracing::debug!(conn_id = %conn.id(), kind = other.name(), %phase, "ignored out of phase");
            }
        }
        Ok(Flow::Continue)
    }

    async fn establish_security(
        &self,
        conn: &mut ConnectionState,
        request: SecurityContextRequest,
    ) -> Result<Flow, ZoneError> {
        let user_id = request.user_id;
        tracing::info!(conn_id = %conn.id(), user_id, "security context requested");

        let failure = match self.resolver.resolve(user_id).await {
            Ok(name) if !name.trim_end_matches('\0').is_empty() => {
                let name = name.trim_end_matches('\0').to_string();
                let mut profile = conn.peer.profile();
                profile.user_id = user_id;
                profile.name = name;
                None
            }
            Ok(_) => Some("empty name".to_string()),
            Err(e) => Some(e.to_string()),
        };

        if let Some(reason) = failure {
            match self.config.identity.lookup_failure {
                LookupFailure::Deny => {
                    tracing::warn!(conn_id = %conn.id(), user_id, %reason, "lookup failed; access denied");
                    reply(conn, AccessDenied::default())?;
                    self.disconnect(conn);
                    return Ok(Flow::Close);
                }
                LookupFailure::Placeholder => {
                    let name = self.config.identity.placeholder(user_id);
                    tracing::warn!(conn_id = %conn.id(), user_id, %reason, name = %name, "lookup failed; using placeholder");
                    let mut profile = conn.peer.profile();
                    profile.user_id = user_id;
                    profile.name = name;
                }
            }
        }

        reply(conn, SecurityContextReply::default())?;
        advance(conn, Phase::EstablishingSecurity);
        Ok(Flow::Continue)
    }

    fn link_direct(&self, conn: &ConnectionState) -> Result<(), ZoneError> {
        if conn.lobby.is_some() {
            tracing::debug!(conn_id = %conn.id(), "direct connect on a lobby listener ignored");
            return Ok(());
        }
        let name = conn.peer.name();
        advance(conn, Phase::Linking);
        self.directory.register(&name, Arc::clone(&conn.peer));

        let mut replies = vec![ServerMessage::from(ConnectAck {
            config: self.config.connect_ack_text(&name),
        })];
        if !self.config.welcome_message.is_empty() {
            replies.push(
                DataMessage::text(&self.config.server_name, &self.config.welcome_message).into(),
            );
        }
        conn.peer.outbox().send_all(&replies)?;
        tracing::info!(conn_id = %conn.id(), name = %name, online = self.directory.len(), "online");
        Ok(())
    }

    fn link_lobby(&self, conn: &ConnectionState, request: RoomConnect) -> Result<Flow, ZoneError> {
        let Some(lobby) = &conn.lobby else {
            tracing::debug!(conn_id = %conn.id(), "room connect on the direct listener ignored");
            return Ok(Flow::Continue);
        };
        let (user_id, name) = {
            let profile = conn.peer.profile();
            let name = if profile.name.is_empty() {
                request.name.clone()
            } else {
                profile.name.clone()
            };
            (profile.user_id, name)
        };
        if user_id != request.user_id {
            tracing::debug!(conn_id = %conn.id(), user_id, claimed = request.user_id, "room connect user id differs");
        }

        advance(conn, Phase::Linking);
        match lobby.join(&conn.peer, user_id, &name) {
            Ok(_) => Ok(Flow::Continue),
            Err(e) => {
                tracing::warn!(conn_id = %conn.id(), port = lobby.port(), error = %e, "lobby join refused");
                self.disconnect(conn);
                Ok(Flow::Close)
            }
        }
    }

    fn watch(&self, conn: &ConnectionState, watch: Watch) -> Result<(), ZoneError> {
        let name = watch.name(self.config.watch_name_layout);
        conn.peer.profile().watch(&name);

        let mut replies = vec![ServerMessage::from(WatchAck { name: name.clone() })];
        if let Some(other) = self.directory.find(&name) {
            replies.push(
                UserPresence {
                    name: other.name(),
                    presence: other.presence(),
                }
                .into(),
            );
        }
        conn.peer.outbox().send_all(&replies)?;
        Ok(())
    }

    fn update_state(&self, conn: &ConnectionState, update: StateUpdate) -> Result<(), ZoneError> {
        let name = {
            let mut profile = conn.peer.profile();
            profile.presence = update.presence;
            profile.name.clone()
        };
        tracing::info!(
            conn_id = %conn.id(),
            name = %name,
            state = %update.presence.state,
            app = ?update.presence.app,
            "presence changed"
        );

        reply(conn, StateAck::default())?;
        let notice = ServerMessage::from(UserPresence {
            name: name.clone(),
            presence: update.presence,
        });
        for watcher in self.directory.watchers_of(&name) {
            send_to(&watcher, &notice);
        }
        Ok(())
    }

    async fn route_data(&self, conn: &ConnectionState, data: DataMessage) -> Result<(), ZoneError> {
        let sender = conn.peer.name();
        reply(conn, DataAck { name: sender.clone() })?;

        match &data.payload {
            DataPayload::Text(text) => {
                tracing::info!(conn_id = %conn.id(), from = %sender, to = %data.peer, text = %text.trim_end_matches('\0'), "data message");
                if data.peer.eq_ignore_ascii_case(&self.config.feedback_name) {
                    if let Err(e) = self.feedback.append(&sender, text).await {
                        tracing::warn!(conn_id = %conn.id(), error = %e, "feedback not stored");
                    }
                    return Ok(());
                }
            }
            DataPayload::Rendezvous(rendezvous) => {
                tracing::info!(
                    conn_id = %conn.id(),
                    from = %sender,
                    to = %data.peer,
                    kind = ?rendezvous.kind(),
                    primary = ?rendezvous.primary_address(),
                    secondary = ?rendezvous.secondary_address(),
                    accepted = ?rendezvous.accepted(),
                    "rendezvous"
                );
            }
        }

        match self.directory.find(&data.peer) {
            Some(addressee) => {
                let forwarded = ServerMessage::from(DataMessage {
                    peer: sender,
                    payload: data.payload,
                });
                send_to(&addressee, &forwarded);
            }
            None => {
                tracing::warn!(conn_id = %conn.id(), to = %data.peer, "addressee not online");
            }
        }
        Ok(())
    }

    fn talk(&self, conn: &ConnectionState, talk: Talk) {
        let Some(lobby) = &conn.lobby else {
            return;
        };
        if let Err(e) = lobby.talk(conn.id(), &talk.text) {
            tracing::warn!(conn_id = %conn.id(), error = %e, "chat line dropped");
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Cuts the next frame off the inbound buffer.
///
/// A checksum mismatch still yields the frame, as parsed, so the
/// exchange can continue.
fn next_frame(conn: &mut ConnectionState) -> Option<Frame> {
    let key = conn.peer.outbox().key();
    let decoded = decode_frame(&conn.inbound, key)
        .map(|(frame, rest)| (frame, conn.inbound.len() - rest.len()));

    let (frame, used) = match decoded {
        Ok(decoded) => decoded,
        Err(ProtocolError::ChecksumMismatch { frame, computed }) => {
            tracing::warn!(
                conn_id = %conn.id(),
                expected = computed,
                got = frame.checksum,
                "checksum mismatch"
            );
            let used = frame.encoded_len();
            (*frame, used)
        }
        Err(ProtocolError::Incomplete { needed, .. }) if needed > MAX_FRAME_LEN => {
            tracing::warn!(conn_id = %conn.id(), needed, "oversized frame; input discarded");
            conn.inbound.clear();
            return None;
        }
        Err(e) if e.is_incomplete() => return None,
        Err(e) => {
            tracing::warn!(conn_id = %conn.id(), error = %e, "undecodable input discarded");
            conn.inbound.clear();
            return None;
        }
    };
    conn.inbound.drain(..used);
    Some(frame)
}

fn advance(conn: &ConnectionState, from: Phase) {
    let mut profile = conn.peer.profile();
    if profile.phase != from {
        return;
    }
    if let Some(next) = from.next() {
        profile.phase = next;
    }
}

fn reply(conn: &ConnectionState, message: impl Into<ServerMessage>) -> Result<(), ProtocolError> {
    conn.peer.outbox().send(&message.into())
}

/// Queues onto another connection. Failures there are that connection's
/// problem, not the sender's.
fn send_to(peer: &Peer, message: &ServerMessage) {
    if let Err(e) = peer.outbox().send(message) {
        tracing::warn!(conn_id = %peer.id(), error = %e, "message not queued");
    }
}
