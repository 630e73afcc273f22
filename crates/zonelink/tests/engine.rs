//! Integration tests for the protocol engine, driven without sockets.

use std::net::SocketAddr;
use std::sync::Mutex;

use zonelink::prelude::*;
use zonelink::ConnectionState;
use zonelink_protocol::{
    AccessDenied, AccessGranted, AppId, Authenticate, ClientHello, Connect, ConnectAck,
    DataAck, DataMessage, DataPayload, Frame, HandshakeInit, Message, RoomAccessed,
    RoomConnect, RoomDisconnect, RoomEnter, RoomInfo, SecurityContextReply,
    SecurityContextRequest, ServerHello, StateAck, StateUpdate, Talk, TalkById, UnionType,
    UserPresence, UserState, Watch, WatchAck, Wire, decode_frame, encode_frame, obfuscate,
};
use zonelink_session::WriteReceiver;

// =========================================================================
// Test doubles and helpers
// =========================================================================

#[derive(Default)]
struct RecordingFeedback {
    lines: Mutex<Vec<(String, String)>>,
}

impl FeedbackSink for RecordingFeedback {
    async fn append(&self, from: &str, text: &str) -> Result<(), SessionError> {
        self.lines
            .lock()
            .unwrap()
            .push((from.to_string(), text.to_string()));
        Ok(())
    }
}

type TestEngine = Engine<StaticResolver, RecordingFeedback>;

const ALICE: i32 = 1001;
const BOB: i32 = 1002;

fn test_config() -> ServerConfig {
    ServerConfig {
        lobby_base_port: 0,
        lobby_count: 2,
        handshake: HandshakeConfig {
            fixed_key: Some(0x5a5a_5a5a),
            fixed_sequence: Some(100),
        },
        ..ServerConfig::default()
    }
}

fn engine_with(config: ServerConfig) -> TestEngine {
    let resolver = StaticResolver::new(Default::default())
        .with(ALICE, "alice")
        .with(BOB, "bob");
    Engine::new(config, resolver, RecordingFeedback::default())
}

fn engine() -> TestEngine {
    engine_with(test_config())
}

/// A scripted client: feeds frames into the engine and decodes what the
/// outbox hands to the writer.
struct Client {
    state: ConnectionState,
    writes: WriteReceiver,
    key: u32,
    sequence: u32,
}

impl Client {
    /// Opens a connection and consumes the handshake-init record.
    async fn open(engine: &TestEngine, id: u64, listener: Listener) -> (Self, HandshakeInit) {
        let addr: SocketAddr = "127.0.0.1:40000".parse().unwrap();
        let (mut state, mut writes) = engine.open(ConnectionId::new(id), addr, listener);
        let flow = engine.process(&mut state, b"\x01\x02\x03").await.unwrap();
        assert_eq!(flow, Flow::Continue);

        let buf = writes.try_recv().expect("handshake-init");
        assert_eq!(buf.len(), HandshakeInit::LEN);
        let init = HandshakeInit::decode(&buf).unwrap();
        state.peer().outbox().write_complete();

        let client = Self {
            state,
            writes,
            key: init.secure_key,
            sequence: 0,
        };
        (client, init)
    }

    fn frame_bytes(&mut self, message: Message) -> Vec<u8> {
        let frame = Frame::new(self.sequence, message.encode());
        self.sequence += 1;
        encode_frame(&frame, self.key)
    }

    async fn send(&mut self, engine: &TestEngine, message: impl Wire) -> Flow {
        let bytes = self.frame_bytes(message.to_message().unwrap());
        engine.process(&mut self.state, &bytes).await.unwrap()
    }

    /// Every message queued for this client so far, acknowledging each
    /// write so coalesced frames behind it are released too.
    fn received(&mut self) -> Vec<Message> {
        let mut messages = Vec::new();
        while let Ok(buf) = self.writes.try_recv() {
            let mut rest = &buf[..];
            while !rest.is_empty() {
                let (frame, tail) = decode_frame(rest, self.key).unwrap();
                messages.push(Message::decode(&frame.data).unwrap());
                rest = tail;
            }
            self.state.peer().outbox().write_complete();
        }
        messages
    }

    fn phase(&self) -> Phase {
        self.state.phase()
    }
}

fn security_request(user_id: i32) -> SecurityContextRequest {
    SecurityContextRequest {
        unknown_0: 0,
        unknown_1: 0,
        user_id,
        credential: vec![0xab; 32],
    }
}

fn authenticate() -> Authenticate {
    Authenticate {
        unknown_0: 0,
        unknown_1: 0,
        blob: vec![0; 20],
    }
}

/// Walks a client from handshake to `Linking`.
async fn login(engine: &TestEngine, id: u64, user_id: i32, listener: Listener) -> Client {
    let (mut client, _) = Client::open(engine, id, listener).await;
    client.send(engine, ClientHello::default()).await;
    client.send(engine, security_request(user_id)).await;
    client.send(engine, authenticate()).await;
    assert_eq!(client.phase(), Phase::Linking);
    client.received();
    client
}

async fn online(engine: &TestEngine, id: u64, user_id: i32) -> Client {
    let mut client = login(engine, id, user_id, Listener::Direct).await;
    client.send(engine, Connect::default()).await;
    assert_eq!(client.phase(), Phase::Online);
    client.received();
    client
}

fn ids(messages: &[Message]) -> Vec<i32> {
    messages.iter().map(|m| m.type_id).collect()
}

fn presence(state: UserState) -> Presence {
    Presence {
        state,
        app: AppId::Expansion,
    }
}

// =========================================================================
// Handshake and login
// =========================================================================

#[tokio::test]
async fn test_process_first_bytes_sends_handshake_init() {
    let engine = engine();
    let (client, init) = Client::open(&engine, 1, Listener::Direct).await;

    assert_eq!(init.secure_key, 0x5a5a_5a5a);
    assert_eq!(init.sequence_id, 100);
    assert_eq!(init.union_type, UnionType::DIRECT);
    assert_eq!(client.phase(), Phase::ExchangingHandshake);
    assert_eq!(client.state.buffered(), 0);
}

#[tokio::test]
async fn test_process_lobby_listener_announces_room_union() {
    let engine = engine();
    let (_, init) = Client::open(&engine, 1, Listener::Lobby(0)).await;
    assert_eq!(init.union_type, UnionType::ROOM);
}

#[tokio::test]
async fn test_login_replies_in_order_and_numbers_from_handshake() {
    let engine = engine();
    let (mut client, _) = Client::open(&engine, 1, Listener::Direct).await;

    client.send(&engine, ClientHello::default()).await;
    client.send(&engine, security_request(ALICE)).await;
    client.send(&engine, authenticate()).await;

    let mut rest = Vec::new();
    while let Ok(buf) = client.writes.try_recv() {
        rest.extend_from_slice(&buf);
        client.state.peer().outbox().write_complete();
    }
    let mut sequences = Vec::new();
    let mut types = Vec::new();
    let mut cursor = &rest[..];
    while !cursor.is_empty() {
        let (frame, tail) = decode_frame(cursor, client.key).unwrap();
        sequences.push(frame.sequence_id);
        let message = Message::decode(&frame.data).unwrap();
        if message.type_id == AccessGranted::TYPE_ID {
            let granted = AccessGranted::read(message.payload()).unwrap();
            assert_eq!(granted.user_id, ALICE);
            assert_eq!(granted.name, "alice");
        }
        types.push(message.type_id);
        cursor = tail;
    }

    assert_eq!(
        types,
        vec![
            ServerHello::TYPE_ID,
            SecurityContextReply::TYPE_ID,
            AccessGranted::TYPE_ID
        ]
    );
    assert_eq!(sequences, vec![100, 101, 102]);
}

#[tokio::test]
async fn test_connect_goes_online_with_ack_and_welcome() {
    let engine = engine();
    let mut client = login(&engine, 1, ALICE, Listener::Direct).await;

    client.send(&engine, Connect::default()).await;
    let messages = client.received();

    assert_eq!(ids(&messages), vec![ConnectAck::TYPE_ID, DataMessage::TYPE_ID]);
    let ack = ConnectAck::read(messages[0].payload()).unwrap();
    assert!(ack.config.starts_with("user=<alice>"));
    let welcome = DataMessage::read(messages[1].payload()).unwrap();
    assert_eq!(welcome.peer, "Server");
    assert_eq!(welcome.payload, DataPayload::Text(zonelink::DEFAULT_WELCOME.to_string()));

    assert_eq!(client.phase(), Phase::Online);
    assert!(engine.directory().find("ALICE").is_some());
}

#[tokio::test]
async fn test_connect_empty_welcome_sends_ack_only() {
    let engine = engine_with(ServerConfig {
        welcome_message: String::new(),
        ..test_config()
    });
    let mut client = login(&engine, 1, ALICE, Listener::Direct).await;

    client.send(&engine, Connect::default()).await;
    assert_eq!(ids(&client.received()), vec![ConnectAck::TYPE_ID]);
}

#[tokio::test]
async fn test_security_context_unknown_user_gets_placeholder() {
    let engine = engine();
    let client = login(&engine, 1, 4242, Listener::Direct).await;
    assert_eq!(client.state.peer().name(), "Player4242");
}

#[tokio::test]
async fn test_security_context_deny_policy_closes_connection() {
    let mut config = test_config();
    config.identity.lookup_failure = LookupFailure::Deny;
    let engine = engine_with(config);
    let (mut client, _) = Client::open(&engine, 1, Listener::Direct).await;
    client.send(&engine, ClientHello::default()).await;

    let flow = client.send(&engine, security_request(4242)).await;

    assert_eq!(flow, Flow::Close);
    let messages = client.received();
    assert_eq!(
        ids(&messages),
        vec![ServerHello::TYPE_ID, AccessDenied::TYPE_ID]
    );
    assert_eq!(client.phase(), Phase::Offline);
}

#[tokio::test]
async fn test_message_out_of_phase_is_ignored() {
    let engine = engine();
    let (mut client, _) = Client::open(&engine, 1, Listener::Direct).await;

    let flow = client.send(&engine, Watch::for_name("bob")).await;

    assert_eq!(flow, Flow::Continue);
    assert!(client.received().is_empty());
    assert_eq!(client.phase(), Phase::ExchangingHandshake);
}

#[tokio::test]
async fn test_keep_alive_accepted_without_reply() {
    let engine = engine();
    let mut client = online(&engine, 1, ALICE).await;

    let bytes = client.frame_bytes(Message::keep_alive());
    let flow = engine.process(&mut client.state, &bytes).await.unwrap();

    assert_eq!(flow, Flow::Continue);
    assert!(client.received().is_empty());
}

// =========================================================================
// Reassembly
// =========================================================================

#[tokio::test]
async fn test_process_split_frame_waits_for_remainder() {
    let engine = engine();
    let (mut client, _) = Client::open(&engine, 1, Listener::Direct).await;
    let bytes = client.frame_bytes(ClientHello::default().to_message().unwrap());
    let (head, tail) = bytes.split_at(10);

    engine.process(&mut client.state, head).await.unwrap();
    assert_eq!(client.state.buffered(), 10);
    assert!(client.received().is_empty());

    engine.process(&mut client.state, tail).await.unwrap();
    assert_eq!(client.state.buffered(), 0);
    assert_eq!(ids(&client.received()), vec![ServerHello::TYPE_ID]);
}

#[tokio::test]
async fn test_process_two_frames_in_one_chunk_handles_both() {
    let engine = engine();
    let (mut client, _) = Client::open(&engine, 1, Listener::Direct).await;
    let mut bytes = client.frame_bytes(ClientHello::default().to_message().unwrap());
    bytes.extend(client.frame_bytes(security_request(BOB).to_message().unwrap()));

    engine.process(&mut client.state, &bytes).await.unwrap();

    assert_eq!(
        ids(&client.received()),
        vec![ServerHello::TYPE_ID, SecurityContextReply::TYPE_ID]
    );
    assert_eq!(client.phase(), Phase::Authenticating);
}

#[tokio::test]
async fn test_process_checksum_mismatch_still_handles_frame() {
    let engine = engine();
    let (mut client, _) = Client::open(&engine, 1, Listener::Direct).await;
    let mut bytes = client.frame_bytes(ClientHello::default().to_message().unwrap());
    // Flip a bit in the hello's trailing field; the type id stays intact.
    let last = bytes.len() - 1;
    bytes[last] ^= 0x01;

    engine.process(&mut client.state, &bytes).await.unwrap();

    assert_eq!(ids(&client.received()), vec![ServerHello::TYPE_ID]);
    assert_eq!(client.state.buffered(), 0);
}

#[tokio::test]
async fn test_process_oversized_header_discards_input() {
    let engine = engine();
    let (mut client, _) = Client::open(&engine, 1, Listener::Direct).await;
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&zonelink_protocol::SIGNATURE.to_le_bytes());
    bytes.extend_from_slice(&(1u32 << 24).to_le_bytes());
    bytes.extend_from_slice(&[0; 8]);
    obfuscate(&mut bytes, client.key);
    bytes.extend_from_slice(&[0; 8]);

    engine.process(&mut client.state, &bytes).await.unwrap();

    assert_eq!(client.state.buffered(), 0);
    assert!(client.received().is_empty());
}

// =========================================================================
// Presence
// =========================================================================

#[tokio::test]
async fn test_watch_online_user_reports_current_presence() {
    let engine = engine();
    let mut alice = online(&engine, 1, ALICE).await;
    let mut bob = online(&engine, 2, BOB).await;
    bob.send(&engine, StateUpdate { presence: presence(UserState::AWAY) })
        .await;
    bob.received();

    alice.send(&engine, Watch::for_name("bob")).await;
    let messages = alice.received();

    assert_eq!(ids(&messages), vec![WatchAck::TYPE_ID, UserPresence::TYPE_ID]);
    assert_eq!(WatchAck::read(messages[0].payload()).unwrap().name, "bob");
    let notice = UserPresence::read(messages[1].payload()).unwrap();
    assert_eq!(notice.name, "bob");
    assert_eq!(notice.presence, presence(UserState::AWAY));
}

#[tokio::test]
async fn test_watch_offline_user_acks_only() {
    let engine = engine();
    let mut alice = online(&engine, 1, ALICE).await;

    alice.send(&engine, Watch::for_name("nobody")).await;

    assert_eq!(ids(&alice.received()), vec![WatchAck::TYPE_ID]);
    assert!(alice.state.peer().profile().is_watching("nobody"));
}

#[tokio::test]
async fn test_state_update_fans_out_to_watchers() {
    let engine = engine();
    let mut alice = online(&engine, 1, ALICE).await;
    let mut bob = online(&engine, 2, BOB).await;
    alice.send(&engine, Watch::for_name("bob")).await;
    alice.received();

    bob.send(&engine, StateUpdate { presence: presence(UserState::PLAYING_GAME) })
        .await;

    assert_eq!(ids(&bob.received()), vec![StateAck::TYPE_ID]);
    let messages = alice.received();
    assert_eq!(ids(&messages), vec![UserPresence::TYPE_ID]);
    let notice = UserPresence::read(messages[0].payload()).unwrap();
    assert_eq!(notice.presence.state, UserState::PLAYING_GAME);
}

#[tokio::test]
async fn test_disconnect_tells_watchers_offline_once() {
    let engine = engine();
    let mut alice = online(&engine, 1, ALICE).await;
    let bob = online(&engine, 2, BOB).await;
    alice.send(&engine, Watch::for_name("bob")).await;
    alice.received();

    engine.disconnect(&bob.state);
    engine.disconnect(&bob.state);

    let messages = alice.received();
    assert_eq!(ids(&messages), vec![UserPresence::TYPE_ID]);
    let notice = UserPresence::read(messages[0].payload()).unwrap();
    assert_eq!(notice.name, "bob");
    assert!(notice.presence.is_offline());
    assert!(engine.directory().find("bob").is_none());
    assert_eq!(bob.phase(), Phase::Offline);
}

#[tokio::test]
async fn test_disconnect_before_online_leaves_directory_alone() {
    let engine = engine();
    let _alice = online(&engine, 1, ALICE).await;
    let early = login(&engine, 2, ALICE, Listener::Direct).await;

    engine.disconnect(&early.state);

    assert!(engine.directory().find("alice").is_some());
}

#[tokio::test]
async fn test_process_after_offline_closes() {
    let engine = engine();
    let mut alice = online(&engine, 1, ALICE).await;
    engine.disconnect(&alice.state);

    let flow = alice.send(&engine, Watch::for_name("bob")).await;

    assert_eq!(flow, Flow::Close);
}

// =========================================================================
// Data routing
// =========================================================================

#[tokio::test]
async fn test_data_text_routed_with_sender_name() {
    let engine = engine();
    let mut alice = online(&engine, 1, ALICE).await;
    let mut bob = online(&engine, 2, BOB).await;

    alice.send(&engine, DataMessage::text("Bob", "gg")).await;

    let acks = alice.received();
    assert_eq!(ids(&acks), vec![DataAck::TYPE_ID]);
    assert_eq!(DataAck::read(acks[0].payload()).unwrap().name, "alice");

    let delivered = bob.received();
    assert_eq!(ids(&delivered), vec![DataMessage::TYPE_ID]);
    let data = DataMessage::read(delivered[0].payload()).unwrap();
    assert_eq!(data, DataMessage::text("alice", "gg"));
}

#[tokio::test]
async fn test_data_missing_addressee_still_acked() {
    let engine = engine();
    let mut alice = online(&engine, 1, ALICE).await;

    alice.send(&engine, DataMessage::text("ghost", "hello?")).await;

    assert_eq!(ids(&alice.received()), vec![DataAck::TYPE_ID]);
}

#[tokio::test]
async fn test_data_to_feedback_user_goes_to_sink() {
    let engine = engine();
    let mut alice = online(&engine, 1, ALICE).await;

    alice.send(&engine, DataMessage::text("feedback", "more maps")).await;

    assert_eq!(ids(&alice.received()), vec![DataAck::TYPE_ID]);
    let lines = engine_feedback(&engine);
    assert_eq!(lines, vec![("alice".to_string(), "more maps".to_string())]);
}

fn engine_feedback(engine: &TestEngine) -> Vec<(String, String)> {
    engine.feedback().lines.lock().unwrap().clone()
}

#[tokio::test]
async fn test_data_rendezvous_relayed_verbatim() {
    let engine = engine();
    let mut alice = online(&engine, 1, ALICE).await;
    let mut bob = online(&engine, 2, BOB).await;
    let mut raw = vec![0x80, 4, 0, 0, 0, 0, 10, 0, 0, 7];
    raw.resize(26, 0);
    let payload = DataPayload::Rendezvous(zonelink_protocol::Rendezvous { raw });

    alice
        .send(
            &engine,
            DataMessage {
                peer: "bob".into(),
                payload: payload.clone(),
            },
        )
        .await;

    assert_eq!(ids(&alice.received()), vec![DataAck::TYPE_ID]);
    let delivered = bob.received();
    let data = DataMessage::read(delivered[0].payload()).unwrap();
    assert_eq!(data.peer, "alice");
    assert_eq!(data.payload, payload);
}

// =========================================================================
// Lobbies
// =========================================================================

async fn seated(engine: &TestEngine, id: u64, user_id: i32, name: &str) -> Client {
    let mut client = login(engine, id, user_id, Listener::Lobby(0)).await;
    client
        .send(
            engine,
            RoomConnect {
                user_id,
                name: name.to_string(),
            },
        )
        .await;
    assert_eq!(client.phase(), Phase::Online);
    client
}

#[tokio::test]
async fn test_room_connect_seats_user_in_its_lobby() {
    let engine = engine();
    let mut alice = seated(&engine, 1, ALICE, "alice").await;

    let messages = alice.received();

    assert_eq!(
        ids(&messages),
        vec![RoomAccessed::TYPE_ID, RoomEnter::TYPE_ID, RoomInfo::TYPE_ID]
    );
    let accessed = RoomAccessed::read(messages[0].payload()).unwrap();
    assert_eq!(accessed.user_id, ALICE);
    assert_eq!(accessed.short_id, zonelink_lobby::FIRST_SHORT_ID);
    assert_eq!(engine.lobbies()[0].member_count(), 1);
    assert_eq!(engine.lobbies()[1].member_count(), 0);
    assert!(engine.directory().is_empty());
}

#[tokio::test]
async fn test_talk_reaches_every_member() {
    let engine = engine();
    let mut alice = seated(&engine, 1, ALICE, "alice").await;
    let mut bob = seated(&engine, 2, BOB, "bob").await;
    alice.received();
    bob.received();

    alice
        .send(
            &engine,
            Talk {
                short_id: 0,
                text: "hi all".into(),
            },
        )
        .await;

    for client in [&mut alice, &mut bob] {
        let messages = client.received();
        assert_eq!(ids(&messages), vec![TalkById::TYPE_ID]);
        let talk = TalkById::read(messages[0].payload()).unwrap();
        assert_eq!(talk.short_id, zonelink_lobby::FIRST_SHORT_ID);
        assert_eq!(talk.text, "hi all");
    }
}

#[tokio::test]
async fn test_room_disconnect_leaves_lobby_and_closes() {
    let engine = engine();
    let mut alice = seated(&engine, 1, ALICE, "alice").await;
    let _bob = seated(&engine, 2, BOB, "bob").await;
    alice.received();

    let flow = alice.send(&engine, RoomDisconnect).await;

    assert_eq!(flow, Flow::Close);
    assert_eq!(engine.lobbies()[0].member_count(), 1);
    assert_eq!(alice.phase(), Phase::Offline);
}

#[tokio::test]
async fn test_connect_on_lobby_listener_is_ignored() {
    let engine = engine();
    let mut client = login(&engine, 1, ALICE, Listener::Lobby(1)).await;

    client.send(&engine, Connect::default()).await;

    assert!(client.received().is_empty());
    assert_eq!(client.phase(), Phase::Linking);
}
