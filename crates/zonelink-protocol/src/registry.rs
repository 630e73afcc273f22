//! Static table of inbound message kinds, and the set of outbound kinds.
//!
//! Adding a client message kind means adding a variant to
//! [`ClientMessage`] and a row to `CLIENT_KINDS`. Type ids are only
//! unique per [`Scope`]: the room protocol reuses small ids.

use crate::data::DataMessage;
use crate::message::{Message, Wire};
use crate::presence::{StateUpdate, Watch};
use crate::room::{RoomConnect, RoomDisconnect, Talk};
use crate::secure::{Authenticate, ClientHello, Connect, Disconnect, SecurityContextRequest};
use crate::{
    AccessDenied, AccessGranted, ConnectAck, DataAck, ProtocolError, RoomAccessed, RoomEnter,
    RoomInfo, RoomLeave, SecurityContextReply, ServerHello, StateAck, TalkById, TalkByName,
    UserPresence, WatchAck,
};

/// Which listener a connection came in on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// The messaging port: presence, watches, direct data.
    Direct,
    /// A chat room port.
    Room,
}

impl Scope {
    pub fn is_room(self) -> bool {
        self == Self::Room
    }
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// Every message kind a client may send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    KeepAlive,
    Hello(ClientHello),
    SecurityContext(SecurityContextRequest),
    Authenticate(Authenticate),
    Connect(Connect),
    RoomConnect(RoomConnect),
    /// Direct or room sign-off.
    Disconnect,
    State(StateUpdate),
    Watch(Watch),
    Data(DataMessage),
    Talk(Talk),
}

impl ClientMessage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::KeepAlive => "KeepAlive",
            Self::Hello(_) => ClientHello::NAME,
            Self::SecurityContext(_) => SecurityContextRequest::NAME,
            Self::Authenticate(_) => Authenticate::NAME,
            Self::Connect(_) => Connect::NAME,
            Self::RoomConnect(_) => RoomConnect::NAME,
            Self::Disconnect => Disconnect::NAME,
            Self::State(_) => StateUpdate::NAME,
            Self::Watch(_) => Watch::NAME,
            Self::Data(_) => DataMessage::NAME,
            Self::Talk(_) => Talk::NAME,
        }
    }
}

macro_rules! client_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for ClientMessage {
            fn from(value: $ty) -> Self {
                Self::$variant(value)
            }
        })*
    };
}

client_from! {
    ClientHello => Hello,
    SecurityContextRequest => SecurityContext,
    Authenticate => Authenticate,
    Connect => Connect,
    RoomConnect => RoomConnect,
    StateUpdate => State,
    Watch => Watch,
    DataMessage => Data,
    Talk => Talk,
}

impl From<Disconnect> for ClientMessage {
    fn from(_: Disconnect) -> Self {
        Self::Disconnect
    }
}

impl From<RoomDisconnect> for ClientMessage {
    fn from(_: RoomDisconnect) -> Self {
        Self::Disconnect
    }
}

#[derive(Clone, Copy)]
enum Accepts {
    Any,
    Only(Scope),
}

type Parser = fn(&[u8]) -> Result<ClientMessage, ProtocolError>;

struct Entry {
    type_id: i32,
    accepts: Accepts,
    parse: Parser,
}

impl Entry {
    fn matches(&self, type_id: i32, scope: Scope) -> bool {
        self.type_id == type_id
            && match self.accepts {
                Accepts::Any => true,
                Accepts::Only(only) => only == scope,
            }
    }
}

fn parse_as<T: Wire + Into<ClientMessage>>(payload: &[u8]) -> Result<ClientMessage, ProtocolError> {
    T::read(payload).map(Into::into)
}

const fn row<T: Wire + Into<ClientMessage>>(accepts: Accepts) -> Entry {
    Entry {
        type_id: T::TYPE_ID,
        accepts,
        parse: parse_as::<T>,
    }
}

static CLIENT_KINDS: &[Entry] = &[
    row::<ClientHello>(Accepts::Any),
    row::<SecurityContextRequest>(Accepts::Any),
    row::<Authenticate>(Accepts::Any),
    row::<Connect>(Accepts::Only(Scope::Direct)),
    row::<Disconnect>(Accepts::Only(Scope::Direct)),
    row::<StateUpdate>(Accepts::Only(Scope::Direct)),
    row::<Watch>(Accepts::Only(Scope::Direct)),
    row::<DataMessage>(Accepts::Only(Scope::Direct)),
    row::<RoomConnect>(Accepts::Only(Scope::Room)),
    row::<Talk>(Accepts::Only(Scope::Room)),
    row::<RoomDisconnect>(Accepts::Only(Scope::Room)),
];

/// Parses a client message.
///
/// Returns `Ok(None)` for type ids with no registered parser in this
/// scope; the caller decides how loudly to ignore them.
///
/// # Errors
/// Propagates layout errors from the matching parser.
pub fn dispatch(message: &Message, scope: Scope) -> Result<Option<ClientMessage>, ProtocolError> {
    if message.is_keep_alive() {
        return Ok(Some(ClientMessage::KeepAlive));
    }
    CLIENT_KINDS
        .iter()
        .find(|entry| entry.matches(message.type_id, scope))
        .map(|entry| (entry.parse)(message.payload()))
        .transpose()
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// Every message kind the server sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    Hello(ServerHello),
    SecurityContext(SecurityContextReply),
    AccessGranted(AccessGranted),
    AccessDenied(AccessDenied),
    ConnectAck(ConnectAck),
    StateAck(StateAck),
    WatchAck(WatchAck),
    User(UserPresence),
    Data(DataMessage),
    DataAck(DataAck),
    RoomAccessed(RoomAccessed),
    RoomInfo(RoomInfo),
    Enter(RoomEnter),
    Leave(RoomLeave),
    TalkById(TalkById),
    TalkByName(TalkByName),
}

impl ServerMessage {
    pub fn to_message(&self) -> Result<Message, ProtocolError> {
        match self {
            Self::Hello(m) => m.to_message(),
            Self::SecurityContext(m) => m.to_message(),
            Self::AccessGranted(m) => m.to_message(),
            Self::AccessDenied(m) => m.to_message(),
            Self::ConnectAck(m) => m.to_message(),
            Self::StateAck(m) => m.to_message(),
            Self::WatchAck(m) => m.to_message(),
            Self::User(m) => m.to_message(),
            Self::Data(m) => m.to_message(),
            Self::DataAck(m) => m.to_message(),
            Self::RoomAccessed(m) => m.to_message(),
            Self::RoomInfo(m) => m.to_message(),
            Self::Enter(m) => m.to_message(),
            Self::Leave(m) => m.to_message(),
            Self::TalkById(m) => m.to_message(),
            Self::TalkByName(m) => m.to_message(),
        }
    }

    pub fn type_id(&self) -> i32 {
        match self {
            Self::Hello(_) => ServerHello::TYPE_ID,
            Self::SecurityContext(_) => SecurityContextReply::TYPE_ID,
            Self::AccessGranted(_) => AccessGranted::TYPE_ID,
            Self::AccessDenied(_) => AccessDenied::TYPE_ID,
            Self::ConnectAck(_) => ConnectAck::TYPE_ID,
            Self::StateAck(_) => StateAck::TYPE_ID,
            Self::WatchAck(_) => WatchAck::TYPE_ID,
            Self::User(_) => UserPresence::TYPE_ID,
            Self::Data(_) => DataMessage::TYPE_ID,
            Self::DataAck(_) => DataAck::TYPE_ID,
            Self::RoomAccessed(_) => RoomAccessed::TYPE_ID,
            Self::RoomInfo(_) => RoomInfo::TYPE_ID,
            Self::Enter(_) => RoomEnter::TYPE_ID,
            Self::Leave(_) => RoomLeave::TYPE_ID,
            Self::TalkById(_) => TalkById::TYPE_ID,
            Self::TalkByName(_) => TalkByName::TYPE_ID,
        }
    }
}

macro_rules! server_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for ServerMessage {
            fn from(value: $ty) -> Self {
                Self::$variant(value)
            }
        })*
    };
}

server_from! {
    ServerHello => Hello,
    SecurityContextReply => SecurityContext,
    AccessGranted => AccessGranted,
    AccessDenied => AccessDenied,
    ConnectAck => ConnectAck,
    StateAck => StateAck,
    WatchAck => WatchAck,
    UserPresence => User,
    DataMessage => Data,
    DataAck => DataAck,
    RoomAccessed => RoomAccessed,
    RoomInfo => RoomInfo,
    RoomEnter => Enter,
    RoomLeave => Leave,
    TalkById => TalkById,
    TalkByName => TalkByName,
}
