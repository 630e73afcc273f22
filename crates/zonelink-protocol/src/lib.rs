//! Wire protocol for the zone lobby service.
//!
//! Everything a zone client and server exchange travels in two layers:
//!
//! - a [`Frame`]: a 16-byte header (signature, size, sequence id,
//!   checksum) followed by the message bytes, XOR-obfuscated with the
//!   connection's secure key;
//! - a [`Message`]: a type id and size followed by a payload whose layout
//!   depends on the type id.
//!
//! The [`registry`] maps inbound type ids to parsers, and
//! [`ServerMessage`] covers everything the server sends back.
//!
//! Every function in this crate is pure: no sockets, no locks, no
//! connection state. Callers own the buffers and the keys.

mod data;
mod error;
mod frame;
mod message;
mod presence;
mod room;
mod secure;
mod types;
mod wire;

pub mod registry;

pub use data::{DataAck, DataMessage, DataPayload, Rendezvous, RendezvousKind};
pub use error::ProtocolError;
pub use frame::{
    BOOTSTRAP_KEY, Frame, HEADER_LEN, HandshakeInit, SIGNATURE, UnionType,
    checksum, decode_frame, encode_frame, fix_tail, obfuscate,
};
pub use message::{KEEP_ALIVE, Message, Wire};
pub use presence::{StateAck, StateUpdate, UserPresence, Watch, WatchAck, WatchNameLayout};
pub use registry::{ClientMessage, Scope, ServerMessage};
pub use room::{
    InfoRecord, NAME_FIELD_LEN, RoomAccessed, RoomConnect, RoomDisconnect,
    RoomEnter, RoomInfo, RoomLeave, Talk, TalkById, TalkByName,
};
pub use secure::{
    AccessDenied, AccessGranted, Authenticate, ClientHello, Connect,
    ConnectAck, Disconnect, SecurityContextReply, SecurityContextRequest,
    ServerHello,
};
pub use types::{AppId, Presence, UserState};
