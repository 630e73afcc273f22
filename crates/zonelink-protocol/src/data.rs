//! Data messages: user-to-user chat lines and game rendezvous records.
//!
//! The same layout travels both ways. From a client, `peer` names the
//! addressee; from the server, it names the sender.
//!
//! ```text
//! +--------+----------+-----------------+----------------------+
//! | 0: i32 | len: i16 | peer (ASCII\0)  | payload (len bytes)  |
//! +--------+----------+-----------------+----------------------+
//! ```
//!
//! A payload whose first byte is `0x80` is a binary rendezvous record;
//! anything else is UTF-16BE text.

use std::net::Ipv4Addr;

use bytes::{BufMut, BytesMut};

use crate::ProtocolError;
use crate::message::Wire;
use crate::wire::{Reader, from_utf16_be, put_cstr, utf16_be};

const RENDEZVOUS_MARKER: u8 = 0x80;
/// Text payloads end with four UTF-16 NULs.
const TEXT_TERMINATOR: [u8; 8] = [0; 8];
const SECONDARY_ADDRESS_GAP: usize = 16;

/// What a rendezvous record is about, from its sub-type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendezvousKind {
    Invitation,
    InvitationResponse,
    InvitationJoin,
    InvitationExpired,
    JoinRequest,
    JoinResponse,
    InvitationTimeout,
    Other(u8),
}

impl From<u8> for RendezvousKind {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Invitation,
            1 => Self::InvitationResponse,
            2 => Self::InvitationJoin,
            3 => Self::InvitationExpired,
            4 => Self::JoinRequest,
            5 => Self::JoinResponse,
            7 => Self::InvitationTimeout,
            other => Self::Other(other),
        }
    }
}

impl RendezvousKind {
    /// Where the primary IPv4 address sits in the payload, for kinds that
    /// carry one.
    fn address_offset(self) -> Option<usize> {
        match self {
            Self::JoinRequest => Some(6),
            Self::JoinResponse => Some(8),
            Self::Invitation | Self::InvitationExpired => Some(7),
            _ => None,
        }
    }
}

/// A binary rendezvous record. Relayed byte for byte; the accessors only
/// inspect it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendezvous {
    pub raw: Vec<u8>,
}

impl Rendezvous {
    pub fn kind(&self) -> RendezvousKind {
        RendezvousKind::from(self.raw.get(1).copied().unwrap_or(0xff))
    }

    pub fn primary_address(&self) -> Option<Ipv4Addr> {
        let offset = self.kind().address_offset()?;
        self.address_at(offset)
    }

    pub fn secondary_address(&self) -> Option<Ipv4Addr> {
        let offset = self.kind().address_offset()?;
        self.address_at(offset + SECONDARY_ADDRESS_GAP)
    }

    /// For invitation responses, whether the invitation was accepted.
    pub fn accepted(&self) -> Option<bool> {
        match self.kind() {
            RendezvousKind::InvitationResponse => self.raw.get(2).map(|b| *b == 1),
            _ => None,
        }
    }

    fn address_at(&self, offset: usize) -> Option<Ipv4Addr> {
        let octets: [u8; 4] = self.raw.get(offset..offset + 4)?.try_into().ok()?;
        Some(Ipv4Addr::from(octets))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataPayload {
    Text(String),
    Rendezvous(Rendezvous),
}

impl DataPayload {
    fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Text(text) => {
                let mut bytes = utf16_be(text);
                if !text.ends_with('\0') {
                    bytes.extend_from_slice(&TEXT_TERMINATOR);
                }
                bytes
            }
            Self::Rendezvous(rendezvous) => rendezvous.raw.clone(),
        }
    }

    fn from_bytes(bytes: &[u8]) -> Self {
        match bytes.first() {
            Some(&RENDEZVOUS_MARKER) => Self::Rendezvous(Rendezvous {
                raw: bytes.to_vec(),
            }),
            _ => Self::Text(from_utf16_be(bytes)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataMessage {
    pub peer: String,
    pub payload: DataPayload,
}

impl DataMessage {
    pub fn text(peer: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            peer: peer.into(),
            payload: DataPayload::Text(text.into()),
        }
    }
}

impl Wire for DataMessage {
    const TYPE_ID: i32 = 4111;
    const NAME: &'static str = "DataMessage";

    fn write(&self, out: &mut BytesMut) -> Result<(), ProtocolError> {
        let payload = self.payload.to_bytes();
        out.put_i32_le(0);
        out.put_i16_le(payload.len() as i16);
        put_cstr(out, &self.peer);
        out.put_slice(&payload);
        Ok(())
    }

    fn read(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = Reader::new(Self::NAME, payload);
        r.skip(4)?;
        let len = r.i16()? as u16 as usize;
        let peer = r.cstr()?;
        let body = r.bytes(len)?;
        Ok(Self {
            peer,
            payload: DataPayload::from_bytes(body),
        })
    }
}

/// Acknowledges a data message. Carries the acknowledged user's own name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataAck {
    pub name: String,
}

impl Wire for DataAck {
    const TYPE_ID: i32 = 4112;
    const NAME: &'static str = "DataAck";

    fn write(&self, out: &mut BytesMut) -> Result<(), ProtocolError> {
        out.put_i32_le(0);
        out.put_i16_le(0);
        put_cstr(out, &self.name);
        Ok(())
    }

    fn read(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = Reader::new(Self::NAME, payload);
        r.skip(6)?;
        Ok(Self { name: r.cstr()? })
    }
}
