//! Handshake, security context, authentication, and connect messages.
//!
//! Most of these carry fields whose meaning was never recovered from
//! captures. They are kept as fixed values so the bytes match what real
//! clients expect.

use bytes::{BufMut, BytesMut};

use crate::ProtocolError;
use crate::message::Wire;
use crate::wire::{Reader, put_cstr, put_fixed, put_padded};

const REQUEST_SIGNATURE: &str = "cesz";
const WATCH_SIGNATURE: &str = ".awz";
const ZONE_SIGNATURE: &str = "ZONE";
const PROVIDER: &str = "ZWebAuth";
const PROTOCOL: &str = "BLTP 1.0";
const CONNECT_VERSION: i32 = 0x0001_0000;

/// Opaque block every security-context reply carries.
const CONTEXT_BLOB: [u8; 40] = [
    0x36, 0x17, 0x22, 0x53, 0x78, 0x78, 0x78, 0x9b, 0x00, 0x4f, 0xee, 0x58,
    0x27, 0x71, 0xb6, 0x79, 0x58, 0x78, 0x78, 0x5b, 0x78, 0x78, 0x78, 0x78,
    0x78, 0x78, 0x78, 0x78, 0x78, 0x79, 0x78, 0xe2, 0x70, 0x78, 0x78, 0x2f,
    0x39, 0x2c, 0x3b, 0x30,
];

const CREDENTIAL_LEN: usize = 32;
const AUTH_BLOB_LEN: usize = 20;
const ACCESS_NAME_LEN: usize = 20;

// ---------------------------------------------------------------------------
// Hello
// ---------------------------------------------------------------------------

/// Client's first message after the handshake-init.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHello {
    /// `"cesz"` read as a little-endian integer.
    pub id: i32,
    pub unknown: i32,
}

impl Default for ClientHello {
    fn default() -> Self {
        Self {
            id: i32::from_le_bytes(*b"cesz"),
            unknown: 0,
        }
    }
}

impl Wire for ClientHello {
    const TYPE_ID: i32 = 1;
    const NAME: &'static str = "ClientHello";

    fn write(&self, out: &mut BytesMut) -> Result<(), ProtocolError> {
        out.put_i32_le(self.id);
        out.put_i32_le(self.unknown);
        Ok(())
    }

    fn read(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = Reader::new(Self::NAME, payload);
        Ok(Self {
            id: r.i32()?,
            unknown: r.i32()?,
        })
    }
}

/// Server's answer to [`ClientHello`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerHello {
    pub version: i32,
    pub provider: String,
}

impl ServerHello {
    const PADDING: usize = 44;
}

impl Default for ServerHello {
    fn default() -> Self {
        Self {
            version: 1,
            provider: PROVIDER.to_string(),
        }
    }
}

impl Wire for ServerHello {
    const TYPE_ID: i32 = 2;
    const NAME: &'static str = "ServerHello";

    fn write(&self, out: &mut BytesMut) -> Result<(), ProtocolError> {
        out.put_i32_le(self.version);
        put_fixed(out, &self.provider, 8);
        out.put_bytes(0, Self::PADDING);
        Ok(())
    }

    fn read(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = Reader::new(Self::NAME, payload);
        let version = r.i32()?;
        let provider = r.ascii(8)?;
        r.skip(Self::PADDING)?;
        Ok(Self { version, provider })
    }
}

// ---------------------------------------------------------------------------
// Security context
// ---------------------------------------------------------------------------

/// Client asks for a security context, naming its numeric user id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityContextRequest {
    pub unknown_0: i32,
    pub unknown_1: i32,
    pub user_id: i32,
    /// Encrypted credential, 32 bytes from well-behaved clients.
    pub credential: Vec<u8>,
}

impl Wire for SecurityContextRequest {
    const TYPE_ID: i32 = 5;
    const NAME: &'static str = "SecurityContextRequest";

    fn write(&self, out: &mut BytesMut) -> Result<(), ProtocolError> {
        put_fixed(out, REQUEST_SIGNATURE, 4);
        out.put_i32_le(self.unknown_0);
        put_fixed(out, WATCH_SIGNATURE, 4);
        out.put_i32_le(self.unknown_1);
        out.put_i32_le(self.user_id);
        put_fixed(out, ZONE_SIGNATURE, 4);
        out.put_slice(&self.credential);
        Ok(())
    }

    fn read(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = Reader::new(Self::NAME, payload);
        r.skip(4)?;
        let unknown_0 = r.i32()?;
        r.skip(4)?;
        let unknown_1 = r.i32()?;
        let user_id = r.i32()?;
        r.skip(4)?;
        let credential = r.bytes(r.remaining().min(CREDENTIAL_LEN))?.to_vec();
        Ok(Self {
            unknown_0,
            unknown_1,
            user_id,
            credential,
        })
    }
}

/// Server's security context. Only the session key varies; zero works
/// with every known client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityContextReply {
    pub session_key: i64,
}

impl SecurityContextReply {
    const TAG: i16 = 115;
}

impl Wire for SecurityContextReply {
    const TYPE_ID: i32 = 4;
    const NAME: &'static str = "SecurityContextReply";

    fn write(&self, out: &mut BytesMut) -> Result<(), ProtocolError> {
        out.put_i32_le(1);
        put_cstr(out, PROVIDER);
        out.put_slice(&CONTEXT_BLOB);
        put_fixed(out, WATCH_SIGNATURE, 4);
        out.put_i32_le(1);
        out.put_i64_le(self.session_key);
        out.put_i16_le(Self::TAG);
        out.put_u8(0);
        Ok(())
    }

    fn read(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = Reader::new(Self::NAME, payload);
        r.skip(4 + PROVIDER.len() + 1 + CONTEXT_BLOB.len() + 4 + 4)?;
        let session_key = r.i64()?;
        r.skip(3)?;
        Ok(Self { session_key })
    }
}

// ---------------------------------------------------------------------------
// Authentication
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authenticate {
    pub unknown_0: i32,
    pub unknown_1: i32,
    /// Opaque 20-byte block; the server never looks inside.
    pub blob: Vec<u8>,
}

impl Wire for Authenticate {
    const TYPE_ID: i32 = 3;
    const NAME: &'static str = "Authenticate";

    fn write(&self, out: &mut BytesMut) -> Result<(), ProtocolError> {
        put_fixed(out, REQUEST_SIGNATURE, 4);
        out.put_i32_le(self.unknown_0);
        put_fixed(out, WATCH_SIGNATURE, 4);
        out.put_i32_le(self.unknown_1);
        out.put_slice(&self.blob);
        Ok(())
    }

    fn read(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = Reader::new(Self::NAME, payload);
        r.skip(4)?;
        let unknown_0 = r.i32()?;
        r.skip(4)?;
        let unknown_1 = r.i32()?;
        let blob = r.bytes(r.remaining().min(AUTH_BLOB_LEN))?.to_vec();
        Ok(Self {
            unknown_0,
            unknown_1,
            blob,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessDenied {
    pub reason: i32,
}

impl Default for AccessDenied {
    fn default() -> Self {
        Self { reason: 0x0101_0004 }
    }
}

impl Wire for AccessDenied {
    const TYPE_ID: i32 = 6;
    const NAME: &'static str = "AccessDenied";

    fn write(&self, out: &mut BytesMut) -> Result<(), ProtocolError> {
        out.put_i32_le(1);
        out.put_i32_le(self.reason);
        Ok(())
    }

    fn read(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = Reader::new(Self::NAME, payload);
        r.skip(4)?;
        Ok(Self { reason: r.i32()? })
    }
}

/// Confirms the user's identity. The display name is clipped to 19
/// characters to fit its NUL-padded field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessGranted {
    pub user_id: i32,
    pub name: String,
}

impl Wire for AccessGranted {
    const TYPE_ID: i32 = 7;
    const NAME: &'static str = "AccessGranted";

    fn write(&self, out: &mut BytesMut) -> Result<(), ProtocolError> {
        out.put_i32_le(1);
        put_cstr(out, PROVIDER);
        out.put_bytes(0, 8);
        put_padded(out, &self.name, ACCESS_NAME_LEN);
        out.put_bytes(0, 12);
        put_cstr(out, &format!("UserID=<{}>", self.user_id));
        Ok(())
    }

    fn read(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = Reader::new(Self::NAME, payload);
        r.skip(4 + PROVIDER.len() + 1 + 8)?;
        let name = r.ascii(ACCESS_NAME_LEN)?;
        r.skip(12)?;
        let tag = r.cstr()?;
        let user_id = tag
            .trim_start_matches("UserID=<")
            .trim_end_matches('>')
            .parse()
            .unwrap_or_default();
        Ok(Self { user_id, name })
    }
}

// ---------------------------------------------------------------------------
// Connect
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connect {
    pub version: i32,
    pub protocol: String,
}

impl Default for Connect {
    fn default() -> Self {
        Self {
            version: CONNECT_VERSION,
            protocol: PROTOCOL.to_string(),
        }
    }
}

impl Wire for Connect {
    const TYPE_ID: i32 = 4097;
    const NAME: &'static str = "Connect";

    fn write(&self, out: &mut BytesMut) -> Result<(), ProtocolError> {
        out.put_i32_le(0);
        out.put_i32_le(self.version);
        put_fixed(out, &self.protocol, 8);
        Ok(())
    }

    fn read(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = Reader::new(Self::NAME, payload);
        r.skip(4)?;
        Ok(Self {
            version: r.i32()?,
            protocol: r.ascii(8)?,
        })
    }
}

/// Carries the client configuration string (limits, chat server, the
/// user's name).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectAck {
    pub config: String,
}

impl Wire for ConnectAck {
    const TYPE_ID: i32 = 4098;
    const NAME: &'static str = "ConnectAck";

    fn write(&self, out: &mut BytesMut) -> Result<(), ProtocolError> {
        out.put_i32_le(0);
        out.put_i32_le(CONNECT_VERSION);
        put_cstr(out, &self.config);
        Ok(())
    }

    fn read(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = Reader::new(Self::NAME, payload);
        r.skip(8)?;
        Ok(Self { config: r.cstr()? })
    }
}

/// Explicit sign-off from a direct connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Disconnect;

impl Wire for Disconnect {
    const TYPE_ID: i32 = 4099;
    const NAME: &'static str = "Disconnect";

    fn write(&self, _out: &mut BytesMut) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn read(_payload: &[u8]) -> Result<Self, ProtocolError> {
        Ok(Self)
    }
}
