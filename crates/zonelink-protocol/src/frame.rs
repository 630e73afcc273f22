//! Frame codec: the outermost wire unit.
//!
//! A frame on the wire is:
//!
//! ```text
//! +-----------+--------+-------------+----------+------------------+
//! | signature |  size  | sequence_id | checksum |   data (size)    |
//! |  u32 LE   | u32 LE |   u32 LE    |  i32 LE  |                  |
//! +-----------+--------+-------------+----------+------------------+
//! ```
//!
//! The whole frame is XORed with the connection's secure key, one 4-byte
//! word at a time. Only the 4-byte aligned prefix is obfuscated: when a
//! frame's length is not a multiple of four, its last `len % 4` bytes go
//! out in the clear.
//!
//! Peers that batch several frames into one write sometimes obfuscate
//! those trailing bytes anyway, so decoding retries the checksum with
//! one, two, or three trailing bytes re-XORed ([`fix_tail`]) before giving
//! up with [`ProtocolError::ChecksumMismatch`].
//!
//! Decoding never mutates the caller's buffer. On
//! [`ProtocolError::Incomplete`] the same bytes can be offered again once
//! more have arrived.

use bytes::{Buf, BufMut, BytesMut};

use crate::ProtocolError;

/// Magic value leading every frame. Reads as `"eNoZ"` on the wire.
pub const SIGNATURE: u32 = 0x5a6f_4e65;

/// Length of the fixed frame header.
pub const HEADER_LEN: usize = 16;

/// Key used for the handshake-init frame and for every connection until
/// its own key is issued.
pub const BOOTSTRAP_KEY: u32 = 0xf827_3645;

const CHECKSUM_SEED: [u8; 4] = [0x12, 0x34, 0x43, 0x21];

// ---------------------------------------------------------------------------
// Obfuscation and checksum
// ---------------------------------------------------------------------------

/// XORs the 4-byte aligned prefix of `buf` with `key`.
///
/// Within each word the key bytes are applied most significant first, so
/// buffer byte `i` is XORed with `key.to_be_bytes()[i % 4]`. Trailing
/// bytes past the last whole word are left alone. Applying it twice is
/// the identity.
pub fn obfuscate(buf: &mut [u8], key: u32) {
    let key = key.to_be_bytes();
    let aligned = buf.len() - buf.len() % 4;
    for (i, byte) in buf[..aligned].iter_mut().enumerate() {
        *byte ^= key[i % 4];
    }
}

/// XORs the last `count` bytes of `data` with `key`, using the same
/// position-to-key-byte mapping as [`obfuscate`].
///
/// A `count` of zero means "the unaligned remainder", `data.len() % 4`.
pub fn fix_tail(data: &mut [u8], key: u32, count: usize) {
    let count = if count == 0 { data.len() % 4 } else { count };
    let start = data.len().saturating_sub(count);
    let key = key.to_be_bytes();
    for (i, byte) in data.iter_mut().enumerate().skip(start) {
        *byte ^= key[i % 4];
    }
}

/// Checksum of a frame's data: every whole 4-byte word XORed into a fixed
/// seed, read back big-endian.
pub fn checksum(data: &[u8]) -> i32 {
    let mut acc = CHECKSUM_SEED;
    for word in data.chunks_exact(4) {
        for (a, b) in acc.iter_mut().zip(word) {
            *a ^= b;
        }
    }
    i32::from_be_bytes(acc)
}

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// One decoded (de-obfuscated) frame.
///
/// The size field is not stored: it is always `data.len()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Should be [`SIGNATURE`]. Decoding keeps whatever the peer sent.
    pub signature: u32,
    pub sequence_id: u32,
    /// Declared checksum of `data`.
    pub checksum: i32,
    pub data: Vec<u8>,
}

impl Frame {
    /// Builds an outbound frame around message bytes.
    pub fn new(sequence_id: u32, data: Vec<u8>) -> Self {
        Self {
            signature: SIGNATURE,
            sequence_id,
            checksum: checksum(&data),
            data,
        }
    }

    /// Number of data bytes (the header's size field).
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Total bytes this frame occupies on the wire.
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.data.len()
    }

    /// Returns `true` if the signature is the zone magic value.
    pub fn has_valid_signature(&self) -> bool {
        self.signature == SIGNATURE
    }
}

/// Serializes and obfuscates a frame.
pub fn encode_frame(frame: &Frame, key: u32) -> Vec<u8> {
    let mut out = BytesMut::with_capacity(frame.encoded_len());
    out.put_u32_le(frame.signature);
    out.put_u32_le(frame.data.len() as u32);
    out.put_u32_le(frame.sequence_id);
    out.put_i32_le(frame.checksum);
    out.put_slice(&frame.data);

    let mut out = out.to_vec();
    obfuscate(&mut out, key);
    out
}

/// Decodes the first frame in `buf`, returning it with the bytes that
/// follow it.
///
/// # Errors
/// - [`ProtocolError::Incomplete`] if the header or the declared data is
///   not fully present. Nothing was consumed.
/// - [`ProtocolError::ChecksumMismatch`] if no tail alignment reproduces
///   the checksum. The error carries the frame (with its data as first
///   decoded); it still occupies [`Frame::encoded_len`] bytes of `buf`.
pub fn decode_frame(buf: &[u8], key: u32) -> Result<(Frame, &[u8]), ProtocolError> {
    if buf.len() < HEADER_LEN {
        return Err(ProtocolError::Incomplete {
            needed: HEADER_LEN,
            available: buf.len(),
        });
    }

    let mut header = [0u8; HEADER_LEN];
    header.copy_from_slice(&buf[..HEADER_LEN]);
    obfuscate(&mut header, key);

    let mut fields = &header[..];
    let signature = fields.get_u32_le();
    let size = fields.get_u32_le() as usize;
    let sequence_id = fields.get_u32_le();
    let declared = fields.get_i32_le();

    let total = HEADER_LEN.saturating_add(size);
    if buf.len() < total {
        return Err(ProtocolError::Incomplete {
            needed: total,
            available: buf.len(),
        });
    }

    let mut raw = buf[..total].to_vec();
    obfuscate(&mut raw, key);
    let mut data = raw.split_off(HEADER_LEN);
    let rest = &buf[total..];

    let computed = checksum(&data);
    if computed != declared && !recover_tail(&mut data, key, declared) {
        let frame = Frame {
            signature,
            sequence_id,
            checksum: declared,
            data,
        };
        return Err(ProtocolError::ChecksumMismatch {
            frame: Box::new(frame),
            computed,
        });
    }

    Ok((
        Frame {
            signature,
            sequence_id,
            checksum: declared,
            data,
        },
        rest,
    ))
}

/// Tries re-XORing 1, 2, then 3 trailing bytes. Leaves `data` fixed on
/// success and untouched on failure.
fn recover_tail(data: &mut [u8], key: u32, declared: i32) -> bool {
    for shift in 1..=3 {
        if shift > data.len() {
            break;
        }
        fix_tail(data, key, shift);
        if checksum(data) == declared {
            return true;
        }
        fix_tail(data, key, shift);
    }
    false
}

// ---------------------------------------------------------------------------
// Handshake init
// ---------------------------------------------------------------------------

/// Listener flavour announced in the handshake-init frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnionType(pub u32);

impl UnionType {
    /// Direct (messaging) listener.
    pub const DIRECT: Self = Self(0x0118_fd00);
    /// Chat room listener.
    pub const ROOM: Self = Self(0x007e_fc00);

    /// Picks the union type for a listener.
    pub fn for_listener(room_scoped: bool) -> Self {
        if room_scoped { Self::ROOM } else { Self::DIRECT }
    }
}

/// The first bytes the server sends: a bare 16-byte header-shaped record
/// handing the client its secure key and first sequence id. Always
/// obfuscated with [`BOOTSTRAP_KEY`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeInit {
    pub union_type: UnionType,
    pub secure_key: u32,
    pub sequence_id: u32,
}

impl HandshakeInit {
    pub const LEN: usize = 16;

    pub fn encode(&self) -> Vec<u8> {
        let mut out = BytesMut::with_capacity(Self::LEN);
        out.put_u32_le(SIGNATURE);
        out.put_u32_le(self.union_type.0);
        out.put_u32_le(self.secure_key);
        out.put_u32_le(self.sequence_id);

        let mut out = out.to_vec();
        obfuscate(&mut out, BOOTSTRAP_KEY);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() < Self::LEN {
            return Err(ProtocolError::Incomplete {
                needed: Self::LEN,
                available: buf.len(),
            });
        }
        let mut raw = [0u8; Self::LEN];
        raw.copy_from_slice(&buf[..Self::LEN]);
        obfuscate(&mut raw, BOOTSTRAP_KEY);

        let mut fields = &raw[4..];
        Ok(Self {
            union_type: UnionType(fields.get_u32_le()),
            secure_key: fields.get_u32_le(),
            sequence_id: fields.get_u32_le(),
        })
    }
}
