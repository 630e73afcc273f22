//! Message envelope carried in a frame's data section.
//!
//! ```text
//! +---------+--------+------------------+
//! | type_id |  size  |  payload (size)  |
//! | i32 LE  | i32 LE |                  |
//! +---------+--------+------------------+
//! ```
//!
//! The keep-alive type id ([`KEEP_ALIVE`]) carries no payload.

use bytes::{Buf, BufMut, BytesMut};

use crate::ProtocolError;

/// Type id of the zero-payload keep-alive.
pub const KEEP_ALIVE: i32 = i32::MIN;

const ENVELOPE_LEN: usize = 8;

/// A typed message, not yet interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub type_id: i32,
    /// `None` only for keep-alives.
    pub payload: Option<Vec<u8>>,
}

impl Message {
    pub fn new(type_id: i32, payload: Vec<u8>) -> Self {
        Self {
            type_id,
            payload: Some(payload),
        }
    }

    pub fn keep_alive() -> Self {
        Self {
            type_id: KEEP_ALIVE,
            payload: None,
        }
    }

    pub fn is_keep_alive(&self) -> bool {
        self.type_id == KEEP_ALIVE
    }

    /// Payload bytes, empty for keep-alives.
    pub fn payload(&self) -> &[u8] {
        self.payload.as_deref().unwrap_or(&[])
    }

    /// Parses the envelope from a frame's data.
    ///
    /// Bytes past the declared size are ignored.
    ///
    /// # Errors
    /// [`ProtocolError::Incomplete`] if the envelope or the declared
    /// payload is cut short.
    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < 4 {
            return Err(ProtocolError::Incomplete {
                needed: ENVELOPE_LEN,
                available: data.len(),
            });
        }
        let mut buf = data;
        let type_id = buf.get_i32_le();
        if type_id == KEEP_ALIVE {
            return Ok(Self::keep_alive());
        }
        if buf.remaining() < 4 {
            return Err(ProtocolError::Incomplete {
                needed: ENVELOPE_LEN,
                available: data.len(),
            });
        }

        let size = buf.get_i32_le().max(0) as usize;
        if buf.remaining() < size {
            return Err(ProtocolError::Incomplete {
                needed: ENVELOPE_LEN + size,
                available: data.len(),
            });
        }
        Ok(Self::new(type_id, buf[..size].to_vec()))
    }

    pub fn encode(&self) -> Vec<u8> {
        let payload = self.payload();
        let mut out = BytesMut::with_capacity(ENVELOPE_LEN + payload.len());
        out.put_i32_le(self.type_id);
        out.put_i32_le(payload.len() as i32);
        out.put_slice(payload);
        out.to_vec()
    }
}

/// A message kind with a fixed type id and byte layout.
pub trait Wire: Sized {
    const TYPE_ID: i32;
    /// Human-readable kind name for logs and errors.
    const NAME: &'static str;

    /// Appends the payload (without envelope) to `out`.
    fn write(&self, out: &mut BytesMut) -> Result<(), ProtocolError>;

    /// Parses the payload (without envelope).
    fn read(payload: &[u8]) -> Result<Self, ProtocolError>;

    fn to_message(&self) -> Result<Message, ProtocolError> {
        let mut out = BytesMut::new();
        self.write(&mut out)?;
        Ok(Message::new(Self::TYPE_ID, out.to_vec()))
    }
}
