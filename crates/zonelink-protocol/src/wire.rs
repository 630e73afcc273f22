//! Byte-level helpers shared by the message layouts.
//!
//! Reads are bounds-checked: a short payload becomes
//! [`ProtocolError::Truncated`] instead of a panic.

use std::io::Read;

use bytes::{Buf, BufMut, BytesMut};
use flate2::Compression;
use flate2::read::{ZlibDecoder, ZlibEncoder};

use crate::ProtocolError;

/// Upper bound on an inflated chat line.
const MAX_CHAT_BYTES: u64 = 64 * 1024;

/// Cursor over a message payload.
pub(crate) struct Reader<'a> {
    kind: &'static str,
    buf: &'a [u8],
    consumed: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(kind: &'static str, buf: &'a [u8]) -> Self {
        Self {
            kind,
            buf,
            consumed: 0,
        }
    }

    fn need(&self, n: usize) -> Result<(), ProtocolError> {
        if self.buf.remaining() < n {
            return Err(ProtocolError::Truncated {
                kind: self.kind,
                needed: self.consumed + n,
                available: self.consumed + self.buf.remaining(),
            });
        }
        Ok(())
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    pub(crate) fn i32(&mut self) -> Result<i32, ProtocolError> {
        self.need(4)?;
        self.consumed += 4;
        Ok(self.buf.get_i32_le())
    }

    pub(crate) fn i64(&mut self) -> Result<i64, ProtocolError> {
        self.need(8)?;
        self.consumed += 8;
        Ok(self.buf.get_i64_le())
    }

    pub(crate) fn i16(&mut self) -> Result<i16, ProtocolError> {
        self.need(2)?;
        self.consumed += 2;
        Ok(self.buf.get_i16_le())
    }

    pub(crate) fn bytes(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        self.need(n)?;
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        self.consumed += n;
        Ok(head)
    }

    pub(crate) fn skip(&mut self, n: usize) -> Result<(), ProtocolError> {
        self.bytes(n).map(|_| ())
    }

    /// Fixed-width ASCII field, trailing NULs dropped.
    pub(crate) fn ascii(&mut self, n: usize) -> Result<String, ProtocolError> {
        self.bytes(n).map(ascii_trimmed)
    }

    /// NUL-terminated ASCII. The terminator is consumed; a missing one
    /// means the string runs to the end of the payload.
    pub(crate) fn cstr(&mut self) -> Result<String, ProtocolError> {
        let end = self
            .buf
            .iter()
            .position(|b| *b == 0)
            .map_or(self.buf.len(), |nul| nul + 1);
        self.bytes(end).map(ascii_trimmed)
    }

    /// Everything left in the payload.
    pub(crate) fn rest(&mut self) -> &'a [u8] {
        let rest = self.buf;
        self.consumed += rest.len();
        self.buf = &[];
        rest
    }
}

// ---------------------------------------------------------------------------
// Strings
// ---------------------------------------------------------------------------

/// Zone names are 8-bit ASCII. Anything else is sent as `?`.
pub(crate) fn ascii_bytes(s: &str) -> impl Iterator<Item = u8> + '_ {
    s.chars().map(|c| if c.is_ascii() { c as u8 } else { b'?' })
}

pub(crate) fn ascii_string(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| if b.is_ascii() { *b as char } else { '?' })
        .collect()
}

pub(crate) fn ascii_trimmed(bytes: &[u8]) -> String {
    let end = bytes.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
    ascii_string(&bytes[..end])
}

pub(crate) fn put_cstr(out: &mut BytesMut, s: &str) {
    for b in ascii_bytes(s) {
        out.put_u8(b);
    }
    out.put_u8(0);
}

/// Writes `s` into a fixed `width` field, truncated or NUL padded.
pub(crate) fn put_fixed(out: &mut BytesMut, s: &str, width: usize) {
    let mut written = 0;
    for b in ascii_bytes(s).take(width) {
        out.put_u8(b);
        written += 1;
    }
    out.put_bytes(0, width - written);
}

/// Writes `s` into a fixed `width` field, truncated so at least one NUL
/// always follows.
pub(crate) fn put_padded(out: &mut BytesMut, s: &str, width: usize) {
    let mut written = 0;
    for b in ascii_bytes(s).take(width.saturating_sub(1)) {
        out.put_u8(b);
        written += 1;
    }
    out.put_bytes(0, width - written);
}

pub(crate) fn utf16_be(text: &str) -> Vec<u8> {
    text.encode_utf16().flat_map(u16::to_be_bytes).collect()
}

/// Decodes UTF-16BE, ignoring an odd trailing byte and trailing NULs.
pub(crate) fn from_utf16_be(bytes: &[u8]) -> String {
    let units = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]));
    let text: String = char::decode_utf16(units)
        .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect();
    text.trim_end_matches('\0').to_string()
}

// ---------------------------------------------------------------------------
// Chat payloads
// ---------------------------------------------------------------------------

/// Chat text as it travels in room messages: UTF-16LE with a NUL
/// terminator, zlib-compressed.
pub(crate) fn compress_chat(text: &str) -> Result<Vec<u8>, ProtocolError> {
    let mut raw: Vec<u8> = text.encode_utf16().flat_map(u16::to_le_bytes).collect();
    raw.extend_from_slice(&[0, 0]);

    let mut packed = Vec::new();
    ZlibEncoder::new(raw.as_slice(), Compression::default())
        .read_to_end(&mut packed)
        .map_err(ProtocolError::Compression)?;
    Ok(packed)
}

pub(crate) fn decompress_chat(packed: &[u8]) -> Result<String, ProtocolError> {
    let mut raw = Vec::new();
    ZlibDecoder::new(packed)
        .take(MAX_CHAT_BYTES)
        .read_to_end(&mut raw)
        .map_err(ProtocolError::Compression)?;

    let units = raw
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]));
    let text: String = char::decode_utf16(units)
        .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect();
    Ok(text.trim_end_matches('\0').to_string())
}
