use crate::Frame;

/// Errors produced while decoding or encoding zone frames and messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Not enough bytes yet. The caller keeps its buffer untouched and
    /// retries once the transport delivers more.
    #[error("incomplete: need {needed} bytes, have {available}")]
    Incomplete { needed: usize, available: usize },

    /// The frame parsed, but no tail alignment reproduced its checksum.
    /// The frame is still usable on a best-effort basis.
    #[error(
        "checksum mismatch on frame {}: declared {:#010x}, computed {computed:#010x}",
        .frame.sequence_id,
        .frame.checksum
    )]
    ChecksumMismatch { frame: Box<Frame>, computed: i32 },

    /// A payload was shorter than its message kind's fixed layout.
    #[error("{kind} payload truncated: need {needed} bytes, have {available}")]
    Truncated {
        kind: &'static str,
        needed: usize,
        available: usize,
    },

    /// The zlib stream of a chat line could not be produced or read.
    #[error("chat compression failed: {0}")]
    Compression(#[source] std::io::Error),
}

impl ProtocolError {
    /// Returns `true` for errors that only mean "wait for more bytes".
    pub fn is_incomplete(&self) -> bool {
        matches!(self, Self::Incomplete { .. })
    }
}
