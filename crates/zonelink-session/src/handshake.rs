//! Key and sequence selection for the handshake-init frame.

use rand::Rng;
use serde::{Deserialize, Serialize};
use zonelink_protocol::{HandshakeInit, UnionType};

/// Optional overrides for the values handed out in the handshake.
///
/// Left unset, each connection gets a fresh random key and sequence id.
/// Fixing them is useful when replaying captured traffic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandshakeConfig {
    pub fixed_key: Option<u32>,
    pub fixed_sequence: Option<u32>,
}

/// Builds the handshake-init record for a new connection.
///
/// A random key repeats one byte four times, which keeps it independent
/// of byte order.
pub fn generate_handshake(union_type: UnionType, config: &HandshakeConfig) -> HandshakeInit {
    let mut rng = rand::rng();
    let secure_key = config
        .fixed_key
        .unwrap_or_else(|| u32::from(rng.random::<u8>()) * 0x0101_0101);
    let sequence_id = config.fixed_sequence.unwrap_or_else(|| rng.random());
    HandshakeInit {
        union_type,
        secure_key,
        sequence_id,
    }
}
