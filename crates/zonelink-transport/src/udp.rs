//! UDP external-address responder.
//!
//! Game clients ask this socket which IPv4 address their datagrams come
//! from, so they can advertise it in the rendezvous messages exchanged
//! over the direct port. A second request kind is a plain echo used to
//! probe reachability.

use std::net::{IpAddr, SocketAddr};

use tokio::net::UdpSocket;

use crate::TransportError;

/// Request tag asking for the sender's address.
pub const ADDRESS_REQUEST: u8 = 9;
/// Request tag echoed back unchanged.
pub const ECHO_REQUEST: u8 = 10;
/// Length of an address reply.
pub const ADDRESS_REPLY_LEN: usize = 21;

/// Fixed bytes after the tag in every address reply. Clients accept this
/// value; its meaning is unknown.
const REPLY_MARKER: [u8; 4] = [0x02, 0x00, 0xd9, 0x49];

const MAX_DATAGRAM: usize = 2048;

/// Builds the reply to one datagram, or `None` if it gets no answer.
///
/// An address reply is the tag, the marker, the sender's IPv4 address,
/// eight zero bytes, then request bytes 1..5. Requests too short to
/// supply those four bytes, and senders without an IPv4 address, get no
/// reply.
pub fn address_reply(request: &[u8], sender: SocketAddr) -> Option<Vec<u8>> {
    match *request.first()? {
        ADDRESS_REQUEST => {
            let echoed = request.get(1..5)?;
            let ip = match sender.ip() {
                IpAddr::V4(ip) => ip,
                IpAddr::V6(ip) => ip.to_ipv4_mapped()?,
            };
            let mut reply = Vec::with_capacity(ADDRESS_REPLY_LEN);
            reply.push(ADDRESS_REQUEST);
            reply.extend_from_slice(&REPLY_MARKER);
            reply.extend_from_slice(&ip.octets());
            reply.extend_from_slice(&[0; 8]);
            reply.extend_from_slice(echoed);
            Some(reply)
        }
        ECHO_REQUEST => Some(request.to_vec()),
        _ => None,
    }
}

/// Answers address and echo requests on one UDP port.
pub struct UdpResponder {
    socket: UdpSocket,
}

impl UdpResponder {
    /// Binds the responder to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| TransportError::BindFailed {
                addr: addr.to_string(),
                source,
            })?;
        tracing::info!(addr, "UDP address responder listening");
        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.socket.local_addr().map_err(TransportError::Address)
    }

    /// Serves requests until receiving fails.
    ///
    /// A failed send only loses that one reply.
    pub async fn run(self) -> Result<(), TransportError> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            let (n, sender) = self
                .socket
                .recv_from(&mut buf)
                .await
                .map_err(TransportError::ReceiveFailed)?;

            let Some(reply) = address_reply(&buf[..n], sender) else {
                tracing::debug!(%sender, len = n, "unanswered datagram");
                continue;
            };
            if buf[0] == ADDRESS_REQUEST {
                tracing::info!(%sender, "address request");
            }
            if let Err(e) = self.socket.send_to(&reply, sender).await {
                tracing::debug!(%sender, error = %e, "reply failed");
            }
        }
    }
}
