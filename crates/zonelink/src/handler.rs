//! Per-connection handler: reads bytes into the engine, writes the
//! outbox's buffers back out.
//!
//! Each accepted connection gets two Tokio tasks:
//!   1. the reader (this handler), feeding received chunks to the engine;
//!   2. a writer, sending one coalesced buffer at a time and reporting
//!      completion back to the outbox.
//!
//! If a send fails the writer closes the outbox and wakes the reader, so
//! the connection goes offline without waiting for the read side to
//! notice.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use zonelink_session::{FeedbackSink, IdentityResolver, Peer, WriteReceiver};
use zonelink_transport::{Connection, TcpConnection, TransportError};

use crate::ZoneError;
use crate::engine::{ConnectionState, Engine, Flow, Listener};

/// How long a closing connection waits for queued frames to go out.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Drop guard that takes the connection offline when the handler exits,
/// including on error or panic.
struct OfflineGuard<R: IdentityResolver, F: FeedbackSink> {
    engine: Arc<Engine<R, F>>,
    state: ConnectionState,
}

impl<R: IdentityResolver, F: FeedbackSink> Drop for OfflineGuard<R, F> {
    fn drop(&mut self) {
        self.engine.disconnect(&self.state);
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<R, F>(
    conn: TcpConnection,
    listener: Listener,
    engine: Arc<Engine<R, F>>,
) -> Result<(), ZoneError>
where
    R: IdentityResolver,
    F: FeedbackSink,
{
    let conn = Arc::new(conn);
    let conn_id = conn.id();
    tracing::info!(%conn_id, peer = %conn.peer_addr(), ?listener, "connection accepted");

    let (state, writes) = engine.open(conn_id, conn.peer_addr(), listener);
    let (closing_tx, closing_rx) = oneshot::channel();
    let (failed_tx, mut failed_rx) = oneshot::channel();
    let mut writer = tokio::spawn(write_loop(
        Arc::clone(&conn),
        Arc::clone(state.peer()),
        writes,
        closing_rx,
        failed_tx,
    ));
    let mut guard = OfflineGuard {
        engine: Arc::clone(&engine),
        state,
    };

    let result = read_loop(&*conn, &engine, &mut guard.state, &mut failed_rx).await;

    drop(guard);
    let _ = closing_tx.send(());
    if tokio::time::timeout(DRAIN_TIMEOUT, &mut writer).await.is_err() {
        tracing::debug!(%conn_id, "writer did not drain in time");
        writer.abort();
    }
    if let Err(e) = conn.close().await {
        tracing::debug!(%conn_id, error = %e, "close failed");
    }
    tracing::info!(%conn_id, "connection closed");
    result
}

/// Feeds received chunks to the engine until the peer closes, the engine
/// asks to close, or the writer reports a failed send.
async fn read_loop<C, R, F>(
    conn: &C,
    engine: &Engine<R, F>,
    state: &mut ConnectionState,
    writer_failed: &mut oneshot::Receiver<()>,
) -> Result<(), ZoneError>
where
    C: Connection<Error = TransportError>,
    R: IdentityResolver,
    F: FeedbackSink,
{
    let conn_id = conn.id();
    loop {
        let received = tokio::select! {
            received = conn.recv() => received,
            _ = &mut *writer_failed => {
                tracing::debug!(%conn_id, "writer failed; closing");
                return Ok(());
            }
        };
        let bytes = match received {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                tracing::debug!(%conn_id, "peer closed the stream");
                return Ok(());
            }
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "recv error");
                return Err(e.into());
            }
        };

        if engine.process(state, &bytes).await? == Flow::Close {
            return Ok(());
        }
    }
}

/// Sends each buffer the outbox hands over, then tells the outbox the
/// write finished so it can flush whatever queued up meanwhile.
///
/// Once `closing` fires, exits as soon as the outbox has nothing in flight.
/// A failed send closes the outbox and fires `failed`.
async fn write_loop<C: Connection>(
    conn: Arc<C>,
    peer: Arc<Peer>,
    mut writes: WriteReceiver,
    mut closing: oneshot::Receiver<()>,
    failed: oneshot::Sender<()>,
) {
    let mut closed = false;
    loop {
        tokio::select! {
            buf = writes.recv() => {
                let Some(buf) = buf else { break };
                if let Err(e) = conn.send(&buf).await {
                    tracing::debug!(conn_id = %conn.id(), error = %e, "send failed");
                    peer.outbox().close();
                    let _ = failed.send(());
                    return;
                }
                peer.outbox().write_complete();
            }
            _ = &mut closing, if !closed => closed = true,
        }
        if closed && !peer.outbox().is_in_flight() {
            break;
        }
    }
}
