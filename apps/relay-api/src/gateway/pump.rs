//! The two halves of a live connection.
//!
//! The inbound pump reads frames, decodes them and hands events to the
//! handlers. The outbound pump owns the write half of the socket and is its
//! only writer: it drains the connection's queue in batches, one flush per
//! batch, and closes the socket once the queue is closed.

use axum::extract::ws::{close_code, CloseFrame, Message, Utf8Bytes, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};

use crate::error::{DecodeError, TransportError};
use crate::AppState;

use super::connection::{Connection, ConnectionId};
use super::events::decode_client_event;
use super::handler::handle_client_event;

pub type WsSink = SplitSink<WebSocket, Message>;
pub type WsStream = SplitStream<WebSocket>;
pub type WriterHandle = JoinHandle<Result<(), TransportError>>;
pub type WriterResult = Result<Result<(), TransportError>, JoinError>;

/// Why the inbound pump stopped reading.
#[derive(Debug)]
pub enum InboundExit {
    /// The peer sent a close frame or the stream ended.
    PeerClosed,
    /// The outbound pump finished first, with this result.
    WriterDone(WriterResult),
}

/// Most frames written before a flush.
const WRITE_BATCH: usize = 64;

/// Read frames until the peer closes or the transport fails. Also returns
/// when the outbound pump finishes first.
///
/// The writer is only watched while waiting for the next frame. Once a frame
/// has been read its handler runs to completion, so a chat message that was
/// stored is always followed by its conversation update and broadcast.
///
/// Undecodable frames and unknown event types are logged and skipped; only
/// a transport error ends the pump early.
pub async fn inbound_pump(
    state: &AppState,
    connection: &Connection,
    mut stream: WsStream,
    writer: &mut WriterHandle,
) -> Result<InboundExit, TransportError> {
    loop {
        let msg = tokio::select! {
            msg = stream.next() => msg,
            result = &mut *writer => return Ok(InboundExit::WriterDone(result)),
        };
        let Some(msg) = msg else {
            return Ok(InboundExit::PeerClosed);
        };

        match msg.map_err(TransportError::Read)? {
            Message::Text(text) => match decode_client_event(text.as_str()) {
                Ok(event) => handle_client_event(state, connection.user_id, event).await,
                Err(DecodeError::UnknownType(kind)) => {
                    tracing::debug!(conn_id = %connection.id, %kind, "unknown event type, skipped");
                }
                Err(e) => {
                    tracing::warn!(conn_id = %connection.id, error = %e, "undecodable frame, skipped");
                }
            },
            Message::Close(frame) => {
                match frame {
                    Some(f) if f.code != close_code::AWAY && f.code != close_code::ABNORMAL => {
                        tracing::info!(
                            conn_id = %connection.id,
                            code = f.code,
                            reason = f.reason.as_str(),
                            "unexpected close"
                        );
                    }
                    _ => tracing::debug!(conn_id = %connection.id, "peer closed"),
                }
                return Ok(InboundExit::PeerClosed);
            }
            Message::Binary(_) => {
                tracing::debug!(conn_id = %connection.id, "binary frame ignored");
            }
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }
}

/// Write queued frames until the queue closes, then send a close frame.
pub async fn outbound_pump(
    mut sink: WsSink,
    mut outbound: mpsc::Receiver<Utf8Bytes>,
    conn_id: ConnectionId,
) -> Result<(), TransportError> {
    let mut batch = Vec::with_capacity(WRITE_BATCH);

    while outbound.recv_many(&mut batch, WRITE_BATCH).await > 0 {
        for frame in batch.drain(..) {
            sink.feed(Message::Text(frame))
                .await
                .map_err(TransportError::Write)?;
        }
        sink.flush().await.map_err(TransportError::Write)?;
    }

    tracing::debug!(%conn_id, "outbound queue closed");
    let close = Message::Close(Some(CloseFrame {
        code: close_code::AWAY,
        reason: Utf8Bytes::from_static("connection closed by server"),
    }));
    // The peer may already be gone.
    let _ = sink.send(close).await;
    Ok(())
}
