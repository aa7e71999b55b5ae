//! `/ws` admission and the lifecycle of one connection.

use std::time::Duration;

use axum::extract::ws::WebSocket;
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::{header, HeaderMap};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::time;

use crate::error::{AdmissionError, ApiError};
use crate::models::user::UserId;
use crate::AppState;

use super::connection::{Connection, Registration};
use super::pump::{inbound_pump, outbound_pump, InboundExit, WriterResult};

/// How long teardown waits for the outbound pump to drain before aborting it.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
pub struct WsParams {
    token: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/ws", get(ws_upgrade))
}

/// Credential from `?token=` or, failing that, the `Authorization` header.
fn credential(params: WsParams, headers: &HeaderMap) -> Result<String, AdmissionError> {
    params
        .token
        .filter(|t| !t.is_empty())
        .or_else(|| {
            headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        })
        .ok_or(AdmissionError::MissingCredential)
}

/// Identity is resolved before the upgrade; a caller that fails admission
/// gets a 401 and never reaches the hub.
async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let user_id = credential(params, &headers).and_then(|c| state.auth.resolve_identity(&c))?;
    let read_limit = state.config.read_limit;

    Ok(ws
        .max_message_size(read_limit)
        .max_frame_size(read_limit)
        .on_upgrade(move |socket| run_connection(state, user_id, socket)))
}

/// Register, pump until either side ends, then tear down.
///
/// Teardown always unregisters (a no-op if the hub already dropped the
/// connection) and lets the outbound pump drain. The user is recorded
/// offline once their last connection is gone.
pub async fn run_connection(state: AppState, user_id: UserId, socket: WebSocket) {
    let Registration {
        connection,
        outbound,
    } = state.hub.register(user_id);
    // Online is written after registering, so a sibling connection tearing
    // down now sees this one and leaves the stored presence alone.
    record_presence(&state, user_id, true).await;
    tracing::info!(conn_id = %connection.id, user_id, "connection opened");

    let (sink, stream) = socket.split();
    let mut writer = tokio::spawn(outbound_pump(sink, outbound, connection.id.clone()));

    let writer_done = match inbound_pump(&state, &connection, stream, &mut writer).await {
        Ok(InboundExit::WriterDone(result)) => {
            log_writer_exit(&connection, result);
            true
        }
        Ok(InboundExit::PeerClosed) => false,
        Err(e) => {
            tracing::debug!(conn_id = %connection.id, error = %e, "read side failed");
            false
        }
    };

    state.hub.unregister(&connection.id);

    if !writer_done {
        match time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer).await {
            Ok(result) => log_writer_exit(&connection, result),
            Err(_) => {
                writer.abort();
                tracing::debug!(conn_id = %connection.id, "outbound pump did not drain, aborted");
            }
        }
    }

    if !state.hub.is_connected(user_id).await {
        record_presence(&state, user_id, false).await;
        // A connection that registered while the offline write was in flight
        // may have written online before it landed; restore it.
        if state.hub.is_connected(user_id).await {
            record_presence(&state, user_id, true).await;
        }
    }
    tracing::info!(conn_id = %connection.id, user_id, "connection closed");
}

fn log_writer_exit(connection: &Connection, result: WriterResult) {
    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::debug!(conn_id = %connection.id, error = %e, "write side failed"),
        Err(e) => tracing::warn!(conn_id = %connection.id, error = %e, "outbound pump panicked"),
    }
}

async fn record_presence(state: &AppState, user_id: UserId, is_online: bool) {
    if let Err(e) = state.store.set_presence(user_id, is_online, Utc::now()).await {
        tracing::warn!(user_id, is_online, error = %e, "failed to record presence");
    }
}
