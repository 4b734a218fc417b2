use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use pixelforge_core::types::DbId;
use pixelforge_events::StatusEvent;

use crate::error::AppResult;
use crate::middleware::auth::{bearer_token, AuthUser};
use crate::query::WsAuthParams;
use crate::state::AppState;
use crate::ws::registry::Subscription;

/// GET /api/v1/ws/jobs/{id}
///
/// Authenticates with `?token=` (browsers cannot set headers on a WebSocket
/// handshake) or the usual Bearer header, and applies the same ownership
/// rule as the status endpoint before upgrading.
pub async fn job_ws_handler(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
    Query(params): Query<WsAuthParams>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    let user = match params.token.as_deref() {
        Some(token) => AuthUser::from_token(token, &state.config.jwt)?,
        None => AuthUser::from_token(bearer_token(&headers)?, &state.config.jwt)?,
    };
    state.jobs.get_status(job_id, user.user_id).await?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, job_id, user.user_id)))
}

/// Manage a single live connection after upgrade.
///
/// The connection is subscribed before anything else happens and the
/// subscription guard is dropped as soon as the read loop ends, so a closed
/// connection leaves the registry immediately.
///
/// A job that finished before the subscription existed would otherwise never
/// produce another event, so once subscribed the job is read again and a
/// terminal status is sent as a snapshot. It is queued behind any event
/// already delivered; at worst the client sees the terminal status twice.
async fn handle_socket(socket: WebSocket, state: AppState, job_id: DbId, user_id: DbId) {
    let registry = Arc::clone(&state.registry);
    let (subscription, mut rx) = registry.register(job_id);
    let conn_id = subscription.conn_id();
    tracing::info!(job_id, conn_id, "WebSocket connected");

    send_terminal_snapshot(&state, &subscription, user_id).await;

    let (mut sink, mut stream) = socket.split();

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(msg).await.is_err() {
                tracing::debug!(job_id, conn_id, "WebSocket sink closed");
                break;
            }
        }
    });

    // The channel carries keepalive and close only; any other payload is ignored.
    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Close(_)) => break,
            Ok(Message::Pong(_)) => {
                tracing::trace!(job_id, conn_id, "Pong received");
            }
            Ok(Message::Ping(_)) => {}
            Ok(_) => {
                tracing::debug!(job_id, conn_id, "Ignoring client payload");
            }
            Err(e) => {
                tracing::debug!(job_id, conn_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    drop(subscription);
    send_task.abort();
    tracing::info!(job_id, conn_id, "WebSocket disconnected");
}

async fn send_terminal_snapshot(state: &AppState, subscription: &Subscription, user_id: DbId) {
    let job_id = subscription.job_id();
    let job = match state.jobs.get_status(job_id, user_id).await {
        Ok(job) => job,
        Err(e) => {
            tracing::warn!(job_id, error = %e, "Could not read job for snapshot");
            return;
        }
    };
    if !job.status.is_terminal() {
        return;
    }
    match serde_json::to_string(&StatusEvent::new(job_id, job.status)) {
        Ok(text) => {
            subscription.send(Message::Text(text.into()));
            tracing::debug!(job_id, status = job.status.name(), "Terminal snapshot sent");
        }
        Err(e) => tracing::error!(job_id, error = %e, "Failed to encode snapshot"),
    }
}
