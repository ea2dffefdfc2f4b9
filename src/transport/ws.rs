//! WebSocket status channel.
//!
//! `GET /ws?userId=<id>[&connId=<id>]` upgrades to a socket that receives one
//! JSON text frame per status event. The first frame is always the current
//! snapshot. Opening a second socket for the same user closes the first.

use crate::models::StatusEvent;
use crate::transport::AppState;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code};
use axum::extract::{Query, State};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Reason sent when a socket is opened without a user id.
pub const USER_ID_REQUIRED: &str = "User ID is required";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsParams {
    pub user_id: Option<String>,
    #[serde(alias = "connectionId")]
    pub conn_id: Option<String>,
}

impl WsParams {
    /// The user id, if present and not blank.
    pub fn user_id(&self) -> Option<&str> {
        non_blank(self.user_id.as_deref())
    }

    /// The connection filter, if present and not blank.
    pub fn filter(&self) -> Option<String> {
        non_blank(self.conn_id.as_deref()).map(str::to_string)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, params, state))
}

async fn handle_socket(mut socket: WebSocket, params: WsParams, state: AppState) {
    let Some(user_id) = params.user_id().map(str::to_string) else {
        warn!("WebSocket opened without user id");
        close_with(&mut socket, close_code::POLICY, USER_ID_REQUIRED).await;
        return;
    };

    let (tx, mut rx) = mpsc::channel::<StatusEvent>(state.subscriber_buffer);
    let subscription_id = match state.broker.subscribe(&user_id, tx, params.filter()).await {
        Ok(id) => id,
        Err(e) => {
            warn!(user_id = %user_id, error = %e, "Subscription failed");
            close_with(&mut socket, close_code::ERROR, "Subscription failed").await;
            return;
        }
    };

    info!(user_id = %user_id, subscription_id = %subscription_id, "WebSocket connected");

    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(event) => {
                    if let Err(e) = sink.send(Message::Text(event.to_json().into())).await {
                        debug!(user_id = %user_id, error = %e, "Send failed");
                        break;
                    }
                }
                None => {
                    // Replaced by a newer subscription or dropped as unreachable
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            },
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    info!(user_id = %user_id, message = %text.as_str(), "Received message");
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(user_id = %user_id, error = %e, "WebSocket error");
                    break;
                }
            },
        }
    }

    state.broker.release(&user_id, subscription_id).await;
    info!(user_id = %user_id, subscription_id = %subscription_id, "WebSocket disconnected");
}

async fn close_with(socket: &mut WebSocket, code: u16, reason: &'static str) {
    let frame = CloseFrame {
        code,
        reason: reason.into(),
    };
    if let Err(e) = socket.send(Message::Close(Some(frame))).await {
        debug!(error = %e, "Failed to send close frame");
    }
}
