//! Streams an agent run over a WebSocket, one frame per message.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, warn};
use uuid::Uuid;

use super::protocol::{WsIncomingMessage, WsOutgoingMessage};
use crate::core::errors::ApiError;
use crate::state::AppState;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn send_json(
    sender: &mut SplitSink<WebSocket, Message>,
    message: &WsOutgoingMessage<'_>,
) -> Result<(), ApiError> {
    let text = serde_json::to_string(message)?;
    sender
        .send(Message::Text(text))
        .await
        .map_err(ApiError::internal)
}

async fn send_error(sender: &mut SplitSink<WebSocket, Message>, err: &ApiError) {
    let _ = send_json(
        sender,
        &WsOutgoingMessage::Error {
            kind: err.kind(),
            message: err.to_string(),
        },
    )
    .await;
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    let mut request = loop {
        match receiver.next().await {
            Some(Ok(Message::Text(text))) => match serde_json::from_str::<WsIncomingMessage>(&text) {
                Ok(WsIncomingMessage::Run(request)) => break request,
                Ok(WsIncomingMessage::Cancel) => continue,
                Err(err) => send_error(&mut sender, &ApiError::invalid(err)).await,
            },
            Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
            Some(Ok(_)) => {}
        }
    };

    let token = request
        .session_token
        .get_or_insert_with(|| Uuid::new_v4().to_string())
        .clone();

    let mut run = match state.agents.start(request).await {
        Ok(run) => run,
        Err(err) => {
            send_error(&mut sender, &err).await;
            return;
        }
    };
    if send_json(&mut sender, &WsOutgoingMessage::Session { session_token: &token })
        .await
        .is_err()
    {
        state.sessions.remove(&token);
        return;
    }

    let sessions = state.sessions.clone();
    let reader_token = token.clone();
    let reader = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            match message {
                Message::Text(text) => {
                    if let Ok(WsIncomingMessage::Cancel) = serde_json::from_str(&text) {
                        debug!("Client cancelled {}", reader_token);
                        sessions.remove(&reader_token);
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
        sessions.remove(&reader_token);
    });

    loop {
        match run.next_message().await {
            Ok(Some(content)) => {
                if send_json(&mut sender, &WsOutgoingMessage::Message { content: &content })
                    .await
                    .is_err()
                {
                    warn!("Stream client for {} went away", token);
                    state.sessions.remove(&token);
                    break;
                }
            }
            Ok(None) => {
                let _ = send_json(
                    &mut sender,
                    &WsOutgoingMessage::Done {
                        stop_reason: run.stop_reason(),
                    },
                )
                .await;
                break;
            }
            Err(err) => {
                send_error(&mut sender, &err).await;
                break;
            }
        }
    }

    reader.abort();
    let _ = sender.close().await;
}
