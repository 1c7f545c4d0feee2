use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use futures::{SinkExt, StreamExt};

use crate::session::{ClientToken, JoinOutcome, RoomEvent};

use super::rest::AppState;
use super::types::{ClientEvent, ServerEvent};

pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

async fn handle_websocket(socket: WebSocket, state: AppState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let channel_id = state.sessions.allocate_channel_id();

    // ── Wait for joinRoom ──────────────────────────────────────────────────

    let (code, token, mut room_rx) = loop {
        match ws_receiver.next().await {
            Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(ClientEvent::JoinRoom { code, client_token }) => {
                    let parsed_token = client_token.as_deref().and_then(|t| t.parse().ok());
                    match state.sessions.join_session(&code, parsed_token, channel_id).await {
                        Ok(JoinOutcome::Joined { token, history, receiver }) => {
                            let event = ServerEvent::SessionJoined {
                                client_token: token.to_string(),
                                history,
                            };
                            if send_event(&mut ws_sender, &event).await.is_err() {
                                return;
                            }
                            break (code, token, receiver);
                        }
                        Ok(JoinOutcome::Reconnected { history, receiver }) => {
                            let token = parsed_token.expect("reconnect always carries a token");
                            let event = ServerEvent::SessionJoined {
                                client_token: token.to_string(),
                                history,
                            };
                            if send_event(&mut ws_sender, &event).await.is_err() {
                                return;
                            }
                            break (code, token, receiver);
                        }
                        Err(e) => {
                            let event = ServerEvent::Error { message: e.to_string() };
                            if send_event(&mut ws_sender, &event).await.is_err() {
                                return;
                            }
                        }
                    }
                }
                Ok(_) => {
                    let event = ServerEvent::Error {
                        message: "must joinRoom before sending other events".to_string(),
                    };
                    let _ = send_event(&mut ws_sender, &event).await;
                }
                Err(e) => {
                    let event = ServerEvent::Error { message: format!("invalid event: {e}") };
                    let _ = send_event(&mut ws_sender, &event).await;
                }
            },
            Some(Ok(Message::Close(_))) | None => return,
            _ => continue,
        }
    };

    // ── Spawn outbound forwarder ─────────────────────────────────────────────

    let sender_task = tokio::spawn(async move {
        while let Some(event) = room_rx.recv().await {
            let wire = to_server_event(event);
            if send_event(&mut ws_sender, &wire).await.is_err() {
                break;
            }
        }
    });

    // ── Process inbound events ───────────────────────────────────────────────

    while let Some(msg_result) = ws_receiver.next().await {
        match msg_result {
            Ok(Message::Text(text)) => {
                handle_client_event(&state, &code, token, &text).await;
            }
            Ok(Message::Close(_)) => break,
            Err(_) => break,
            _ => {}
        }
    }

    sender_task.abort();
    state.sessions.handle_disconnect(channel_id).await;
}

async fn handle_client_event(state: &AppState, code: &str, token: ClientToken, text: &str) {
    match serde_json::from_str::<ClientEvent>(text) {
        Ok(ClientEvent::SendMessage { match_code, client_token, message }) => {
            if match_code != code || client_token.parse::<ClientToken>().ok() != Some(token) {
                tracing::warn!(code = %code, "sendMessage event targeted a mismatched session or token");
                return;
            }
            if let Err(e) = state.sessions.append_message(code, token, message).await {
                tracing::warn!(code = %code, error = %e, "failed to append message");
            }
        }
        Ok(ClientEvent::JoinRoom { .. }) => {
            tracing::warn!(code = %code, "duplicate joinRoom event ignored");
        }
        Err(e) => {
            tracing::warn!(code = %code, error = %e, "failed to parse client event");
        }
    }
}

fn to_server_event(event: RoomEvent) -> ServerEvent {
    match event {
        RoomEvent::UserConnected => ServerEvent::UserConnected,
        RoomEvent::UserDisconnected => ServerEvent::UserDisconnected,
        RoomEvent::MessageReceived(message) => ServerEvent::ReceiveMessage { message },
    }
}

async fn send_event(
    sender: &mut futures::stream::SplitSink<WebSocket, Message>,
    event: &ServerEvent,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(event).unwrap_or_default();
    sender.send(Message::Text(json)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_event_serialization_tags() {
        let event = ServerEvent::UserConnected;
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("userConnected"));

        let event = ServerEvent::Error { message: "boom".into() };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"error\""));
        assert!(json.contains("boom"));
    }

    #[test]
    fn test_client_event_deserializes_join_room() {
        let text = r#"{"type":"joinRoom","code":"ABC123","clientToken":null}"#;
        let event: ClientEvent = serde_json::from_str(text).unwrap();
        assert!(matches!(event, ClientEvent::JoinRoom { code, .. } if code == "ABC123"));
    }
}
