use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use engine::events::EventCompletion;
use engine::levels::LevelUp;
use engine::types::{AlbumId, EventId};
use engine::{RewardBundle, RewardGrant, UserId};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::AppState;

// Notification types that can be pushed to players
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationType {
    ConnectionEstablished {
        user_id: UserId,
        message: String,
    },
    LevelUp {
        level: u32,
        reward: Option<RewardGrant>,
        credited: RewardBundle,
    },
    AlbumCompleted {
        album_id: AlbumId,
        reward: Option<RewardBundle>,
    },
    EventCompleted {
        event_id: EventId,
        name: String,
        reward: RewardGrant,
    },
    Broadcast {
        message: String,
    },
}

impl From<&LevelUp> for NotificationType {
    fn from(up: &LevelUp) -> Self {
        NotificationType::LevelUp {
            level: up.level,
            reward: up.reward,
            credited: up.credited,
        }
    }
}

impl From<&EventCompletion> for NotificationType {
    fn from(done: &EventCompletion) -> Self {
        NotificationType::EventCompleted {
            event_id: done.event_id,
            name: done.name.clone(),
            reward: done.reward,
        }
    }
}

// One channel per connected player
pub type NotificationManager = Arc<Mutex<HashMap<UserId, broadcast::Sender<NotificationType>>>>;

pub fn create_notification_manager() -> NotificationManager {
    Arc::new(Mutex::new(HashMap::new()))
}

// Senders are inserted and removed whole, so a poisoned map is still usable
fn channels(
    manager: &NotificationManager,
) -> MutexGuard<'_, HashMap<UserId, broadcast::Sender<NotificationType>>> {
    manager.lock().unwrap_or_else(PoisonError::into_inner)
}

// WebSocket handler
pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket_with_auth(socket, state))
}

// The first message must carry the session token
async fn handle_socket_with_auth(socket: WebSocket, state: AppState) {
    tracing::debug!("WebSocket connection opened, awaiting authentication");

    let (mut sender, mut receiver) = socket.split();

    let user_id = match receiver.next().await {
        Some(Ok(Message::Text(text))) => match serde_json::from_str::<AuthMessage>(&text) {
            Ok(auth_msg) => match state.storage.get_session(&auth_msg.session_id) {
                Some(session) => {
                    tracing::info!("User {} authenticated via WebSocket", session.user_id);
                    session.user_id
                }
                None => {
                    tracing::warn!("Invalid session ID in WebSocket auth");
                    let failure = NotificationType::ConnectionEstablished {
                        user_id: 0,
                        message: "Authentication failed: invalid session ID".to_string(),
                    };
                    if let Ok(text) = serde_json::to_string(&failure) {
                        let _ = sender.send(Message::Text(text.into())).await;
                    }
                    return;
                }
            },
            Err(e) => {
                tracing::warn!("Failed to parse WebSocket auth message: {}", e);
                let _ = sender
                    .send(Message::Text(
                        "Authentication failed: invalid message format".into(),
                    ))
                    .await;
                return;
            }
        },
        Some(Ok(Message::Close(_))) | None => {
            tracing::debug!("WebSocket connection closed before authentication");
            return;
        }
        Some(Err(e)) => {
            tracing::error!("WebSocket error during authentication: {}", e);
            return;
        }
        Some(Ok(_)) => {
            tracing::warn!("Unexpected message type during WebSocket authentication");
            return;
        }
    };

    handle_authenticated_socket(sender, receiver, user_id, state).await;
}

#[derive(Debug, Deserialize)]
struct AuthMessage {
    #[serde(rename = "sessionId")]
    session_id: String,
}

async fn handle_authenticated_socket(
    mut sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut receiver: futures_util::stream::SplitStream<WebSocket>,
    user_id: UserId,
    state: AppState,
) {
    let (tx, rx) = broadcast::channel(100);
    // A newer connection for the same player takes over the channel
    channels(&state.notification_manager).insert(user_id, tx.clone());

    let connection_msg = NotificationType::ConnectionEstablished {
        user_id,
        message: "Successfully connected to notifications".to_string(),
    };
    if let Ok(msg_text) = serde_json::to_string(&connection_msg) {
        if sender.send(Message::Text(msg_text.into())).await.is_err() {
            tracing::warn!("Failed to send connection message to user {}", user_id);
        }
    }

    let incoming_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    tracing::debug!("Ignoring message from user {}: {}", user_id, text);
                }
                Ok(Message::Close(_)) => {
                    tracing::debug!("WebSocket connection closed by user {}", user_id);
                    break;
                }
                Err(e) => {
                    tracing::error!("WebSocket error for user {}: {}", user_id, e);
                    break;
                }
                _ => {}
            }
        }
    });

    let outgoing_task = tokio::spawn(async move {
        let mut notifications = BroadcastStream::new(rx);
        while let Some(next) = notifications.next().await {
            let notification = match next {
                Ok(notification) => notification,
                // Slow reader: skip what was dropped and carry on
                Err(lagged) => {
                    tracing::warn!("User {} missed notifications: {}", user_id, lagged);
                    continue;
                }
            };
            match serde_json::to_string(&notification) {
                Ok(msg_text) => {
                    if sender.send(Message::Text(msg_text.into())).await.is_err() {
                        tracing::warn!("Failed to send notification to user {}", user_id);
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!(
                        "Failed to serialize notification for user {}: {}",
                        user_id,
                        e
                    );
                }
            }
        }
    });

    tokio::select! {
        _ = incoming_task => {
            tracing::debug!("Incoming task completed for user {}", user_id);
        }
        _ = outgoing_task => {
            tracing::debug!("Outgoing task completed for user {}", user_id);
        }
    }

    // Only remove the channel if a newer connection has not replaced it
    let mut manager = channels(&state.notification_manager);
    if manager
        .get(&user_id)
        .is_some_and(|current| current.same_channel(&tx))
    {
        manager.remove(&user_id);
    }
    drop(manager);

    tracing::info!("WebSocket connection closed for user {}", user_id);
}

pub fn send_notification_to_user(
    notification_manager: &NotificationManager,
    user_id: UserId,
    notification: NotificationType,
) {
    let manager = channels(notification_manager);
    if let Some(tx) = manager.get(&user_id) {
        if let Err(e) = tx.send(notification) {
            tracing::warn!("Failed to send notification to user {}: {}", user_id, e);
        }
    }
}

/// Push to every connected player; returns how many channels accepted it
pub fn broadcast_to_all(
    notification_manager: &NotificationManager,
    notification: NotificationType,
) -> usize {
    let manager = channels(notification_manager);
    manager
        .values()
        .filter(|tx| tx.send(notification.clone()).is_ok())
        .count()
}

// Level-ups and event completions produced by one settled operation
pub fn send_progress_notifications(
    notification_manager: &NotificationManager,
    user_id: UserId,
    level_ups: &[LevelUp],
    events_completed: &[EventCompletion],
) {
    for up in level_ups {
        send_notification_to_user(notification_manager, user_id, up.into());
    }
    for done in events_completed {
        send_notification_to_user(notification_manager, user_id, done.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine::RewardKind;

    #[test]
    fn test_notifications_are_tagged() {
        let json = serde_json::to_value(NotificationType::AlbumCompleted {
            album_id: 2,
            reward: Some(RewardBundle::coins(500)),
        })
        .unwrap();
        assert_eq!(json["type"], "album_completed");
        assert_eq!(json["album_id"], 2);
        assert_eq!(json["reward"]["coins"], 500);
    }

    #[test]
    fn test_user_and_broadcast_delivery() {
        let manager = create_notification_manager();
        let (tx_a, mut rx_a) = broadcast::channel(8);
        let (tx_b, mut rx_b) = broadcast::channel(8);
        channels(&manager).insert(1, tx_a);
        channels(&manager).insert(2, tx_b);

        let done = EventCompletion {
            event_id: 4,
            slug: "grand-regatta".to_string(),
            name: "Grand Regatta".to_string(),
            reward: RewardGrant::new(RewardKind::Coins, 250),
        };
        send_progress_notifications(&manager, 1, &[], std::slice::from_ref(&done));
        assert_eq!(rx_a.try_recv().unwrap(), NotificationType::from(&done));
        assert!(rx_b.try_recv().is_err());

        let delivered = broadcast_to_all(
            &manager,
            NotificationType::Broadcast {
                message: "Double coins tonight".to_string(),
            },
        );
        assert_eq!(delivered, 2);
        assert!(matches!(
            rx_b.try_recv().unwrap(),
            NotificationType::Broadcast { .. }
        ));
    }
}
