//! Publish/subscribe hub for live chat traffic. Connections join named
//! rooms (a shared room plus `user:<id>` private rooms) and receive every
//! message published to those rooms, fanned out over per-connection
//! channels.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info};
use tokio::sync::{mpsc, Mutex, RwLock};
use uuid::Uuid;
use warp::ws::{Message, WebSocket};

use crate::events::{ClientEvent, ServerEvent};
use crate::models::{ChatMessage, ChatUser, MessageKind};
use crate::store::Store;

type Connections = Arc<RwLock<HashMap<String, mpsc::UnboundedSender<Message>>>>;
type Rooms = Arc<RwLock<HashMap<String, HashSet<String>>>>;

/// Private room key for a user identity.
pub fn user_room(user_id: &str) -> String {
    format!("user:{user_id}")
}

fn display_name(user: Option<&ChatUser>) -> &str {
    user.and_then(|u| u.user_name.as_deref()).unwrap_or("User")
}

#[derive(Clone)]
pub struct Relay {
    store: Arc<Store>,
    connections: Connections,
    rooms: Rooms,
    // Publishes hold this across log-append and fan-out so every member of a
    // room observes the same order.
    publish_guard: Arc<Mutex<()>>,
}

impl Relay {
    pub fn new(store: Arc<Store>) -> Self {
        Relay {
            store,
            connections: Arc::new(RwLock::new(HashMap::new())),
            rooms: Arc::new(RwLock::new(HashMap::new())),
            publish_guard: Arc::new(Mutex::new(())),
        }
    }

    pub async fn handle_connection(&self, ws: WebSocket) {
        let connection_id = Uuid::new_v4().to_string();
        info!("WebSocket connected: {connection_id}");

        let (mut ws_tx, mut ws_rx) = ws.split();
        let (tx, mut rx) = mpsc::unbounded_channel();
        self.register(connection_id.clone(), tx).await;

        let relay = self.clone();
        let reader_id = connection_id.clone();
        tokio::spawn(async move {
            while let Some(result) = ws_rx.next().await {
                match result {
                    Ok(msg) => {
                        if let Ok(text) = msg.to_str() {
                            match serde_json::from_str::<ClientEvent>(text) {
                                Ok(event) => relay.handle_event(&reader_id, event).await,
                                Err(e) => {
                                    debug!("Ignoring unparseable event from {reader_id}: {e}");
                                }
                            }
                        }
                    }
                    Err(e) => {
                        error!("WebSocket error on {reader_id}: {e}");
                        break;
                    }
                }
            }
            relay.disconnect(&reader_id).await;
        });

        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if let Err(e) = ws_tx.send(message).await {
                    error!("Failed to send WebSocket message: {e}");
                    break;
                }
            }
        });
    }

    pub async fn register(&self, connection_id: String, sender: mpsc::UnboundedSender<Message>) {
        let mut connections = self.connections.write().await;
        connections.insert(connection_id, sender);
    }

    pub async fn handle_event(&self, connection_id: &str, event: ClientEvent) {
        match event {
            ClientEvent::JoinRoom { room, user } => {
                self.join_room(connection_id, &room, user.as_ref()).await;
            }
            ClientEvent::LeaveRoom { room, user } => {
                self.leave_room(connection_id, &room, user.as_ref()).await;
            }
            ClientEvent::ChatMessage { room, user, text } => {
                self.publish_text(&room, user, text).await;
            }
            ClientEvent::ChatMedia {
                room,
                user,
                url,
                media_type,
            } => {
                self.publish_media(&room, user, url, media_type.as_deref())
                    .await;
            }
            ClientEvent::PrivateMessage {
                to_user_id,
                from_user,
                text,
            } => {
                self.send_private(&to_user_id, from_user, text).await;
            }
        }
    }

    /// Adds the connection to `room`, auto-joins the identity's private room
    /// when an id is present, and notifies the room's other members.
    pub async fn join_room(&self, connection_id: &str, room: &str, user: Option<&ChatUser>) {
        {
            let mut rooms = self.rooms.write().await;
            rooms
                .entry(room.to_string())
                .or_default()
                .insert(connection_id.to_string());
            if let Some(id) = user.and_then(|u| u.id.as_deref()) {
                rooms
                    .entry(user_room(id))
                    .or_default()
                    .insert(connection_id.to_string());
            }
        }
        let notice = self.system_notice(room, format!("{} joined the room", display_name(user)));
        self.broadcast(
            room,
            &ServerEvent::SystemMessage { message: notice },
            Some(connection_id),
        )
        .await;
    }

    pub async fn leave_room(&self, connection_id: &str, room: &str, user: Option<&ChatUser>) {
        {
            let mut rooms = self.rooms.write().await;
            if let Some(members) = rooms.get_mut(room) {
                members.remove(connection_id);
                if members.is_empty() {
                    rooms.remove(room);
                }
            }
        }
        let notice = self.system_notice(room, format!("{} left the room", display_name(user)));
        self.broadcast(
            room,
            &ServerEvent::SystemMessage { message: notice },
            Some(connection_id),
        )
        .await;
    }

    /// Publishes a text message: logged, then delivered to every member of
    /// the room including the sender's own connection.
    pub async fn publish_text(
        &self,
        room: &str,
        user: Option<ChatUser>,
        text: String,
    ) -> ChatMessage {
        let message = ChatMessage {
            id: self.store.next_message_id(),
            kind: MessageKind::Text,
            room: room.to_string(),
            user,
            text: Some(text),
            url: None,
            timestamp: Utc::now().timestamp_millis(),
            private: false,
        };
        self.publish(message).await
    }

    pub async fn publish_media(
        &self,
        room: &str,
        user: Option<ChatUser>,
        url: String,
        media_type: Option<&str>,
    ) -> ChatMessage {
        let kind = match media_type {
            Some("audio") => MessageKind::Audio,
            _ => MessageKind::Image,
        };
        let message = ChatMessage {
            id: self.store.next_message_id(),
            kind,
            room: room.to_string(),
            user,
            text: None,
            url: Some(url),
            timestamp: Utc::now().timestamp_millis(),
            private: false,
        };
        self.publish(message).await
    }

    /// Delivers a private text only to members of the recipient's own room.
    pub async fn send_private(
        &self,
        to_user_id: &str,
        from_user: Option<ChatUser>,
        text: String,
    ) -> ChatMessage {
        let room = user_room(to_user_id);
        let message = ChatMessage {
            id: self.store.next_message_id(),
            kind: MessageKind::Text,
            room,
            user: from_user,
            text: Some(text),
            url: None,
            timestamp: Utc::now().timestamp_millis(),
            private: true,
        };
        self.publish(message).await
    }

    async fn publish(&self, message: ChatMessage) -> ChatMessage {
        let _guard = self.publish_guard.lock().await;
        self.store.append_message(message.clone()).await;
        let room = message.room.clone();
        self.broadcast(
            &room,
            &ServerEvent::ChatMessage {
                message: message.clone(),
            },
            None,
        )
        .await;
        message
    }

    /// Membership is dropped silently; no notices on disconnect.
    pub async fn disconnect(&self, connection_id: &str) {
        {
            let mut rooms = self.rooms.write().await;
            for members in rooms.values_mut() {
                members.remove(connection_id);
            }
            rooms.retain(|_, members| !members.is_empty());
        }
        let mut connections = self.connections.write().await;
        connections.remove(connection_id);
        info!("WebSocket disconnected: {connection_id}");
    }

    fn system_notice(&self, room: &str, text: String) -> ChatMessage {
        ChatMessage {
            id: self.store.next_message_id(),
            kind: MessageKind::System,
            room: room.to_string(),
            user: None,
            text: Some(text),
            url: None,
            timestamp: Utc::now().timestamp_millis(),
            private: false,
        }
    }

    async fn broadcast(&self, room: &str, event: &ServerEvent, except: Option<&str>) {
        let Ok(payload) = serde_json::to_string(event) else {
            return;
        };
        let members: Vec<String> = {
            let rooms = self.rooms.read().await;
            match rooms.get(room) {
                Some(members) => members.iter().cloned().collect(),
                None => return,
            }
        };
        let connections = self.connections.read().await;
        for member in members {
            if Some(member.as_str()) == except {
                continue;
            }
            if let Some(sender) = connections.get(&member) {
                let _ = sender.send(Message::text(payload.clone()));
            }
        }
    }
}
