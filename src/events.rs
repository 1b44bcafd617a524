use serde::{Deserialize, Serialize};

use crate::models::{ChatMessage, ChatUser};

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ClientEvent {
    #[serde(rename_all = "camelCase")]
    JoinRoom {
        room: String,
        user: Option<ChatUser>,
    },
    #[serde(rename_all = "camelCase")]
    LeaveRoom {
        room: String,
        user: Option<ChatUser>,
    },
    #[serde(rename_all = "camelCase")]
    ChatMessage {
        room: String,
        user: Option<ChatUser>,
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    ChatMedia {
        room: String,
        user: Option<ChatUser>,
        url: String,
        media_type: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    PrivateMessage {
        to_user_id: String,
        from_user: Option<ChatUser>,
        text: String,
    },
}

#[derive(Serialize, Clone, Debug)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ServerEvent {
    ChatMessage {
        #[serde(flatten)]
        message: ChatMessage,
    },
    SystemMessage {
        #[serde(flatten)]
        message: ChatMessage,
    },
}
