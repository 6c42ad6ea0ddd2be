use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    chat::chat_models::ChatResponse,
    message::message_models::{MessageResponse, MessageType},
};

/// Events pushed to live connections. Serialized as `{"event": "...", "payload": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "camelCase")]
pub enum WsMessage {
    Connected,
    NewChat(ChatResponse),
    UpdateGroupName(ChatResponse),
    LeaveChat(ChatResponse),
    MessageReceived(MessageResponse),
    SocketError(String),
    Pong,
}

impl WsMessage {
    pub fn name(&self) -> &'static str {
        match self {
            WsMessage::Connected => "connected",
            WsMessage::NewChat(_) => "newChat",
            WsMessage::UpdateGroupName(_) => "updateGroupName",
            WsMessage::LeaveChat(_) => "leaveChat",
            WsMessage::MessageReceived(_) => "messageReceived",
            WsMessage::SocketError(_) => "socketError",
            WsMessage::Pong => "pong",
        }
    }
}

// Client-to-server messages
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    SendMessage {
        chat_id: Uuid,
        #[serde(default)]
        message_type: MessageType,
        #[serde(default)]
        content: String,
        recipient: Option<Uuid>,
    },
    Ping,
}
