use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow};
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{error::AppError, user::user_models::PublicUser};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "message_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    Video,
    File,
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageType::Text => write!(f, "text"),
            MessageType::Image => write!(f, "image"),
            MessageType::Video => write!(f, "video"),
            MessageType::File => write!(f, "file"),
        }
    }
}

impl FromStr for MessageType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "text" => Ok(MessageType::Text),
            "image" => Ok(MessageType::Image),
            "video" => Ok(MessageType::Video),
            "file" => Ok(MessageType::File),
            other => Err(AppError::BadRequest(format!("Unknown message type: {other}"))),
        }
    }
}

/// A stored file reference: public URL plus the path it was written to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Attachment {
    pub url: String,
    pub local_path: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct Message {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub sender_id: Uuid,
    pub recipient_id: Option<Uuid>,
    pub message_type: MessageType,
    pub content: String,
    pub attachments: Json<Vec<Attachment>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert payload for the message store. The chat reference is fixed here and never updated.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub chat_id: Uuid,
    pub sender_id: Uuid,
    pub recipient_id: Option<Uuid>,
    pub message_type: MessageType,
    pub content: String,
    pub attachments: Vec<Attachment>,
}

/// A message with its sender expanded. `sender` is absent if the user record is gone.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub id: Uuid,
    pub chat: Uuid,
    pub sender_id: Uuid,
    pub sender: Option<PublicUser>,
    pub recipient: Option<Uuid>,
    pub message_type: MessageType,
    pub content: String,
    pub attachments: Vec<Attachment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MessageResponse {
    pub fn from_parts(message: Message, sender: Option<PublicUser>) -> Self {
        Self {
            id: message.id,
            chat: message.chat_id,
            sender_id: message.sender_id,
            sender,
            recipient: message.recipient_id,
            message_type: message.message_type,
            content: message.content,
            attachments: message.attachments.0,
            created_at: message.created_at,
            updated_at: message.updated_at,
        }
    }
}
