use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::message_models::{Attachment, MessageType};

pub const MAX_CONTENT_CHARS: usize = 10000;

#[derive(Clone, Debug, Deserialize, Validate, ToSchema)]
pub struct SendMessageRequest {
    /// Optional addressing hint; must be another participant of the chat.
    pub recipient: Option<Uuid>,
    #[serde(default)]
    pub message_type: MessageType,
    #[serde(default)]
    #[validate(length(max = 10000))]
    pub content: String,
}

/// A send, however it arrived (JSON, multipart or socket), with uploads already stored.
#[derive(Clone, Debug, Default)]
pub struct SendMessage {
    pub recipient: Option<Uuid>,
    pub message_type: MessageType,
    pub content: String,
    pub attachments: Vec<Attachment>,
}

impl From<SendMessageRequest> for SendMessage {
    fn from(request: SendMessageRequest) -> Self {
        Self {
            recipient: request.recipient,
            message_type: request.message_type,
            content: request.content,
            attachments: Vec::new(),
        }
    }
}
