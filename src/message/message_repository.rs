use crate::error::Result;
use crate::message::message_models::{Message, NewMessage};
use axum::async_trait;
use sqlx::{types::Json, PgPool};
use uuid::Uuid;

const MESSAGE_COLUMNS: &str = "id, chat_id, sender_id, recipient_id, message_type, content, \
                               attachments, created_at, updated_at";

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn insert(&self, message: NewMessage) -> Result<Message>;

    async fn find_by_id(&self, message_id: Uuid) -> Result<Option<Message>>;

    /// Messages of a chat, newest first.
    async fn find_by_chat(&self, chat_id: Uuid) -> Result<Vec<Message>>;

    async fn find_latest(&self, chat_id: Uuid) -> Result<Option<Message>>;

    /// Removes one message, returning it if it existed.
    async fn delete(&self, message_id: Uuid) -> Result<Option<Message>>;

    /// Removes every message of a chat, returning what was removed.
    async fn delete_by_chat(&self, chat_id: Uuid) -> Result<Vec<Message>>;
}

#[derive(Clone)]
pub struct MessageRepository {
    pool: PgPool,
}

impl MessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageStore for MessageRepository {
    async fn insert(&self, message: NewMessage) -> Result<Message> {
        let message = sqlx::query_as::<_, Message>(&format!(
            "INSERT INTO messages (chat_id, sender_id, recipient_id, message_type, content, attachments)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {MESSAGE_COLUMNS}"
        ))
        .bind(message.chat_id)
        .bind(message.sender_id)
        .bind(message.recipient_id)
        .bind(message.message_type)
        .bind(&message.content)
        .bind(Json(&message.attachments))
        .fetch_one(&self.pool)
        .await?;

        Ok(message)
    }

    async fn find_by_id(&self, message_id: Uuid) -> Result<Option<Message>> {
        let message = sqlx::query_as::<_, Message>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1"
        ))
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(message)
    }

    async fn find_by_chat(&self, chat_id: Uuid) -> Result<Vec<Message>> {
        let messages = sqlx::query_as::<_, Message>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE chat_id = $1
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(messages)
    }

    async fn find_latest(&self, chat_id: Uuid) -> Result<Option<Message>> {
        let message = sqlx::query_as::<_, Message>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE chat_id = $1
             ORDER BY created_at DESC, id DESC
             LIMIT 1"
        ))
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(message)
    }

    async fn delete(&self, message_id: Uuid) -> Result<Option<Message>> {
        let message = sqlx::query_as::<_, Message>(&format!(
            "DELETE FROM messages WHERE id = $1 RETURNING {MESSAGE_COLUMNS}"
        ))
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(message)
    }

    async fn delete_by_chat(&self, chat_id: Uuid) -> Result<Vec<Message>> {
        let messages = sqlx::query_as::<_, Message>(&format!(
            "DELETE FROM messages WHERE chat_id = $1 RETURNING {MESSAGE_COLUMNS}"
        ))
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(messages)
    }
}
