use crate::error::Result;
use axum::async_trait;
use sqlx::PgPool;
use uuid::Uuid;
use super::chat_models::{direct_key, Chat, NewChat};

const CHAT_COLUMNS: &str = "id, name, is_group_chat, participants, admin_id, last_message_id, \
                            created_at, updated_at";

#[async_trait]
pub trait ChatStore: Send + Sync {
    /// The direct (non-group) chat whose participants are exactly `{a, b}`.
    async fn find_direct(&self, a: Uuid, b: Uuid) -> Result<Option<Chat>>;

    /// Inserts a chat. Returns `None` when a direct chat for the same pair already exists.
    async fn insert(&self, chat: NewChat) -> Result<Option<Chat>>;

    async fn find_by_id(&self, chat_id: Uuid) -> Result<Option<Chat>>;

    /// Chats containing `user_id`, most recently updated first.
    async fn find_for_participant(&self, user_id: Uuid) -> Result<Vec<Chat>>;

    async fn rename(&self, chat_id: Uuid, name: &str) -> Result<Option<Chat>>;

    /// Moves the last-message pointer and bumps `updated_at`.
    async fn set_last_message(&self, chat_id: Uuid, message_id: Option<Uuid>) -> Result<()>;

    /// Returns whether a row was removed.
    async fn delete(&self, chat_id: Uuid) -> Result<bool>;
}

#[derive(Clone)]
pub struct ChatRepository {
    pool: PgPool,
}

impl ChatRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChatStore for ChatRepository {
    async fn find_direct(&self, a: Uuid, b: Uuid) -> Result<Option<Chat>> {
        let chat = sqlx::query_as::<_, Chat>(&format!(
            "SELECT {CHAT_COLUMNS} FROM chats
             WHERE direct_key = $1 AND is_group_chat = false"
        ))
        .bind(direct_key(a, b))
        .fetch_optional(&self.pool)
        .await?;

        Ok(chat)
    }

    async fn insert(&self, chat: NewChat) -> Result<Option<Chat>> {
        let key = if chat.is_group_chat {
            None
        } else {
            match chat.participants.as_slice() {
                [a, b] => Some(direct_key(*a, *b)),
                _ => None,
            }
        };

        let chat = sqlx::query_as::<_, Chat>(&format!(
            "INSERT INTO chats (name, is_group_chat, participants, admin_id, direct_key)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (direct_key) WHERE direct_key IS NOT NULL DO NOTHING
             RETURNING {CHAT_COLUMNS}"
        ))
        .bind(&chat.name)
        .bind(chat.is_group_chat)
        .bind(&chat.participants)
        .bind(chat.admin_id)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(chat)
    }

    async fn find_by_id(&self, chat_id: Uuid) -> Result<Option<Chat>> {
        let chat = sqlx::query_as::<_, Chat>(&format!(
            "SELECT {CHAT_COLUMNS} FROM chats WHERE id = $1"
        ))
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(chat)
    }

    async fn find_for_participant(&self, user_id: Uuid) -> Result<Vec<Chat>> {
        let chats = sqlx::query_as::<_, Chat>(&format!(
            "SELECT {CHAT_COLUMNS} FROM chats
             WHERE $1 = ANY(participants)
             ORDER BY updated_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(chats)
    }

    async fn rename(&self, chat_id: Uuid, name: &str) -> Result<Option<Chat>> {
        let chat = sqlx::query_as::<_, Chat>(&format!(
            "UPDATE chats
             SET name = $1, updated_at = NOW()
             WHERE id = $2
             RETURNING {CHAT_COLUMNS}"
        ))
        .bind(name)
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(chat)
    }

    async fn set_last_message(&self, chat_id: Uuid, message_id: Option<Uuid>) -> Result<()> {
        sqlx::query(
            "UPDATE chats
             SET last_message_id = $1, updated_at = NOW()
             WHERE id = $2",
        )
        .bind(message_id)
        .bind(chat_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, chat_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM chats WHERE id = $1")
            .bind(chat_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
