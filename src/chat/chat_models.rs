use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{message::message_models::MessageResponse, user::user_models::PublicUser};

pub const DIRECT_CHAT_NAME: &str = "One on one chat";
pub const MIN_GROUP_MEMBERS: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Chat {
    pub id: Uuid,
    pub name: String,
    pub is_group_chat: bool,
    pub participants: Vec<Uuid>,
    pub admin_id: Uuid,
    pub last_message_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Chat {
    pub fn has_participant(&self, user_id: Uuid) -> bool {
        self.participants.contains(&user_id)
    }

    pub fn is_admin(&self, user_id: Uuid) -> bool {
        self.admin_id == user_id
    }

    /// Participants other than `user_id`, in stored order.
    pub fn others(&self, user_id: Uuid) -> impl Iterator<Item = Uuid> + '_ {
        self.participants.iter().copied().filter(move |id| *id != user_id)
    }
}

/// Insert payload for the chat store.
#[derive(Debug, Clone)]
pub struct NewChat {
    pub name: String,
    pub is_group_chat: bool,
    pub participants: Vec<Uuid>,
    pub admin_id: Uuid,
}

impl NewChat {
    pub fn direct(creator: Uuid, other: Uuid) -> Self {
        Self {
            name: DIRECT_CHAT_NAME.to_string(),
            is_group_chat: false,
            participants: vec![creator, other],
            admin_id: creator,
        }
    }

    pub fn group(creator: Uuid, name: String, participants: Vec<Uuid>) -> Self {
        Self {
            name,
            is_group_chat: true,
            participants,
            admin_id: creator,
        }
    }
}

/// Order-independent key for the participant pair of a direct chat.
pub fn direct_key(a: Uuid, b: Uuid) -> String {
    let (low, high) = if a <= b { (a, b) } else { (b, a) };
    format!("{low}:{high}")
}

/// A chat with participants and last message expanded for clients.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChatResponse {
    pub id: Uuid,
    pub name: String,
    pub is_group_chat: bool,
    pub participants: Vec<PublicUser>,
    pub admin: Uuid,
    pub last_message: Option<MessageResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChatResponse {
    pub fn participant_ids(&self) -> Vec<Uuid> {
        self.participants.iter().map(|p| p.id).collect()
    }
}

/// Outcome of a create-or-get lookup. Both arms carry the same payload shape.
#[derive(Debug, Clone)]
pub enum DirectChat {
    Existing(ChatResponse),
    Created(ChatResponse),
}

impl DirectChat {
    pub fn is_created(&self) -> bool {
        matches!(self, DirectChat::Created(_))
    }

    pub fn into_inner(self) -> ChatResponse {
        match self {
            DirectChat::Existing(chat) | DirectChat::Created(chat) => chat,
        }
    }
}
