//! Expands stored ids into the read-only shapes handed to clients and sockets.

use std::{collections::HashMap, sync::Arc};
use uuid::Uuid;

use crate::{
    chat::chat_models::{Chat, ChatResponse},
    error::{AppError, Result},
    message::{
        message_models::{Message, MessageResponse},
        message_repository::MessageStore,
    },
    user::{user_models::PublicUser, user_repository::UserDirectory},
};

#[derive(Clone)]
pub struct Hydrator {
    users: Arc<dyn UserDirectory>,
    messages: Arc<dyn MessageStore>,
}

impl Hydrator {
    pub fn new(users: Arc<dyn UserDirectory>, messages: Arc<dyn MessageStore>) -> Self {
        Self { users, messages }
    }

    pub async fn chat(&self, chat: Chat) -> Result<ChatResponse> {
        self.chats(vec![chat])
            .await?
            .pop()
            .ok_or_else(|| AppError::Internal("Chat hydration produced no result".to_string()))
    }

    /// Hydrates a batch, preserving input order. Profiles are fetched in one lookup.
    pub async fn chats(&self, chats: Vec<Chat>) -> Result<Vec<ChatResponse>> {
        let mut last_messages: HashMap<Uuid, Message> = HashMap::new();
        for chat in &chats {
            // A dangling pointer (message already deleted) hydrates to no last message.
            if let Some(message_id) = chat.last_message_id {
                if let Some(message) = self.messages.find_by_id(message_id).await? {
                    last_messages.insert(chat.id, message);
                }
            }
        }

        let user_ids: Vec<Uuid> = chats
            .iter()
            .flat_map(|chat| chat.participants.iter().copied())
            .chain(last_messages.values().map(|m| m.sender_id))
            .collect();
        let profiles = self.profiles(user_ids).await?;

        Ok(chats
            .into_iter()
            .map(|chat| {
                let last_message = last_messages
                    .remove(&chat.id)
                    .map(|m| build_message(m, &profiles));
                build_chat(chat, last_message, &profiles)
            })
            .collect())
    }

    pub async fn message(&self, message: Message) -> Result<MessageResponse> {
        self.messages(vec![message])
            .await?
            .pop()
            .ok_or_else(|| AppError::Internal("Message hydration produced no result".to_string()))
    }

    pub async fn messages(&self, messages: Vec<Message>) -> Result<Vec<MessageResponse>> {
        let profiles = self
            .profiles(messages.iter().map(|m| m.sender_id).collect())
            .await?;

        Ok(messages
            .into_iter()
            .map(|m| build_message(m, &profiles))
            .collect())
    }

    async fn profiles(&self, mut user_ids: Vec<Uuid>) -> Result<HashMap<Uuid, PublicUser>> {
        user_ids.sort_unstable();
        user_ids.dedup();

        let users = self.users.find_many(&user_ids).await?;
        Ok(users
            .into_iter()
            .map(|user| (user.id, PublicUser::from(user)))
            .collect())
    }
}

fn build_chat(
    chat: Chat,
    last_message: Option<MessageResponse>,
    profiles: &HashMap<Uuid, PublicUser>,
) -> ChatResponse {
    ChatResponse {
        id: chat.id,
        name: chat.name,
        is_group_chat: chat.is_group_chat,
        participants: chat
            .participants
            .iter()
            .filter_map(|id| profiles.get(id).cloned())
            .collect(),
        admin: chat.admin_id,
        last_message,
        created_at: chat.created_at,
        updated_at: chat.updated_at,
    }
}

fn build_message(message: Message, profiles: &HashMap<Uuid, PublicUser>) -> MessageResponse {
    let sender = profiles.get(&message.sender_id).cloned();
    MessageResponse::from_parts(message, sender)
}
