use std::sync::Arc;
use uuid::Uuid;

use crate::{
    attachment::AttachmentStore,
    chat::{
        chat_hydration::Hydrator,
        chat_models::{Chat, ChatResponse, DirectChat, NewChat, MIN_GROUP_MEMBERS},
        chat_repository::ChatStore,
    },
    error::{AppError, Result},
    message::message_repository::MessageStore,
    user::user_repository::UserDirectory,
    websocket::{ConnectionManager, WsMessage},
};

/// Rules for creating, reading, renaming and deleting chats.
#[derive(Clone)]
pub struct ChatService {
    chats: Arc<dyn ChatStore>,
    messages: Arc<dyn MessageStore>,
    users: Arc<dyn UserDirectory>,
    hydrator: Hydrator,
    attachments: AttachmentStore,
    ws_manager: ConnectionManager,
}

impl ChatService {
    pub fn new(
        chats: Arc<dyn ChatStore>,
        messages: Arc<dyn MessageStore>,
        users: Arc<dyn UserDirectory>,
        attachments: AttachmentStore,
        ws_manager: ConnectionManager,
    ) -> Self {
        let hydrator = Hydrator::new(users.clone(), messages.clone());
        Self {
            chats,
            messages,
            users,
            hydrator,
            attachments,
            ws_manager,
        }
    }

    pub fn hydrator(&self) -> &Hydrator {
        &self.hydrator
    }

    pub async fn create_or_get_direct_chat(&self, actor: Uuid, other_user: Uuid) -> Result<DirectChat> {
        self.users
            .find_by_id(other_user)
            .await?
            .ok_or_else(|| AppError::NotFound("Receiver does not exist".to_string()))?;

        if other_user == actor {
            return Err(AppError::BadRequest("You cannot chat with yourself".to_string()));
        }

        if let Some(chat) = self.chats.find_direct(actor, other_user).await? {
            return Ok(DirectChat::Existing(self.hydrator.chat(chat).await?));
        }

        let Some(chat) = self.chats.insert(NewChat::direct(actor, other_user)).await? else {
            // Lost a creation race for the same pair; the winner's chat is the answer.
            let chat = self
                .chats
                .find_direct(actor, other_user)
                .await?
                .ok_or_else(|| AppError::Internal("Direct chat vanished after conflict".to_string()))?;
            return Ok(DirectChat::Existing(self.hydrator.chat(chat).await?));
        };

        let payload = self.hydrator.chat(chat).await?;
        tracing::info!("Direct chat {} created by {} with {}", payload.id, actor, other_user);

        self.ws_manager.broadcast_to_chat(
            &payload.participant_ids(),
            WsMessage::NewChat(payload.clone()),
            Some(actor),
        );

        Ok(DirectChat::Created(payload))
    }

    pub async fn create_group_chat(
        &self,
        actor: Uuid,
        name: String,
        participant_ids: Vec<Uuid>,
    ) -> Result<ChatResponse> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::BadRequest("Group chat name is required".to_string()));
        }

        if participant_ids.contains(&actor) {
            return Err(AppError::BadRequest(
                "Participants should not contain the group creator".to_string(),
            ));
        }

        let mut members: Vec<Uuid> = Vec::with_capacity(participant_ids.len() + 1);
        for id in participant_ids.into_iter().chain(std::iter::once(actor)) {
            if !members.contains(&id) {
                members.push(id);
            }
        }

        if members.len() < MIN_GROUP_MEMBERS {
            return Err(AppError::BadRequest(format!(
                "A group chat needs at least {} distinct members including the creator",
                MIN_GROUP_MEMBERS
            )));
        }

        let known = self.users.find_many(&members).await?;
        if let Some(missing) = members.iter().find(|id| !known.iter().any(|u| u.id == **id)) {
            return Err(AppError::NotFound(format!("Participant {} does not exist", missing)));
        }

        let chat = self
            .chats
            .insert(NewChat::group(actor, name, members))
            .await?
            .ok_or_else(|| AppError::Internal("Group chat insert returned nothing".to_string()))?;

        let payload = self.hydrator.chat(chat).await?;
        tracing::info!(
            "Group chat {} created by {} with {} members",
            payload.id,
            actor,
            payload.participants.len()
        );

        self.ws_manager.broadcast_to_chat(
            &payload.participant_ids(),
            WsMessage::NewChat(payload.clone()),
            Some(actor),
        );

        Ok(payload)
    }

    pub async fn list_chats(&self, actor: Uuid) -> Result<Vec<ChatResponse>> {
        let chats = self.chats.find_for_participant(actor).await?;
        self.hydrator.chats(chats).await
    }

    pub async fn get_group_chat(&self, chat_id: Uuid) -> Result<ChatResponse> {
        let chat = self.find_group(chat_id).await?;
        self.hydrator.chat(chat).await
    }

    pub async fn rename_group_chat(&self, actor: Uuid, chat_id: Uuid, name: String) -> Result<ChatResponse> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::BadRequest("Group chat name is required".to_string()));
        }

        let chat = self.find_group(chat_id).await?;
        if !chat.is_admin(actor) {
            return Err(AppError::Forbidden("Only the group admin can rename the group".to_string()));
        }

        let chat = self
            .chats
            .rename(chat_id, &name)
            .await?
            .ok_or_else(|| AppError::NotFound("Group chat does not exist".to_string()))?;

        let payload = self.hydrator.chat(chat).await?;
        tracing::info!("Group chat {} renamed to {:?} by {}", chat_id, payload.name, actor);

        // The actor is included so their other sessions pick up the new name.
        self.ws_manager.broadcast_to_chat(
            &payload.participant_ids(),
            WsMessage::UpdateGroupName(payload.clone()),
            None,
        );

        Ok(payload)
    }

    pub async fn delete_chat(&self, actor: Uuid, chat_id: Uuid) -> Result<()> {
        let chat = self.find_group(chat_id).await?;
        if !chat.is_admin(actor) {
            return Err(AppError::Forbidden("Only the group admin can delete the group".to_string()));
        }

        self.remove_chat(actor, chat).await
    }

    /// Deletes the direct chat between `actor` and `other_user`. Either participant may do this.
    pub async fn delete_direct_chat(&self, actor: Uuid, other_user: Uuid) -> Result<()> {
        let chat = self
            .chats
            .find_direct(actor, other_user)
            .await?
            .ok_or_else(|| AppError::NotFound("Chat does not exist".to_string()))?;

        self.remove_chat(actor, chat).await
    }

    /// Loads a chat and checks that `actor` takes part in it.
    pub async fn require_participant(&self, actor: Uuid, chat_id: Uuid) -> Result<Chat> {
        let chat = self
            .chats
            .find_by_id(chat_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Chat does not exist".to_string()))?;

        if !chat.has_participant(actor) {
            return Err(AppError::Forbidden("User is not a part of this chat".to_string()));
        }

        Ok(chat)
    }

    pub async fn find_chat(&self, chat_id: Uuid) -> Result<Option<Chat>> {
        self.chats.find_by_id(chat_id).await
    }

    pub async fn set_last_message(&self, chat_id: Uuid, message_id: Option<Uuid>) -> Result<()> {
        self.chats.set_last_message(chat_id, message_id).await
    }

    async fn find_group(&self, chat_id: Uuid) -> Result<Chat> {
        self.chats
            .find_by_id(chat_id)
            .await?
            .filter(|chat| chat.is_group_chat)
            .ok_or_else(|| AppError::NotFound("Group chat does not exist".to_string()))
    }

    /// Cascade: messages (and their files) first, then the chat, then notify.
    async fn remove_chat(&self, actor: Uuid, chat: Chat) -> Result<()> {
        let chat_id = chat.id;
        // Hydrated before deletion, the payload is all participants will ever see of it.
        let payload = self.hydrator.chat(chat).await?;

        let removed = self.messages.delete_by_chat(chat_id).await?;
        let files: Vec<_> = removed
            .iter()
            .flat_map(|m| m.attachments.0.iter().cloned())
            .collect();
        self.attachments.remove(&files).await;

        if !self.chats.delete(chat_id).await? {
            tracing::debug!("Chat {} was already gone when deleting", chat_id);
        }

        tracing::info!(
            "Chat {} deleted by {} ({} messages, {} attachments removed)",
            chat_id,
            actor,
            removed.len(),
            files.len()
        );

        self.ws_manager.broadcast_to_chat(
            &payload.participant_ids(),
            WsMessage::LeaveChat(payload),
            Some(actor),
        );

        Ok(())
    }
}
