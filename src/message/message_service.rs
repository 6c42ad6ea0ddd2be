use std::sync::Arc;
use uuid::Uuid;

use crate::attachment::AttachmentStore;
use crate::chat::{chat_hydration::Hydrator, chat_models::Chat, chat_service::ChatService};
use crate::error::{AppError, Result};
use crate::message::message_dto::{SendMessage, MAX_CONTENT_CHARS};
use crate::message::message_models::{MessageResponse, MessageType, NewMessage};
use crate::message::message_repository::MessageStore;
use crate::websocket::{ConnectionManager, WsMessage};

#[derive(Clone)]
pub struct MessageService {
    repo: Arc<dyn MessageStore>,
    chat_service: ChatService,
    hydrator: Hydrator,
    attachments: AttachmentStore,
    ws_manager: ConnectionManager,
}

impl MessageService {
    pub fn new(
        repo: Arc<dyn MessageStore>,
        chat_service: ChatService,
        attachments: AttachmentStore,
        ws_manager: ConnectionManager,
    ) -> Self {
        let hydrator = chat_service.hydrator().clone();
        Self {
            repo,
            chat_service,
            hydrator,
            attachments,
            ws_manager,
        }
    }

    /// Persists a message and fans it out to the other participants.
    ///
    /// Uploaded files in `payload` are removed again if the message is never stored.
    /// Once stored, the files belong to the message whatever happens afterwards.
    pub async fn send_message(
        &self,
        sender_id: Uuid,
        chat_id: Uuid,
        payload: SendMessage,
    ) -> Result<MessageResponse> {
        let (chat, recipient_id) = match self.check_send(sender_id, chat_id, &payload).await {
            Ok(checked) => checked,
            Err(e) => {
                self.attachments.remove(&payload.attachments).await;
                return Err(e);
            }
        };

        let attachments = payload.attachments.clone();
        let message = match self
            .repo
            .insert(NewMessage {
                chat_id,
                sender_id,
                recipient_id,
                message_type: payload.message_type,
                content: payload.content,
                attachments: payload.attachments,
            })
            .await
        {
            Ok(message) => message,
            Err(e) => {
                self.attachments.remove(&attachments).await;
                return Err(e);
            }
        };

        // Advisory pointer: a failure here leaves it stale but the history intact.
        if let Err(e) = self.chat_service.set_last_message(chat_id, Some(message.id)).await {
            tracing::warn!("Failed to update last message of chat {}: {}", chat_id, e);
        }

        let message_id = message.id;
        let response = self.hydrator.message(message).await.map_err(|e| {
            tracing::error!("Message {} stored but could not be hydrated: {}", message_id, e);
            AppError::Internal(format!("Failed to load message {}", message_id))
        })?;

        let delivered = self.ws_manager.broadcast_to_chat(
            &chat.participants,
            WsMessage::MessageReceived(response.clone()),
            Some(sender_id),
        );

        tracing::debug!(
            "Message {} sent to chat {} by {} ({} live connections)",
            response.id,
            chat_id,
            sender_id,
            delivered
        );

        Ok(response)
    }

    /// Everything that may reject a send without side effects.
    async fn check_send(
        &self,
        sender_id: Uuid,
        chat_id: Uuid,
        payload: &SendMessage,
    ) -> Result<(Chat, Option<Uuid>)> {
        if payload.message_type == MessageType::Text && payload.content.trim().is_empty() {
            return Err(AppError::BadRequest("Message content is required".to_string()));
        }
        if payload.content.chars().count() > MAX_CONTENT_CHARS {
            return Err(AppError::BadRequest(format!(
                "Message content exceeds {} characters",
                MAX_CONTENT_CHARS
            )));
        }

        let chat = self.chat_service.require_participant(sender_id, chat_id).await?;
        let recipient_id = resolve_recipient(&chat, sender_id, payload.recipient)?;
        Ok((chat, recipient_id))
    }

    /// Messages of a chat, newest first. Only participants may read them.
    pub async fn retrieve_messages(&self, user_id: Uuid, chat_id: Uuid) -> Result<Vec<MessageResponse>> {
        self.chat_service.require_participant(user_id, chat_id).await?;
        let messages = self.repo.find_by_chat(chat_id).await?;
        self.hydrator.messages(messages).await
    }

    /// Deletes a message if it still exists. The sender or the chat admin may delete.
    pub async fn delete_message(&self, user_id: Uuid, message_id: Uuid) -> Result<()> {
        let Some(message) = self.repo.find_by_id(message_id).await? else {
            tracing::debug!("Message {} already absent", message_id);
            return Ok(());
        };

        let chat = self.chat_service.find_chat(message.chat_id).await?;
        let is_admin = chat.as_ref().map(|c| c.is_admin(user_id)).unwrap_or(false);
        if message.sender_id != user_id && !is_admin {
            return Err(AppError::Forbidden(
                "Only the sender or the chat admin can delete this message".to_string(),
            ));
        }

        let Some(removed) = self.repo.delete(message_id).await? else {
            return Ok(());
        };
        self.attachments.remove(&removed.attachments.0).await;

        if let Some(chat) = chat.filter(|c| c.last_message_id == Some(message_id)) {
            let latest = self.repo.find_latest(chat.id).await?;
            self.chat_service
                .set_last_message(chat.id, latest.map(|m| m.id))
                .await?;
        }

        tracing::info!("Message {} deleted by {}", message_id, user_id);
        Ok(())
    }
}

/// Participants are the recipient set; the stored recipient is only an addressing hint.
fn resolve_recipient(chat: &Chat, sender_id: Uuid, requested: Option<Uuid>) -> Result<Option<Uuid>> {
    match requested {
        Some(recipient) if recipient != sender_id && chat.has_participant(recipient) => {
            Ok(Some(recipient))
        }
        Some(_) => Err(AppError::BadRequest(
            "Recipient must be another participant of this chat".to_string(),
        )),
        None if !chat.is_group_chat => Ok(chat.others(sender_id).next()),
        None => Ok(None),
    }
}
