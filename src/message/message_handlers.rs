use axum::{
    extract::{multipart::MultipartError, FromRequest, Multipart, Path, Request, State},
    http::{header::CONTENT_TYPE, StatusCode},
    response::IntoResponse,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::{AppError, Result},
    message::{
        message_dto::{SendMessage, SendMessageRequest, MAX_CONTENT_CHARS},
        message_models::MessageResponse,
    },
    middleware::AuthUser,
    state::AppState,
};

/// List messages of a chat, newest first
#[utoipa::path(
    get,
    path = "/api/messages/{chat_id}",
    tag = "messages",
    params(
        ("chat_id" = Uuid, Path, description = "Chat to read messages from")
    ),
    responses(
        (status = 200, description = "Messages, newest first", body = Vec<MessageResponse>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - Not a participant"),
        (status = 404, description = "Chat not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_messages(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(chat_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let messages = state
        .message_service
        .retrieve_messages(user_id, chat_id)
        .await?;

    Ok((StatusCode::OK, Json(messages)))
}

/// Send a message to a chat
///
/// Accepts either a JSON body or `multipart/form-data` with the same fields plus
/// up to `MAX_ATTACHMENTS` files under `attachments`.
#[utoipa::path(
    post,
    path = "/api/messages/{chat_id}",
    tag = "messages",
    params(
        ("chat_id" = Uuid, Path, description = "Chat to send to")
    ),
    request_body = SendMessageRequest,
    responses(
        (status = 201, description = "Message sent successfully", body = MessageResponse),
        (status = 400, description = "Invalid input"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - Not a participant"),
        (status = 404, description = "Chat not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn send_message(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(chat_id): Path<Uuid>,
    request: Request,
) -> Result<impl IntoResponse> {
    let is_multipart = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("multipart/form-data"))
        .unwrap_or(false);

    let payload = if is_multipart {
        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;
        read_multipart(&state, multipart).await?
    } else {
        let Json(payload) = Json::<SendMessageRequest>::from_request(request, &state)
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;
        payload.validate()?;
        SendMessage::from(payload)
    };

    let message = state
        .message_service
        .send_message(user_id, chat_id, payload)
        .await?;

    Ok((StatusCode::CREATED, Json(message)))
}

/// Delete a message (sender or chat admin)
#[utoipa::path(
    delete,
    path = "/api/messages/{message_id}",
    tag = "messages",
    params(
        ("message_id" = Uuid, Path, description = "Message ID to delete")
    ),
    responses(
        (status = 204, description = "Message deleted (or already absent)"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - Not the sender or chat admin")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn delete_message(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(message_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    state
        .message_service
        .delete_message(user_id, message_id)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

async fn read_multipart(state: &AppState, mut multipart: Multipart) -> Result<SendMessage> {
    let mut payload = SendMessage::default();
    if let Err(e) = fill_from_multipart(state, &mut multipart, &mut payload).await {
        state.attachment_store.remove(&payload.attachments).await;
        return Err(e);
    }
    Ok(payload)
}

async fn fill_from_multipart(
    state: &AppState,
    multipart: &mut Multipart,
    payload: &mut SendMessage,
) -> Result<()> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "recipient" => {
                let text = field.text().await.map_err(multipart_error)?;
                let text = text.trim();
                if !text.is_empty() {
                    let recipient = Uuid::parse_str(text)
                        .map_err(|_| AppError::BadRequest("Invalid recipient id".to_string()))?;
                    payload.recipient = Some(recipient);
                }
            }
            "message_type" | "messageType" => {
                payload.message_type = field.text().await.map_err(multipart_error)?.parse()?;
            }
            "content" => {
                let content = field.text().await.map_err(multipart_error)?;
                if content.chars().count() > MAX_CONTENT_CHARS {
                    return Err(AppError::BadRequest(format!(
                        "Message content exceeds {} characters",
                        MAX_CONTENT_CHARS
                    )));
                }
                payload.content = content;
            }
            "attachments" => {
                if payload.attachments.len() >= state.config.max_attachments {
                    return Err(AppError::BadRequest(format!(
                        "At most {} attachments are allowed",
                        state.config.max_attachments
                    )));
                }
                let file_name = field.file_name().map(str::to_string);
                let data = field.bytes().await.map_err(multipart_error)?;
                let attachment = state
                    .attachment_store
                    .save(file_name.as_deref(), &data)
                    .await?;
                payload.attachments.push(attachment);
            }
            other => tracing::debug!("Ignoring unknown multipart field {:?}", other),
        }
    }

    Ok(())
}

fn multipart_error(e: MultipartError) -> AppError {
    AppError::BadRequest(format!("Multipart error: {}", e))
}
