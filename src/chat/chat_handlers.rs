use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    chat::{
        chat_dto::{CreateGroupChatRequest, RenameGroupChatRequest},
        chat_models::ChatResponse,
    },
    error::Result,
    middleware::AuthUser,
    state::AppState,
};

/// Get all chats of the authenticated user
#[utoipa::path(
    get,
    path = "/api/chats",
    tag = "chats",
    responses(
        (status = 200, description = "Chats, most recently active first", body = Vec<ChatResponse>),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn list_chats(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<impl IntoResponse> {
    let chats = state.chat_service.list_chats(user_id).await?;

    Ok((StatusCode::OK, Json(chats)))
}

/// Create or fetch the one-on-one chat with another user
#[utoipa::path(
    post,
    path = "/api/chats/c/{recipient_id}",
    tag = "chats",
    params(
        ("recipient_id" = Uuid, Path, description = "The other participant")
    ),
    responses(
        (status = 200, description = "Existing chat retrieved", body = ChatResponse),
        (status = 201, description = "Chat created", body = ChatResponse),
        (status = 400, description = "Cannot chat with yourself"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Receiver not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn create_or_get_direct_chat(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(recipient_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let chat = state
        .chat_service
        .create_or_get_direct_chat(user_id, recipient_id)
        .await?;

    let status = if chat.is_created() {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };

    Ok((status, Json(chat.into_inner())))
}

/// Delete the one-on-one chat with another user
#[utoipa::path(
    delete,
    path = "/api/chats/c/{recipient_id}",
    tag = "chats",
    params(
        ("recipient_id" = Uuid, Path, description = "The other participant")
    ),
    responses(
        (status = 204, description = "Chat and its messages deleted"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Chat not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn delete_direct_chat(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(recipient_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    state
        .chat_service
        .delete_direct_chat(user_id, recipient_id)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Create a group chat
#[utoipa::path(
    post,
    path = "/api/chats/group",
    tag = "chats",
    request_body = CreateGroupChatRequest,
    responses(
        (status = 201, description = "Group chat created successfully", body = ChatResponse),
        (status = 400, description = "Validation error"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Participant not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn create_group_chat(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<CreateGroupChatRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;

    let chat = state
        .chat_service
        .create_group_chat(user_id, payload.name, payload.participant_ids)
        .await?;

    Ok((StatusCode::CREATED, Json(chat)))
}

/// Get a group chat by ID
#[utoipa::path(
    get,
    path = "/api/chats/group/{chat_id}",
    tag = "chats",
    params(
        ("chat_id" = Uuid, Path, description = "Group chat ID")
    ),
    responses(
        (status = 200, description = "Group chat fetched successfully", body = ChatResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Group chat not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_group_chat(
    State(state): State<AppState>,
    AuthUser(_user_id): AuthUser,
    Path(chat_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let chat = state.chat_service.get_group_chat(chat_id).await?;

    Ok((StatusCode::OK, Json(chat)))
}

/// Rename a group chat (admin only)
#[utoipa::path(
    patch,
    path = "/api/chats/group/{chat_id}",
    tag = "chats",
    params(
        ("chat_id" = Uuid, Path, description = "Group chat ID")
    ),
    request_body = RenameGroupChatRequest,
    responses(
        (status = 200, description = "Group chat renamed", body = ChatResponse),
        (status = 400, description = "Validation error"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - Only the admin can rename"),
        (status = 404, description = "Group chat not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn rename_group_chat(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(chat_id): Path<Uuid>,
    Json(payload): Json<RenameGroupChatRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;

    let chat = state
        .chat_service
        .rename_group_chat(user_id, chat_id, payload.name)
        .await?;

    Ok((StatusCode::OK, Json(chat)))
}

/// Delete a group chat and all of its messages (admin only)
#[utoipa::path(
    delete,
    path = "/api/chats/group/{chat_id}",
    tag = "chats",
    params(
        ("chat_id" = Uuid, Path, description = "Group chat ID")
    ),
    responses(
        (status = 204, description = "Group chat deleted successfully"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - Only the admin can delete"),
        (status = 404, description = "Group chat not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn delete_group_chat(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(chat_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    state.chat_service.delete_chat(user_id, chat_id).await?;

    Ok(StatusCode::NO_CONTENT)
}
