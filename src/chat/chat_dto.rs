use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateGroupChatRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    /// Other members; the creator is added implicitly and must not be listed.
    pub participant_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RenameGroupChatRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
}
