//! Chat and conversation handlers

use std::sync::Arc;

use axum::{extract::State, Extension, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;
use vona_core::{Conversation, ConversationTurn, Sender, StructuredResponse};

use super::MessageResponse;
use crate::auth::AuthUser;
use crate::error::{ApiError, AppError};
use crate::state::AppState;

/// Shopper question
#[derive(Debug, Deserialize, ToSchema)]
pub struct ChatRequest {
    pub text: String,
}

/// Answer shown to the shopper
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ChatResponse {
    /// Answer text, free of internal identifiers
    pub response: String,
    /// Product uuids referenced by the answer
    pub data: Vec<String>,
    /// One of `product`, `order`, `none`, `error`, `unauthorized`
    #[serde(rename = "type")]
    pub kind: String,
}

impl From<StructuredResponse> for ChatResponse {
    fn from(response: StructuredResponse) -> Self {
        Self {
            response: response.response,
            data: response.data,
            kind: response.kind.to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageBody {
    /// `user` or `bot`
    pub sender: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data: Vec<String>,
    #[schema(value_type = String)]
    pub timestamp: DateTime<Utc>,
}

impl From<ConversationTurn> for MessageBody {
    fn from(turn: ConversationTurn) -> Self {
        let sender = match turn.sender {
            Sender::User => "user",
            Sender::Bot => "bot",
        };
        Self {
            sender: sender.to_string(),
            text: turn.text,
            data: turn.data,
            timestamp: turn.timestamp,
        }
    }
}

/// Stored history of the caller
#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct ConversationResponse {
    pub messages: Vec<MessageBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<Conversation> for ConversationResponse {
    fn from(conversation: Conversation) -> Self {
        Self {
            messages: conversation
                .messages
                .into_iter()
                .map(MessageBody::from)
                .collect(),
            created_at: Some(conversation.created_at),
            updated_at: Some(conversation.updated_at),
        }
    }
}

/// Ask the assistant
///
/// A token without a user id gets the `unauthorized` answer rather than 401,
/// so storefront widgets can show it inline.
#[utoipa::path(
    post,
    path = "/chat",
    tag = "chat",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Assistant answer", body = ChatResponse),
        (status = 400, description = "Empty question", body = ApiError),
        (status = 401, description = "Missing or invalid token", body = ApiError),
        (status = 502, description = "Model provider failed", body = ApiError)
    ),
    security(("bearer" = []))
)]
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let Some(user_id) = user.user_id.as_deref() else {
        return Ok(Json(StructuredResponse::unauthorized().into()));
    };

    let response = state.chat.handle_query(user_id, &request.text).await?;
    Ok(Json(response.into()))
}

async fn known_user(state: &AppState, user: &AuthUser) -> Result<String, AppError> {
    let user_id = user.require()?;
    if !state.chat.is_authorized(user_id).await? {
        return Err(AppError::Unauthorized("User not found".to_string()));
    }
    Ok(user_id.to_string())
}

/// Fetch the caller's conversation
#[utoipa::path(
    get,
    path = "/chat/conversations",
    tag = "chat",
    responses(
        (status = 200, description = "Conversation history", body = ConversationResponse),
        (status = 401, description = "Unknown caller", body = ApiError)
    ),
    security(("bearer" = []))
)]
pub async fn get_conversation(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ConversationResponse>, AppError> {
    let user_id = known_user(&state, &user).await?;

    let body = match state.chat.conversations().get(&user_id).await? {
        Some(conversation) => ConversationResponse::from(conversation),
        None => ConversationResponse::default(),
    };
    Ok(Json(body))
}

/// Delete the caller's conversation
#[utoipa::path(
    delete,
    path = "/chat/conversations",
    tag = "chat",
    responses(
        (status = 200, description = "Deletion outcome", body = MessageResponse),
        (status = 401, description = "Unknown caller", body = ApiError)
    ),
    security(("bearer" = []))
)]
pub async fn delete_conversation(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<MessageResponse>, AppError> {
    let user_id = known_user(&state, &user).await?;

    let message = if state.chat.conversations().delete(&user_id).await? {
        info!(%user_id, "Conversation deleted");
        "Conversation deleted successfully"
    } else {
        "No conversation found to delete"
    };
    Ok(Json(MessageResponse::new(message)))
}
