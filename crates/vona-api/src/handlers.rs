//! HTTP request handlers

pub mod chat;
pub mod health;
pub mod products;

pub use chat::{chat, delete_conversation, get_conversation};
pub use health::{health_check, metrics, readiness_check};
pub use products::{reindex, update_product};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Plain confirmation message
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
