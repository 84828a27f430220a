//! Vona API - HTTP transport for the shopping assistant
//!
//! Exposes the chat service over axum: shopper chat and conversation
//! endpoints behind JWT auth, catalog maintenance endpoints, and health.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod services;
pub mod state;

pub use routes::{create_router, ApiDoc};
pub use services::Services;
pub use state::AppState;
