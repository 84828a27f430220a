//! API route definitions

use std::sync::Arc;

use axum::{
    http::HeaderValue,
    middleware,
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use vona_core::ProductRecord;

use crate::auth::{auth_middleware, track_requests};
use crate::error::ApiError;
use crate::handlers::{
    self,
    chat::{ChatRequest, ChatResponse, ConversationResponse, MessageBody},
    health::{HealthResponse, ReadinessResponse},
    products::ReindexResponse,
    MessageResponse,
};
use crate::state::AppState;

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Vona Shopping Assistant API",
        description = "Product question answering for the Vona storefront"
    ),
    paths(
        handlers::chat::chat,
        handlers::chat::get_conversation,
        handlers::chat::delete_conversation,
        handlers::products::update_product,
        handlers::products::reindex,
        handlers::health::health_check,
        handlers::health::readiness_check,
    ),
    components(schemas(
        ApiError,
        ChatRequest,
        ChatResponse,
        ConversationResponse,
        MessageBody,
        MessageResponse,
        ProductRecord,
        ReindexResponse,
        HealthResponse,
        ReadinessResponse,
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "chat", description = "Shopper chat and history"),
        (name = "catalog", description = "Index maintenance"),
        (name = "health", description = "Probes")
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Create the main application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let chat_routes = Router::new()
        .route("/chat", post(handlers::chat))
        .route(
            "/chat/conversations",
            get(handlers::get_conversation).delete(handlers::delete_conversation),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let catalog_routes = Router::new()
        .route("/update-product", post(handlers::update_product))
        .route("/reindex", post(handlers::reindex));

    let ops_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics))
        .route("/api-docs/openapi.json", get(openapi_json));

    Router::new()
        .merge(chat_routes)
        .merge(catalog_routes)
        .merge(ops_routes)
        .layer(middleware::from_fn_with_state(state.clone(), track_requests))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config.server.cors_origins))
        .with_state(state)
}

/// Any origin when none are configured
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if allowed.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(AllowOrigin::list(allowed))
    }
}
