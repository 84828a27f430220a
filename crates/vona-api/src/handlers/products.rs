//! Catalog maintenance handlers

use std::sync::Arc;

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;
use vona_core::ProductRecord;

use super::MessageResponse;
use crate::error::{ApiError, AppError};
use crate::state::AppState;

pub const PRODUCT_UPDATED_MESSAGE: &str = "Cập nhật sản phẩm thành công!";

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReindexResponse {
    /// Documents in the rebuilt index, order summaries included
    pub indexed: usize,
}

/// Reindex one changed product
#[utoipa::path(
    post,
    path = "/update-product",
    tag = "catalog",
    request_body = ProductRecord,
    responses(
        (status = 200, description = "Product reindexed", body = MessageResponse),
        (status = 400, description = "Invalid product", body = ApiError)
    )
)]
pub async fn update_product(
    State(state): State<Arc<AppState>>,
    Json(record): Json<ProductRecord>,
) -> Result<Json<MessageResponse>, AppError> {
    if record.uuid.trim().is_empty() {
        return Err(AppError::BadRequest("Product uuid is empty".to_string()));
    }

    state.chat.reindex_product(record.clone()).await?;

    if let Some(catalog) = &state.catalog {
        catalog.upsert_product(&record).await?;
        info!(
            uuid = %record.uuid,
            path = %catalog.products_path().display(),
            "Catalog file updated"
        );
    }

    Ok(Json(MessageResponse::new(PRODUCT_UPDATED_MESSAGE)))
}

/// Rebuild the whole index from a product batch
#[utoipa::path(
    post,
    path = "/reindex",
    tag = "catalog",
    request_body = Vec<ProductRecord>,
    responses(
        (status = 200, description = "Index rebuilt", body = ReindexResponse)
    )
)]
pub async fn reindex(
    State(state): State<Arc<AppState>>,
    Json(records): Json<Vec<ProductRecord>>,
) -> Result<Json<ReindexResponse>, AppError> {
    let indexed = state.chat.bootstrap_index(records).await?;
    Ok(Json(ReindexResponse { indexed }))
}
