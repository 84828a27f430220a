//! Catalog sources
//!
//! Products and order line items come either from JSON exports on disk or
//! straight from the shop's PostgreSQL database.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::{OrderLine, ProductRecord, ProductSource, Result, UserDirectory, VonaError};

// ============================================================================
// JSON files
// ============================================================================

/// Catalog backed by JSON export files
pub struct JsonCatalog {
    products_path: PathBuf,
    orders_path: Option<PathBuf>,
    /// Serializes read-modify-write cycles on the products file
    write_lock: Mutex<()>,
}

impl JsonCatalog {
    /// Create a catalog reading products from `products_path`
    pub fn new(products_path: impl Into<PathBuf>) -> Self {
        Self {
            products_path: products_path.into(),
            orders_path: None,
            write_lock: Mutex::new(()),
        }
    }

    /// Also read order line items from `orders_path`
    pub fn with_orders(mut self, orders_path: impl Into<PathBuf>) -> Self {
        self.orders_path = Some(orders_path.into());
        self
    }

    pub fn products_path(&self) -> &Path {
        &self.products_path
    }

    /// Load every product from the products file
    pub async fn load_products(&self) -> Result<Vec<ProductRecord>> {
        read_json_array(&self.products_path).await
    }

    /// Load every order line, empty when no orders file is configured
    pub async fn load_order_lines(&self) -> Result<Vec<OrderLine>> {
        match &self.orders_path {
            Some(path) => read_json_array(path).await,
            None => Ok(Vec::new()),
        }
    }

    /// Insert or replace a product in the products file
    ///
    /// A missing file is treated as an empty catalog.
    pub async fn upsert_product(&self, product: &ProductRecord) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut products: Vec<ProductRecord> = if tokio::fs::try_exists(&self.products_path)
            .await
            .unwrap_or(false)
        {
            read_json_array(&self.products_path).await?
        } else {
            Vec::new()
        };

        match products.iter_mut().find(|p| p.uuid == product.uuid) {
            Some(existing) => *existing = product.clone(),
            None => products.push(product.clone()),
        }

        let body = serde_json::to_vec_pretty(&products)
            .map_err(|e| VonaError::Other(anyhow::anyhow!("Failed to encode products: {e}")))?;

        let tmp = self.products_path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body).await.map_err(|e| {
            VonaError::DatabaseError(format!("Failed to write {}: {e}", tmp.display()))
        })?;
        tokio::fs::rename(&tmp, &self.products_path)
            .await
            .map_err(|e| {
                VonaError::DatabaseError(format!(
                    "Failed to replace {}: {e}",
                    self.products_path.display()
                ))
            })?;

        debug!(uuid = %product.uuid, total = products.len(), "Products file updated");
        Ok(())
    }
}

#[async_trait]
impl ProductSource for JsonCatalog {
    async fn fetch_products(&self) -> Result<Vec<ProductRecord>> {
        self.load_products().await
    }
}

async fn read_json_array<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => VonaError::NotFound(path.display().to_string()),
        _ => VonaError::DatabaseError(format!("Failed to read {}: {e}", path.display())),
    })?;

    serde_json::from_str(&content).map_err(|e| {
        VonaError::ValidationError(format!("Invalid JSON in {}: {e}", path.display()))
    })
}

// ============================================================================
// PostgreSQL
// ============================================================================

/// Catalog and user directory backed by the shop database
pub struct PgCatalog {
    pool: PgPool,
}

impl PgCatalog {
    /// Connect to the shop database
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| VonaError::DatabaseError(format!("PostgreSQL connection failed: {e}")))?;

        info!("Connected to shop database");
        Ok(Self { pool })
    }

    /// Create from an existing pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Product row joined with its category and aggregated attributes
#[derive(Debug, FromRow)]
struct ProductRow {
    uuid: String,
    name: String,
    description: String,
    new_price: f64,
    weight: f64,
    stock: i64,
    category: String,
    attributes: String,
}

impl From<ProductRow> for ProductRecord {
    fn from(row: ProductRow) -> Self {
        Self {
            uuid: row.uuid,
            name: row.name,
            description: row.description,
            price: row.new_price,
            weight: row.weight,
            stock: row.stock,
            category: row.category,
            attributes: row.attributes,
        }
    }
}

#[async_trait]
impl ProductSource for PgCatalog {
    async fn fetch_products(&self) -> Result<Vec<ProductRecord>> {
        let rows: Vec<ProductRow> = sqlx::query_as(
            r#"
            SELECT p.uuid::text AS uuid,
                   p.name,
                   COALESCE(p.description, '') AS description,
                   p.new_price::float8 AS new_price,
                   COALESCE(p.weight, 0)::float8 AS weight,
                   p.stock::int8 AS stock,
                   c.name AS category,
                   COALESCE(string_agg(concat_ws(': ', pa.name, pa.value), ' , '), '') AS attributes
            FROM products AS p
            JOIN categories AS c ON c.id = p.category_id
            LEFT JOIN product_attributes AS pa ON pa.product_id = p.id
            GROUP BY p.id, c.name
            ORDER BY p.uuid
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| VonaError::DatabaseError(e.to_string()))?;

        debug!(count = rows.len(), "Fetched products from database");
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[async_trait]
impl UserDirectory for PgCatalog {
    async fn user_exists(&self, user_id: &str) -> Result<bool> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE uuid::text = $1)")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| VonaError::DatabaseError(e.to_string()))
    }
}
