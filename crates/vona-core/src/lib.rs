//! Vona Core - Domain models, traits, and shared types
//!
//! This crate defines the core abstractions used throughout the assistant:
//! - Catalog models (products, orders, indexed catalog entries)
//! - Conversation history models
//! - The structured response returned to shoppers
//! - Common error types
//! - Collaborator traits (LLM, conversation store, catalog sources)
//! - Configuration management

pub mod catalog;
pub mod config;

pub use catalog::{JsonCatalog, PgCatalog};
pub use config::{
    AppConfig, AuthConfig, CatalogConfig, ConfigError, ConversationBackend, DatabaseConfig,
    EmbeddingProvider, LlmConfig, LlmProvider, LoggingConfig, RagConfig, ServerConfig,
    VectorBackend,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for assistant operations
#[derive(Error, Debug)]
pub enum VonaError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Search error: {0}")]
    SearchError(String),

    #[error("Embedding error: {0}")]
    EmbeddingError(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, VonaError>;

// ============================================================================
// Catalog Models
// ============================================================================

/// A product as exported from the relational store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ProductRecord {
    /// Stable product identity
    pub uuid: String,

    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Current selling price
    #[serde(alias = "new_price")]
    pub price: f64,

    #[serde(default)]
    pub weight: f64,

    #[serde(default)]
    pub stock: i64,

    #[serde(default)]
    pub category: String,

    /// Free-text `key: value` pairs, comma separated
    #[serde(default)]
    pub attributes: String,
}

impl ProductRecord {
    /// Create a product with the required fields, everything else empty
    pub fn new(uuid: impl Into<String>, name: impl Into<String>, price: f64) -> Self {
        Self {
            uuid: uuid.into(),
            name: name.into(),
            description: String::new(),
            price,
            weight: 0.0,
            stock: 0,
            category: String::new(),
            attributes: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_attributes(mut self, attributes: impl Into<String>) -> Self {
        self.attributes = attributes.into();
        self
    }

    pub fn with_stock(mut self, stock: i64) -> Self {
        self.stock = stock;
        self
    }
}

/// One line item of an order, as found in the auxiliary order dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub order_uuid: String,
    pub order_id: String,
    pub status: String,
    pub total_amount: f64,
    pub product_name: String,
    pub quantity: i64,
    pub item_total: f64,
}

impl OrderLine {
    /// Render the line the way it is handed to the model
    pub fn context_line(&self) -> String {
        format!(
            "order_id: {}, status: {}, total_amount: {}, product: {}, quantity: {}, item_total: {}",
            self.order_id,
            self.status,
            self.total_amount,
            self.product_name,
            self.quantity,
            self.item_total
        )
    }
}

/// Order summary that gets embedded into the index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub order_uuid: String,
    pub order_id: String,
    pub status: String,
    pub total_amount: f64,
    /// Product names on the order, comma separated
    pub products: String,
}

/// Metadata of an indexed document
///
/// Products are answered from their own text. Orders are resolved to their
/// full line-item set at query time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CatalogEntry {
    Product(ProductRecord),
    Order(OrderRecord),
}

impl CatalogEntry {
    /// Identity of the document built from this entry
    pub fn id(&self) -> &str {
        match self {
            Self::Product(p) => &p.uuid,
            Self::Order(o) => &o.order_uuid,
        }
    }

    /// Flattened `field: value` text used to produce the embedding
    pub fn flatten(&self) -> String {
        let fields: Vec<(&str, String)> = match self {
            Self::Product(p) => vec![
                ("uuid", p.uuid.clone()),
                ("name", p.name.clone()),
                ("description", p.description.clone()),
                ("price", p.price.to_string()),
                ("weight", p.weight.to_string()),
                ("stock", p.stock.to_string()),
                ("category", p.category.clone()),
                ("attributes", p.attributes.clone()),
            ],
            Self::Order(o) => vec![
                ("type", "order".to_string()),
                ("order_uuid", o.order_uuid.clone()),
                ("order_id", o.order_id.clone()),
                ("status", o.status.clone()),
                ("total_amount", o.total_amount.to_string()),
                ("products", o.products.clone()),
            ],
        };

        fields
            .into_iter()
            .map(|(k, v)| format!("{k}: {v}"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn is_order(&self) -> bool {
        matches!(self, Self::Order(_))
    }
}

impl From<ProductRecord> for CatalogEntry {
    fn from(product: ProductRecord) -> Self {
        Self::Product(product)
    }
}

impl From<OrderRecord> for CatalogEntry {
    fn from(order: OrderRecord) -> Self {
        Self::Order(order)
    }
}

// ============================================================================
// Conversation Models
// ============================================================================

/// Author of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

/// One message in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub sender: Sender,
    pub text: String,
    /// Product uuids attached to a bot turn, empty for user turns
    #[serde(default)]
    pub data: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    /// A shopper message
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::User,
            text: text.into(),
            data: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    /// An assistant reply with the products it referenced
    pub fn bot(text: impl Into<String>, data: Vec<String>) -> Self {
        Self {
            sender: Sender::Bot,
            text: text.into(),
            data,
            timestamp: Utc::now(),
        }
    }
}

/// The full message history of one shopper
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub user_id: String,
    pub messages: Vec<ConversationTurn>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Create an empty conversation
    pub fn new(user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.into(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a turn and refresh `updated_at`
    pub fn push(&mut self, turn: ConversationTurn) {
        self.updated_at = turn.timestamp.max(self.updated_at);
        self.messages.push(turn);
    }
}

// ============================================================================
// Structured Response
// ============================================================================

/// Reply shown for questions without any retrieved context
pub const NOT_FOUND_MESSAGE: &str =
    "Xin lỗi, tôi không tìm thấy thông tin liên quan đến câu hỏi của bạn.";

/// Reply shown when the caller has no usable identity
pub const UNAUTHORIZED_MESSAGE: &str = "Bạn cần đăng nhập để sử dụng trợ lý AI.";

/// Kind of answer returned to the shopper
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    Product,
    Order,
    #[default]
    None,
    Error,
    Unauthorized,
}

impl ResponseType {
    /// Match a model-produced label against the known kinds
    pub fn parse_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "product" | "products" => Some(Self::Product),
            "order" | "orders" => Some(Self::Order),
            "none" => Some(Self::None),
            "error" => Some(Self::Error),
            "unauthorized" => Some(Self::Unauthorized),
            _ => None,
        }
    }
}

impl std::fmt::Display for ResponseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Product => write!(f, "product"),
            Self::Order => write!(f, "order"),
            Self::None => write!(f, "none"),
            Self::Error => write!(f, "error"),
            Self::Unauthorized => write!(f, "unauthorized"),
        }
    }
}

/// Answer returned to the shopper
///
/// `response` never carries internal identifiers; referenced products are
/// listed in `data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredResponse {
    pub response: String,
    pub data: Vec<String>,
    #[serde(rename = "type")]
    pub kind: ResponseType,
}

impl StructuredResponse {
    pub fn new(response: impl Into<String>, data: Vec<String>, kind: ResponseType) -> Self {
        Self {
            response: response.into(),
            data,
            kind,
        }
    }

    /// Fixed reply for questions without retrieved context
    pub fn not_found() -> Self {
        Self::new(NOT_FOUND_MESSAGE, Vec::new(), ResponseType::None)
    }

    /// Fixed reply for callers without identity
    pub fn unauthorized() -> Self {
        Self::new(UNAUTHORIZED_MESSAGE, Vec::new(), ResponseType::Unauthorized)
    }

    /// Model output that could not be parsed, kept verbatim
    pub fn degraded(raw: impl Into<String>) -> Self {
        Self::new(raw, Vec::new(), ResponseType::Error)
    }
}

// ============================================================================
// Traits
// ============================================================================

/// Trait for generative model clients
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    /// Generate a reply for a single prompt
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Provider name for logging
    fn name(&self) -> &str;
}

/// Per-user conversation history storage
///
/// Implementations make every `append` atomic for a given user id, so turns
/// appended in order are stored in order.
#[async_trait::async_trait]
pub trait ConversationStore: Send + Sync {
    /// Fetch the conversation, creating an empty one if absent
    async fn get_or_create(&self, user_id: &str) -> Result<Conversation>;

    /// Fetch the conversation without creating it
    async fn get(&self, user_id: &str) -> Result<Option<Conversation>>;

    /// Append a turn, creating the conversation if absent
    async fn append(&self, user_id: &str, turn: ConversationTurn) -> Result<()>;

    /// Delete the whole conversation; `false` if there was none
    async fn delete(&self, user_id: &str) -> Result<bool>;
}

/// Source of canonical product records
#[async_trait::async_trait]
pub trait ProductSource: Send + Sync {
    async fn fetch_products(&self) -> Result<Vec<ProductRecord>>;
}

/// Lookup of registered shoppers
#[async_trait::async_trait]
pub trait UserDirectory: Send + Sync {
    async fn user_exists(&self, user_id: &str) -> Result<bool>;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_product() -> ProductRecord {
        ProductRecord::new("p-1", "Áo thun", 120000.0)
            .with_description("Áo thun cotton")
            .with_category("Thời trang")
            .with_attributes("Màu: Đỏ , Size: M")
            .with_stock(5)
    }

    #[test]
    fn test_product_flatten_contains_fields_in_order() {
        let text = CatalogEntry::from(sample_product()).flatten();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "uuid: p-1");
        assert_eq!(lines[1], "name: Áo thun");
        assert_eq!(lines[3], "price: 120000");
        assert_eq!(lines[7], "attributes: Màu: Đỏ , Size: M");
    }

    #[test]
    fn test_catalog_entry_tagging() {
        let order = CatalogEntry::Order(OrderRecord {
            order_uuid: "o-1".to_string(),
            order_id: "1001".to_string(),
            status: "shipped".to_string(),
            total_amount: 300000.0,
            products: "Áo thun".to_string(),
        });

        let value = serde_json::to_value(&order).unwrap();
        assert_eq!(value["type"], "order");
        assert_eq!(order.id(), "o-1");
        assert!(order.is_order());

        let back: CatalogEntry = serde_json::from_value(value).unwrap();
        assert_eq!(back, order);
    }

    #[test]
    fn test_product_accepts_new_price_alias() {
        let product: ProductRecord = serde_json::from_str(
            r#"{"uuid": "p-2", "name": "Quần jean", "new_price": 350000}"#,
        )
        .unwrap();
        assert_eq!(product.price, 350000.0);
        assert!(product.attributes.is_empty());
    }

    #[test]
    fn test_order_line_context() {
        let line = OrderLine {
            order_uuid: "o-1".to_string(),
            order_id: "1001".to_string(),
            status: "pending".to_string(),
            total_amount: 250000.0,
            product_name: "Áo thun".to_string(),
            quantity: 2,
            item_total: 240000.0,
        };
        assert_eq!(
            line.context_line(),
            "order_id: 1001, status: pending, total_amount: 250000, product: Áo thun, quantity: 2, item_total: 240000"
        );
    }

    #[test]
    fn test_conversation_push_updates_timestamp() {
        let mut conversation = Conversation::new("u1");
        let created = conversation.created_at;
        conversation.push(ConversationTurn::user("xin chào"));

        assert_eq!(conversation.messages.len(), 1);
        assert!(conversation.updated_at >= created);
        assert_eq!(conversation.messages[0].sender, Sender::User);
        assert!(conversation.messages[0].data.is_empty());
    }

    #[test]
    fn test_structured_response_serializes_type_field() {
        let value = serde_json::to_value(StructuredResponse::not_found()).unwrap();
        assert_eq!(value["type"], "none");
        assert_eq!(value["data"], serde_json::json!([]));
        assert_eq!(value["response"], NOT_FOUND_MESSAGE);
    }

    #[test]
    fn test_response_type_labels() {
        assert_eq!(ResponseType::parse_label("Product"), Some(ResponseType::Product));
        assert_eq!(ResponseType::parse_label(" order "), Some(ResponseType::Order));
        assert_eq!(ResponseType::parse_label("recommendation"), None);
        assert_eq!(ResponseType::Unauthorized.to_string(), "unauthorized");
    }
}
