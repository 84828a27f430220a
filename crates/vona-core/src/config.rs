//! Configuration Management
//!
//! Handles configuration from environment variables and TOML files
//! with sensible defaults for development.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Storage backends
    pub database: DatabaseConfig,

    /// LLM and embedding provider configuration
    pub llm: LlmConfig,

    /// RAG pipeline configuration
    pub rag: RagConfig,

    /// Catalog data files
    pub catalog: CatalogConfig,

    /// Token validation
    pub auth: AuthConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        // Server
        if let Ok(host) = std::env::var("API_HOST") {
            config.server.host = host;
        }
        if let Ok(port) = std::env::var("API_PORT") {
            config.server.port = port.parse().map_err(|_| ConfigError::InvalidValue {
                key: "API_PORT".to_string(),
                value: port,
            })?;
        }
        if let Ok(origins) = std::env::var("CORS_ORIGINS") {
            config.server.cors_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        // Vector index
        if let Ok(backend) = std::env::var("VECTOR_BACKEND") {
            config.database.vector_backend = backend.parse()?;
        }
        if let Ok(url) = std::env::var("QDRANT_URL") {
            config.database.qdrant_url = url;
        }
        if let Ok(collection) = std::env::var("QDRANT_COLLECTION") {
            config.database.qdrant_collection = collection;
        }

        // Conversations
        if let Ok(backend) = std::env::var("CONVERSATION_BACKEND") {
            config.database.conversation_backend = backend.parse()?;
        }
        if let Ok(url) = std::env::var("SURREALDB_URL") {
            config.database.surrealdb_url = url;
        }
        if let Ok(user) = std::env::var("SURREALDB_USER") {
            config.database.surrealdb_user = user;
        }
        if let Ok(pass) = std::env::var("SURREALDB_PASS") {
            config.database.surrealdb_pass = pass;
        }

        // Relational catalog
        if let Ok(url) = std::env::var("DATABASE_URL") {
            config.database.postgres_url = Some(url);
        }

        // LLM
        if let Ok(provider) = std::env::var("LLM_PROVIDER") {
            config.llm.provider = provider.parse()?;
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            config.llm.openai_api_key = Some(key);
        }
        if let Ok(key) = std::env::var("GOOGLE_API_KEY") {
            config.llm.google_api_key = Some(key);
        }
        if let Ok(url) = std::env::var("OLLAMA_URL") {
            config.llm.ollama_url = url;
        }
        if let Ok(model) = std::env::var("LLM_MODEL") {
            config.llm.model = model;
        }
        if let Ok(provider) = std::env::var("EMBEDDING_PROVIDER") {
            config.llm.embedding_provider = provider.parse()?;
        }
        if let Ok(model) = std::env::var("EMBEDDING_MODEL") {
            config.llm.embedding_model = model;
        }

        // Catalog files
        if let Ok(path) = std::env::var("PRODUCTS_PATH") {
            config.catalog.products_path = Some(PathBuf::from(path));
        }
        if let Ok(path) = std::env::var("ORDERS_PATH") {
            config.catalog.orders_path = Some(PathBuf::from(path));
        }
        if let Ok(path) = std::env::var("INDEX_PATH") {
            config.catalog.index_path = Some(PathBuf::from(path));
        }

        // Auth
        if let Ok(secret) = std::env::var("JWT_SECRET") {
            config.auth.jwt_secret = secret;
        }

        // Logging
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(json) = std::env::var("LOG_JSON") {
            config.logging.json_format = matches!(json.as_str(), "1" | "true" | "yes");
        }

        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        Self::from_toml_str(&content).map_err(|message| ConfigError::ParseError { path, message })
    }

    fn from_toml_str(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        let env_config = Self::from_env()?;
        let defaults = Self::default();

        // Only override if env values differ from defaults
        if env_config.server.host != defaults.server.host {
            self.server.host = env_config.server.host;
        }
        if env_config.server.port != defaults.server.port {
            self.server.port = env_config.server.port;
        }
        if env_config.llm.provider != defaults.llm.provider {
            self.llm.provider = env_config.llm.provider;
        }
        if env_config.database.postgres_url.is_some() {
            self.database.postgres_url = env_config.database.postgres_url;
        }

        // Always use env for sensitive values
        if env_config.llm.openai_api_key.is_some() {
            self.llm.openai_api_key = env_config.llm.openai_api_key;
        }
        if env_config.llm.google_api_key.is_some() {
            self.llm.google_api_key = env_config.llm.google_api_key;
        }
        if env_config.auth.jwt_secret != defaults.auth.jwt_secret {
            self.auth.jwt_secret = env_config.auth.jwt_secret;
        }
        if env_config.database.surrealdb_pass != defaults.database.surrealdb_pass {
            self.database.surrealdb_pass = env_config.database.surrealdb_pass;
        }

        Ok(self)
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Allowed origins for CORS, any origin when empty
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            cors_origins: vec![],
        }
    }
}

/// Storage backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Where the semantic index lives
    pub vector_backend: VectorBackend,

    /// Qdrant gRPC URL
    pub qdrant_url: String,

    /// Qdrant alias the index is served from
    pub qdrant_collection: String,

    /// Where conversation history lives
    pub conversation_backend: ConversationBackend,

    /// SurrealDB WebSocket URL
    pub surrealdb_url: String,

    /// SurrealDB username
    pub surrealdb_user: String,

    /// SurrealDB password
    pub surrealdb_pass: String,

    /// SurrealDB namespace
    pub surrealdb_namespace: String,

    /// SurrealDB database name
    pub surrealdb_database: String,

    /// PostgreSQL URL of the shop database (products and users)
    pub postgres_url: Option<String>,

    /// PostgreSQL connection pool size
    pub postgres_pool_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            vector_backend: VectorBackend::Memory,
            qdrant_url: "http://localhost:6334".to_string(),
            qdrant_collection: "products".to_string(),
            conversation_backend: ConversationBackend::Memory,
            surrealdb_url: "ws://localhost:8000".to_string(),
            surrealdb_user: "root".to_string(),
            surrealdb_pass: "root".to_string(),
            surrealdb_namespace: "vona".to_string(),
            surrealdb_database: "assistant".to_string(),
            postgres_url: None,
            postgres_pool_size: 5,
        }
    }
}

/// Semantic index storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    Memory,
    Qdrant,
}

impl std::str::FromStr for VectorBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "qdrant" => Ok(Self::Qdrant),
            _ => Err(ConfigError::InvalidValue {
                key: "VECTOR_BACKEND".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Conversation history storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationBackend {
    Memory,
    SurrealDb,
}

impl std::str::FromStr for ConversationBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "surrealdb" | "surreal" => Ok(Self::SurrealDb),
            _ => Err(ConfigError::InvalidValue {
                key: "CONVERSATION_BACKEND".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// LLM provider to use
    pub provider: LlmProvider,

    /// OpenAI API key
    pub openai_api_key: Option<String>,

    /// OpenAI API base URL (for Azure or compatible APIs)
    pub openai_base_url: Option<String>,

    /// Google Generative Language API key
    pub google_api_key: Option<String>,

    /// Ollama server URL
    pub ollama_url: String,

    /// Model name to use
    pub model: String,

    /// Embedding provider to use
    pub embedding_provider: EmbeddingProvider,

    /// Embedding model name
    pub embedding_model: String,

    /// Vector dimension for the hashing encoder
    pub embedding_dimension: usize,

    /// Maximum tokens for completion
    pub max_tokens: u32,

    /// Temperature for generation
    pub temperature: f32,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Gemini,
            openai_api_key: None,
            openai_base_url: None,
            google_api_key: None,
            ollama_url: "http://localhost:11434".to_string(),
            model: "gemini-2.0-flash".to_string(),
            embedding_provider: EmbeddingProvider::Hashing,
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_dimension: 384,
            max_tokens: 2048,
            temperature: 0.2,
            timeout_secs: 60,
        }
    }
}

/// Supported LLM providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    OpenAI,
    Ollama,
    Azure,
    Gemini,
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            "azure" => Ok(Self::Azure),
            "gemini" | "google" => Ok(Self::Gemini),
            _ => Err(ConfigError::InvalidValue {
                key: "LLM_PROVIDER".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Supported embedding providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    OpenAI,
    Ollama,
    /// Local feature-hashing encoder, no network access
    Hashing,
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            "hashing" | "local" => Ok(Self::Hashing),
            _ => Err(ConfigError::InvalidValue {
                key: "EMBEDDING_PROVIDER".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// RAG pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// Number of documents retrieved per question
    pub top_k: usize,

    /// Number of past exchanges replayed into the prompt
    pub max_turns: usize,

    /// Maximum length of the retrieved part of the context (characters)
    pub max_context_length: usize,

    /// Embedding batch size used by rebuilds
    pub batch_size: usize,

    /// Language the assistant answers in
    pub answer_language: String,

    /// Capacity of the query embedding cache
    pub embedding_cache_capacity: u64,

    /// Time-to-live of cached query embeddings (seconds)
    pub embedding_cache_ttl_secs: u64,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            top_k: 10,
            max_turns: 6,
            max_context_length: 8000,
            batch_size: 100,
            answer_language: "tiếng Việt".to_string(),
            embedding_cache_capacity: 10_000,
            embedding_cache_ttl_secs: 3600,
        }
    }
}

/// Catalog data files
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CatalogConfig {
    /// JSON export of the products
    pub products_path: Option<PathBuf>,

    /// JSON export of order line items
    pub orders_path: Option<PathBuf>,

    /// Snapshot file of the in-memory index
    pub index_path: Option<PathBuf>,
}

/// Token validation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC secret shared with the shop backend
    pub jwt_secret: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "development-secret-key-change-in-production".to_string(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

impl From<ConfigError> for crate::VonaError {
    fn from(err: ConfigError) -> Self {
        crate::VonaError::ConfigError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.rag.max_turns, 6);
        assert_eq!(config.rag.batch_size, 100);
        assert_eq!(config.database.vector_backend, VectorBackend::Memory);
        assert_eq!(config.llm.embedding_provider, EmbeddingProvider::Hashing);
    }

    #[test]
    fn test_provider_parse() {
        assert_eq!("openai".parse::<LlmProvider>().unwrap(), LlmProvider::OpenAI);
        assert_eq!("Gemini".parse::<LlmProvider>().unwrap(), LlmProvider::Gemini);
        assert!("invalid".parse::<LlmProvider>().is_err());

        assert_eq!(
            "surrealdb".parse::<ConversationBackend>().unwrap(),
            ConversationBackend::SurrealDb
        );
        assert_eq!("qdrant".parse::<VectorBackend>().unwrap(), VectorBackend::Qdrant);
        assert!("redis".parse::<VectorBackend>().is_err());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[server]
port = 9090

[rag]
top_k = 3

[llm]
provider = "ollama"
model = "qwen2.5"
"#
        )
        .unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.rag.top_k, 3);
        assert_eq!(config.rag.max_turns, 6);
        assert_eq!(config.llm.provider, LlmProvider::Ollama);
        assert_eq!(config.llm.model, "qwen2.5");
    }

    #[test]
    fn test_invalid_toml_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "server = [").unwrap();

        let err = AppConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }
}
