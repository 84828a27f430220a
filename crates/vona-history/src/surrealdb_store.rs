//! SurrealDB implementation for conversation storage
//!
//! One record per shopper in the `conversation` table, keyed by user id.
//! Every write is a single `UPSERT` statement, so appends from concurrent
//! requests never overwrite each other.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use surrealdb::engine::remote::ws::{Client, Ws};
use surrealdb::opt::auth::Root;
use surrealdb::Surreal;
use tracing::debug;
use vona_core::{
    Conversation, ConversationStore, ConversationTurn, DatabaseConfig, Result, VonaError,
};

const TABLE: &str = "conversation";

/// SurrealDB conversation store implementation
pub struct SurrealConversationStore {
    client: Surreal<Client>,
}

impl SurrealConversationStore {
    /// Create a new SurrealDB connection
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        // The Ws engine adds the scheme itself
        let url = config
            .surrealdb_url
            .strip_prefix("ws://")
            .or_else(|| config.surrealdb_url.strip_prefix("wss://"))
            .unwrap_or(&config.surrealdb_url);

        let client = Surreal::new::<Ws>(url)
            .await
            .map_err(|e| VonaError::DatabaseError(format!("SurrealDB connection failed: {e}")))?;

        client
            .signin(Root {
                username: &config.surrealdb_user,
                password: &config.surrealdb_pass,
            })
            .await
            .map_err(|e| VonaError::DatabaseError(format!("SurrealDB auth failed: {e}")))?;

        client
            .use_ns(&config.surrealdb_namespace)
            .use_db(&config.surrealdb_database)
            .await
            .map_err(|e| VonaError::DatabaseError(format!("SurrealDB namespace error: {e}")))?;

        Ok(Self { client })
    }

    /// Initialize schema (run once on setup)
    pub async fn init_schema(&self) -> Result<()> {
        self.client
            .query(
                r#"
                DEFINE TABLE IF NOT EXISTS conversation SCHEMALESS;
                DEFINE INDEX IF NOT EXISTS idx_conversation_user ON conversation FIELDS user_id UNIQUE;
            "#,
            )
            .await
            .map_err(|e| VonaError::DatabaseError(format!("Schema init failed: {e}")))?;

        Ok(())
    }
}

/// Conversation record for SurrealDB
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConversationRecord {
    user_id: String,
    #[serde(default)]
    messages: Vec<ConversationTurn>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ConversationRecord> for Conversation {
    fn from(record: ConversationRecord) -> Self {
        Self {
            user_id: record.user_id,
            messages: record.messages,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[async_trait]
impl ConversationStore for SurrealConversationStore {
    async fn get_or_create(&self, user_id: &str) -> Result<Conversation> {
        let record: Option<ConversationRecord> = self
            .client
            .query(
                "UPSERT type::thing($table, $user_id) SET \
                 user_id = $user_id, \
                 messages = messages ?? [], \
                 created_at = created_at ?? $now, \
                 updated_at = updated_at ?? $now \
                 RETURN AFTER",
            )
            .bind(("table", TABLE))
            .bind(("user_id", user_id.to_string()))
            .bind(("now", Utc::now()))
            .await
            .map_err(|e| VonaError::DatabaseError(format!("Failed to load conversation: {e}")))?
            .take(0)
            .map_err(|e| VonaError::DatabaseError(format!("Result extraction failed: {e}")))?;

        record
            .map(Into::into)
            .ok_or_else(|| VonaError::DatabaseError("UPSERT returned no record".to_string()))
    }

    async fn get(&self, user_id: &str) -> Result<Option<Conversation>> {
        let record: Option<ConversationRecord> = self
            .client
            .select((TABLE, user_id))
            .await
            .map_err(|e| VonaError::DatabaseError(format!("Failed to get conversation: {e}")))?;

        Ok(record.map(Into::into))
    }

    async fn append(&self, user_id: &str, turn: ConversationTurn) -> Result<()> {
        let now = turn.timestamp;
        self.client
            .query(
                "UPSERT type::thing($table, $user_id) SET \
                 user_id = $user_id, \
                 messages = array::append(messages ?? [], $message), \
                 created_at = created_at ?? $now, \
                 updated_at = $now",
            )
            .bind(("table", TABLE))
            .bind(("user_id", user_id.to_string()))
            .bind(("message", turn))
            .bind(("now", now))
            .await
            .map_err(|e| VonaError::DatabaseError(format!("Failed to append message: {e}")))?
            .check()
            .map_err(|e| VonaError::DatabaseError(format!("Failed to append message: {e}")))?;

        debug!(user_id, "Turn appended");
        Ok(())
    }

    async fn delete(&self, user_id: &str) -> Result<bool> {
        let deleted: Option<ConversationRecord> = self
            .client
            .delete((TABLE, user_id))
            .await
            .map_err(|e| VonaError::DatabaseError(format!("Failed to delete conversation: {e}")))?;

        Ok(deleted.is_some())
    }
}
