//! Vona History - Conversation storage
//!
//! Keeps the message history of every shopper. The in-memory store serves
//! tests and single-process deployments; SurrealDB is used in production.

pub mod surrealdb_store;

pub use surrealdb_store::SurrealConversationStore;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;
use vona_core::{
    Conversation, ConversationBackend, ConversationStore, ConversationTurn, DatabaseConfig, Result,
};

/// Conversation store held in process memory
#[derive(Default)]
pub struct MemoryConversationStore {
    conversations: RwLock<HashMap<String, Conversation>>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored conversations
    pub async fn len(&self) -> usize {
        self.conversations.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn get_or_create(&self, user_id: &str) -> Result<Conversation> {
        if let Some(conversation) = self.conversations.read().await.get(user_id) {
            return Ok(conversation.clone());
        }

        let mut conversations = self.conversations.write().await;
        Ok(conversations
            .entry(user_id.to_string())
            .or_insert_with(|| Conversation::new(user_id))
            .clone())
    }

    async fn get(&self, user_id: &str) -> Result<Option<Conversation>> {
        Ok(self.conversations.read().await.get(user_id).cloned())
    }

    async fn append(&self, user_id: &str, turn: ConversationTurn) -> Result<()> {
        let mut conversations = self.conversations.write().await;
        let conversation = conversations
            .entry(user_id.to_string())
            .or_insert_with(|| Conversation::new(user_id));

        conversation.push(turn);
        conversation.updated_at = conversation.updated_at.max(Utc::now());
        debug!(user_id, messages = conversation.messages.len(), "Turn appended");
        Ok(())
    }

    async fn delete(&self, user_id: &str) -> Result<bool> {
        Ok(self.conversations.write().await.remove(user_id).is_some())
    }
}

/// Create the configured conversation store
pub async fn create_conversation_store(
    config: &DatabaseConfig,
) -> Result<Arc<dyn ConversationStore>> {
    match config.conversation_backend {
        ConversationBackend::Memory => Ok(Arc::new(MemoryConversationStore::new())),
        ConversationBackend::SurrealDb => {
            let store = SurrealConversationStore::new(config).await?;
            store.init_schema().await?;
            Ok(Arc::new(store))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vona_core::Sender;

    #[tokio::test]
    async fn test_get_or_create_is_lazy() {
        let store = MemoryConversationStore::new();
        assert!(store.get("u1").await.unwrap().is_none());

        let conversation = store.get_or_create("u1").await.unwrap();
        assert_eq!(conversation.user_id, "u1");
        assert!(conversation.messages.is_empty());
        assert!(store.get("u1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_append_upserts_and_keeps_order() {
        let store = MemoryConversationStore::new();
        store
            .append("u1", ConversationTurn::user("giá áo thun?"))
            .await
            .unwrap();
        store
            .append(
                "u1",
                ConversationTurn::bot("Áo thun giá 120.000đ", vec!["p-1".to_string()]),
            )
            .await
            .unwrap();

        let conversation = store.get("u1").await.unwrap().unwrap();
        assert_eq!(conversation.messages.len(), 2);
        assert_eq!(conversation.messages[0].sender, Sender::User);
        assert_eq!(conversation.messages[1].data, vec!["p-1".to_string()]);
        assert!(conversation.updated_at >= conversation.created_at);
    }

    #[tokio::test]
    async fn test_delete_reports_existence() {
        let store = MemoryConversationStore::new();
        assert!(!store.delete("u1").await.unwrap());

        store.append("u1", ConversationTurn::user("hi")).await.unwrap();
        assert!(store.delete("u1").await.unwrap());
        assert!(store.get("u1").await.unwrap().is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_concurrent_appends_are_not_lost() {
        let store = Arc::new(MemoryConversationStore::new());
        let handles: Vec<_> = (0..20)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .append("u1", ConversationTurn::user(format!("q{i}")))
                        .await
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(store.get("u1").await.unwrap().unwrap().messages.len(), 20);
    }
}
