//! Vona RAG - Answer pipeline for product questions
//!
//! [`ChatService`] ties the pieces together:
//! question -> history + semantic retrieval -> context -> model -> normalized
//! answer -> conversation history.

pub mod cache;
pub mod context;
pub mod generator;
pub mod llm;
pub mod normalize;

pub use cache::{CacheStats, CacheStatsReport, CachedEmbedding};
pub use context::assemble_context;
pub use generator::{PromptBuilder, ResponseGenerator};
pub use llm::{create_llm_client, GeminiClient, OllamaClient, OpenAiClient};
pub use normalize::{normalize, normalize_response, Normalized};

use std::sync::Arc;

use tracing::{debug, info, warn};
use vona_core::{
    CatalogEntry, ConversationStore, ConversationTurn, LlmClient, ProductRecord, RagConfig,
    Result, StructuredResponse, UserDirectory, VonaError, NOT_FOUND_MESSAGE,
};
use vona_vector::SemanticIndex;

// ============================================================================
// Chat Service
// ============================================================================

/// Entry point for answering shopper questions
pub struct ChatService {
    index: Arc<SemanticIndex>,
    conversations: Arc<dyn ConversationStore>,
    generator: ResponseGenerator,
    users: Option<Arc<dyn UserDirectory>>,
    config: RagConfig,
}

impl ChatService {
    pub fn new(
        index: Arc<SemanticIndex>,
        conversations: Arc<dyn ConversationStore>,
        llm: Arc<dyn LlmClient>,
        config: RagConfig,
    ) -> Self {
        let generator = ResponseGenerator::new(llm).with_language(config.answer_language.clone());
        Self {
            index,
            conversations,
            generator,
            users: None,
            config,
        }
    }

    /// Reject users unknown to `users`
    pub fn with_user_directory(mut self, users: Arc<dyn UserDirectory>) -> Self {
        self.users = Some(users);
        self
    }

    pub fn index(&self) -> &Arc<SemanticIndex> {
        &self.index
    }

    pub fn conversations(&self) -> &Arc<dyn ConversationStore> {
        &self.conversations
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Whether `user_id` may use the assistant
    pub async fn is_authorized(&self, user_id: &str) -> Result<bool> {
        if user_id.trim().is_empty() {
            return Ok(false);
        }
        match &self.users {
            Some(users) => users.user_exists(user_id).await,
            None => Ok(true),
        }
    }

    /// Answer one question and record the exchange
    ///
    /// Exactly two turns are appended on success, including the not-found
    /// case. Nothing is appended for unauthorized callers, empty questions
    /// or generation failures.
    pub async fn handle_query(&self, user_id: &str, text: &str) -> Result<StructuredResponse> {
        if !self.is_authorized(user_id).await? {
            info!(user_id, "Rejected unauthorized query");
            return Ok(StructuredResponse::unauthorized());
        }

        let question = text.trim();
        if question.is_empty() {
            return Err(VonaError::ValidationError(
                "Question text is empty".to_string(),
            ));
        }

        info!(user_id, "Processing query");
        let conversation = self.conversations.get_or_create(user_id).await?;

        let retrieval = self.index.query(question, self.config.top_k).await?;
        if retrieval.is_empty() {
            debug!(user_id, "No relevant context");
            self.record(user_id, text, NOT_FOUND_MESSAGE.to_string(), Vec::new())
                .await?;
            return Ok(StructuredResponse::not_found());
        }

        let documents = retrieval.context_lines();
        debug!(
            documents = documents.len(),
            history = conversation.messages.len(),
            "Context retrieved"
        );
        let context = assemble_context(
            &conversation,
            &documents,
            self.config.max_turns,
            self.config.max_context_length,
        );

        let raw = self.generator.generate(question, &context).await?;

        let normalized = normalize(&raw);
        if let Normalized::Degraded { reason, .. } = &normalized {
            warn!(user_id, %reason, "Returning degraded answer");
        }
        let response = normalized.into_response();

        self.record(user_id, text, response.response.clone(), response.data.clone())
            .await?;

        info!(user_id, kind = %response.kind, data = response.data.len(), "Query answered");
        Ok(response)
    }

    /// Append the user turn, then the bot turn
    async fn record(
        &self,
        user_id: &str,
        question: &str,
        answer: String,
        data: Vec<String>,
    ) -> Result<()> {
        self.conversations
            .append(user_id, ConversationTurn::user(question))
            .await?;
        self.conversations
            .append(user_id, ConversationTurn::bot(answer, data))
            .await
    }

    /// Index a changed product without rebuilding
    pub async fn reindex_product(&self, record: ProductRecord) -> Result<()> {
        let uuid = record.uuid.clone();
        self.index.upsert(CatalogEntry::Product(record)).await?;
        info!(%uuid, "Product reindexed");
        Ok(())
    }

    /// Rebuild the index from `records` plus the loaded order summaries
    pub async fn bootstrap_index(&self, records: Vec<ProductRecord>) -> Result<usize> {
        let orders = self.index.order_book().await.summaries();
        let products = records.len();

        let entries: Vec<CatalogEntry> = records
            .into_iter()
            .map(CatalogEntry::Product)
            .chain(orders.into_iter().map(CatalogEntry::Order))
            .collect();

        let indexed = self.index.rebuild(entries).await?;
        info!(products, indexed, "Index bootstrapped");
        Ok(indexed)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use vona_core::{OrderLine, ResponseType, Sender, UNAUTHORIZED_MESSAGE};
    use vona_history::MemoryConversationStore;
    use vona_vector::{HashingEmbedding, MemoryVectorStore, OrderBook, Retrieval};

    const UUID_A: &str = "0c6f1d2e-7a41-4b8e-9d3c-5f2a1b0e9c77";
    const UUID_B: &str = "a9e3b7c1-2d4f-4e6a-8b0c-1d2e3f4a5b6c";

    /// LLM returning a fixed reply and recording prompts
    struct ScriptedLlm {
        reply: std::result::Result<String, String>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedLlm {
        fn replying(reply: impl Into<String>) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.into()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: Err("service unavailable".to_string()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }

        fn last_prompt(&self) -> String {
            self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn generate(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.reply.clone().map_err(VonaError::LlmError)
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    struct Directory(Vec<&'static str>);

    #[async_trait]
    impl UserDirectory for Directory {
        async fn user_exists(&self, user_id: &str) -> Result<bool> {
            Ok(self.0.iter().any(|known| *known == user_id))
        }
    }

    fn products() -> Vec<ProductRecord> {
        vec![
            ProductRecord::new(UUID_A, "sản phẩm A", 100000.0)
                .with_description("Áo thun cotton")
                .with_category("Thời trang"),
            ProductRecord::new(UUID_B, "Nồi cơm điện", 850000.0).with_category("Gia dụng"),
        ]
    }

    fn service(llm: Arc<ScriptedLlm>) -> (ChatService, Arc<MemoryConversationStore>) {
        let index = Arc::new(SemanticIndex::new(
            Arc::new(HashingEmbedding::default()),
            Arc::new(MemoryVectorStore::new()),
        ));
        let store = Arc::new(MemoryConversationStore::new());
        let service = ChatService::new(index, store.clone(), llm, RagConfig::default());
        (service, store)
    }

    fn answer_for_a() -> String {
        serde_json::json!({
            "response": format!("Sản phẩm A ({UUID_A}) có giá 100.000 VNĐ"),
            "data": [UUID_A],
            "type": "product",
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_end_to_end_price_question() {
        let llm = ScriptedLlm::replying(answer_for_a());
        let (service, store) = service(llm.clone());
        service.bootstrap_index(products()).await.unwrap();

        let response = service.handle_query("U1", "giá sản phẩm A").await.unwrap();

        assert_eq!(response.kind, ResponseType::Product);
        assert!(response.data.contains(&UUID_A.to_string()));
        assert!(!response.response.contains(UUID_A));

        let conversation = store.get("U1").await.unwrap().unwrap();
        assert_eq!(conversation.messages.len(), 2);
        assert_eq!(conversation.messages[0].sender, Sender::User);
        assert_eq!(conversation.messages[0].text, "giá sản phẩm A");
        assert_eq!(conversation.messages[1].sender, Sender::Bot);
        assert_eq!(conversation.messages[1].data, vec![UUID_A.to_string()]);

        let prompt = llm.last_prompt();
        assert!(prompt.contains("name: sản phẩm A"));
        assert!(prompt.contains("giá sản phẩm A"));
    }

    #[tokio::test]
    async fn test_history_is_replayed_into_next_prompt() {
        let llm = ScriptedLlm::replying(answer_for_a());
        let (service, _store) = service(llm.clone());
        service.bootstrap_index(products()).await.unwrap();

        service.handle_query("U1", "giá sản phẩm A").await.unwrap();
        service.handle_query("U1", "còn hàng không?").await.unwrap();

        let prompt = llm.last_prompt();
        assert!(prompt.contains("1. Người dùng hỏi: giá sản phẩm A"));
        assert!(prompt.contains("2. Bot Trả lời: Sản phẩm A có giá 100.000 VNĐ"));
    }

    #[tokio::test]
    async fn test_empty_index_answers_not_found_without_model() {
        let llm = ScriptedLlm::replying(answer_for_a());
        let (service, store) = service(llm.clone());

        let response = service.handle_query("U1", "giá sản phẩm A").await.unwrap();

        assert_eq!(response, StructuredResponse::not_found());
        assert_eq!(llm.calls(), 0);
        let conversation = store.get("U1").await.unwrap().unwrap();
        assert_eq!(conversation.messages.len(), 2);
        assert_eq!(conversation.messages[1].text, NOT_FOUND_MESSAGE);
    }

    #[tokio::test]
    async fn test_generation_failure_appends_nothing() {
        let (service, store) = service(ScriptedLlm::failing());
        service.bootstrap_index(products()).await.unwrap();

        let result = service.handle_query("U1", "giá sản phẩm A").await;

        assert!(matches!(result, Err(VonaError::LlmError(_))));
        let conversation = store.get("U1").await.unwrap();
        assert!(conversation.map_or(true, |c| c.messages.is_empty()));
    }

    #[tokio::test]
    async fn test_malformed_output_is_recorded_as_error() {
        let llm = ScriptedLlm::replying("Sản phẩm A giá 100.000 VNĐ");
        let (service, store) = service(llm);
        service.bootstrap_index(products()).await.unwrap();

        let response = service.handle_query("U1", "giá sản phẩm A").await.unwrap();

        assert_eq!(response.kind, ResponseType::Error);
        assert_eq!(response.response, "Sản phẩm A giá 100.000 VNĐ");
        let conversation = store.get("U1").await.unwrap().unwrap();
        assert_eq!(conversation.messages.len(), 2);
        assert!(conversation.messages[1].data.is_empty());
    }

    #[tokio::test]
    async fn test_unauthorized_has_no_side_effects() {
        let llm = ScriptedLlm::replying(answer_for_a());
        let (service, store) = service(llm.clone());
        let service = service.with_user_directory(Arc::new(Directory(vec!["U1"])));
        service.bootstrap_index(products()).await.unwrap();

        for user in ["", "   ", "U2"] {
            let response = service.handle_query(user, "giá sản phẩm A").await.unwrap();
            assert_eq!(response.kind, ResponseType::Unauthorized);
            assert_eq!(response.response, UNAUTHORIZED_MESSAGE);
        }

        assert_eq!(llm.calls(), 0);
        assert!(store.is_empty().await);
        assert!(service.handle_query("U1", "giá sản phẩm A").await.is_ok());
    }

    #[tokio::test]
    async fn test_empty_question_is_rejected() {
        let (service, store) = service(ScriptedLlm::replying("{}"));
        let result = service.handle_query("U1", "  ").await;

        assert!(matches!(result, Err(VonaError::ValidationError(_))));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_reindex_product_is_searchable() {
        let (service, _store) = service(ScriptedLlm::replying("{}"));
        service.bootstrap_index(products()).await.unwrap();

        let uuid = "5b1c2d3e-4f5a-4b6c-8d7e-9f0a1b2c3d4e";
        service
            .reindex_product(ProductRecord::new(uuid, "Máy xay sinh tố", 650000.0))
            .await
            .unwrap();

        let Retrieval::Products(hits) = service.index().query("Máy xay sinh tố", 3).await.unwrap()
        else {
            panic!("expected products");
        };
        assert_eq!(hits[0].id, uuid);
        assert_eq!(service.index().len().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_bootstrap_twice_is_idempotent() {
        let (service, _store) = service(ScriptedLlm::replying("{}"));

        service.bootstrap_index(products()).await.unwrap();
        let first = service.index().query("nồi cơm", 10).await.unwrap();

        service.bootstrap_index(products()).await.unwrap();
        let second = service.index().query("nồi cơm", 10).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(service.index().len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_order_question_uses_line_items() {
        let lines: Vec<OrderLine> = [("Áo thun", 2), ("Quần jean", 1)]
            .into_iter()
            .map(|(name, quantity)| OrderLine {
                order_uuid: "o-5521".to_string(),
                order_id: "5521".to_string(),
                status: "shipping".to_string(),
                total_amount: 590000.0,
                product_name: name.to_string(),
                quantity,
                item_total: 295000.0,
            })
            .collect();

        let llm = ScriptedLlm::replying(
            r#"{"response": "Đơn hàng 5521 đang được giao", "data": [], "type": "order"}"#,
        );
        let (service, _store) = service(llm.clone());
        service.index().set_order_book(OrderBook::new(lines)).await;
        let indexed = service.bootstrap_index(products()).await.unwrap();
        assert_eq!(indexed, 3);

        let response = service
            .handle_query("U1", "đơn hàng 5521 shipping")
            .await
            .unwrap();

        assert_eq!(response.kind, ResponseType::Order);
        let prompt = llm.last_prompt();
        assert!(prompt.contains(
            "order_id: 5521, status: shipping, total_amount: 590000, product: Áo thun, quantity: 2"
        ));
        assert!(prompt.contains("product: Quần jean, quantity: 1"));
    }
}
