//! Response generation
//!
//! Wraps an [`LlmClient`] with the instruction contract asking for a JSON
//! answer. The reply is returned untouched; see [`crate::normalize`].

use std::sync::Arc;

use tracing::debug;
use vona_core::{LlmClient, Result};

/// Object the model is told to return when nothing in the context helps
pub const FALLBACK_OBJECT: &str =
    r#"{"response": "Xin lỗi, tôi không tìm thấy thông tin phù hợp.", "data": [], "type": "none"}"#;

const EXAMPLE_OBJECT: &str = r#"{"response": "Sản phẩm A có giá 100.000 VNĐ và sản phẩm B có giá 200.000 VNĐ", "data": ["uuid1", "uuid2"], "type": "product"}"#;

// ============================================================================
// Prompt Builder
// ============================================================================

/// Builder for tagged prompts
#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    system_instruction: String,
    context_sections: Vec<String>,
    question: String,
    instructions: Vec<String>,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set system instruction
    pub fn system(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = instruction.into();
        self
    }

    /// Add a context section
    pub fn add_context(mut self, context: impl Into<String>) -> Self {
        self.context_sections.push(context.into());
        self
    }

    /// Set the question
    pub fn question(mut self, q: impl Into<String>) -> Self {
        self.question = q.into();
        self
    }

    /// Add an instruction
    pub fn add_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instructions.push(instruction.into());
        self
    }

    /// Build the final prompt
    pub fn build(self) -> String {
        let mut prompt = String::new();

        if !self.system_instruction.is_empty() {
            prompt.push_str("<s>\n");
            prompt.push_str(&self.system_instruction);
            prompt.push_str("\n</s>\n\n");
        }

        if !self.context_sections.is_empty() {
            prompt.push_str("<context>\n");
            for section in &self.context_sections {
                prompt.push_str(section);
                prompt.push('\n');
            }
            prompt.push_str("</context>\n\n");
        }

        if !self.question.is_empty() {
            prompt.push_str("<question>\n");
            prompt.push_str(&self.question);
            prompt.push_str("\n</question>\n\n");
        }

        if !self.instructions.is_empty() {
            prompt.push_str("<instructions>\n");
            for (i, inst) in self.instructions.iter().enumerate() {
                prompt.push_str(&format!("{}. {}\n", i + 1, inst));
            }
            prompt.push_str("</instructions>\n");
        }

        prompt
    }
}

// ============================================================================
// Response Generator
// ============================================================================

/// Generator producing raw model replies for a question and its context
pub struct ResponseGenerator {
    llm: Arc<dyn LlmClient>,
    language: String,
}

impl ResponseGenerator {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            language: "tiếng Việt".to_string(),
        }
    }

    /// Language the answer must be written in
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// The full instruction sent to the model
    pub fn build_prompt(&self, query: &str, context: &str) -> String {
        let language = &self.language;

        PromptBuilder::new()
            .system(format!(
                "Bạn là trợ lý bán hàng của một sàn thương mại điện tử. \
                 Chỉ dựa trên thông tin sản phẩm và lịch sử trò chuyện trong <context>, \
                 hãy trả lời câu hỏi trong <question> bằng {language}."
            ))
            .add_context(context)
            .question(query)
            .add_instruction(
                "Chỉ trả về một object JSON hợp lệ với đúng ba trường: \"response\", \"data\", \"type\".",
            )
            .add_instruction(format!(
                "\"response\": câu trả lời thân thiện, ngắn gọn, dễ hiểu bằng {language}. \
                 Nếu câu hỏi không liên quan tới sản phẩm, hãy trả lời thân thiện rồi hỏi người dùng về sản phẩm họ quan tâm."
            ))
            .add_instruction(
                "Không được đưa uuid, user_id hay bất kỳ mã định danh nội bộ nào vào \"response\".",
            )
            .add_instruction(
                "\"data\": mảng uuid của mọi sản phẩm được nhắc tới; uuid chỉ được xuất hiện ở trường này.",
            )
            .add_instruction(
                "\"type\": loại thông tin trả về, một trong \"product\", \"order\", \"none\".",
            )
            .add_instruction(format!("Ví dụ: {EXAMPLE_OBJECT}"))
            .add_instruction(format!(
                "Nếu không có thông tin liên quan, trả về đúng object: {FALLBACK_OBJECT}"
            ))
            .add_instruction("Không trả thêm bất kỳ nội dung nào khác ngoài object JSON.")
            .build()
    }

    /// Ask the model; errors from the client propagate unchanged
    pub async fn generate(&self, query: &str, context: &str) -> Result<String> {
        let prompt = self.build_prompt(query, context);
        debug!(
            llm = self.llm.name(),
            prompt_chars = prompt.chars().count(),
            "Calling generator"
        );
        self.llm.generate(&prompt).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use vona_core::VonaError;

    struct RecordingLlm {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LlmClient for RecordingLlm {
        async fn generate(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok("{}".to_string())
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    struct FailingLlm;

    #[async_trait]
    impl LlmClient for FailingLlm {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            Err(VonaError::LlmError("unreachable".to_string()))
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    #[test]
    fn test_prompt_builder() {
        let prompt = PromptBuilder::new()
            .system("You are a helpful assistant.")
            .add_context("name: A")
            .question("What is the answer?")
            .add_instruction("Be concise")
            .add_instruction("Return JSON")
            .build();

        assert!(prompt.starts_with("<s>\nYou are a helpful assistant."));
        assert!(prompt.contains("<context>\nname: A\n</context>"));
        assert!(prompt.contains("<question>\nWhat is the answer?\n</question>"));
        assert!(prompt.contains("2. Return JSON"));
    }

    #[test]
    fn test_prompt_embeds_context_query_and_contract() {
        let generator = ResponseGenerator::new(Arc::new(FailingLlm));
        let context = "1. Người dùng hỏi: xin chào\n\nuuid: p-1\nname: Áo thun";
        let prompt = generator.build_prompt("giá áo thun?", context);

        assert!(prompt.contains(context));
        assert!(prompt.contains("giá áo thun?"));
        assert!(prompt.contains("\"response\", \"data\", \"type\""));
        assert!(prompt.contains(FALLBACK_OBJECT));
        assert!(prompt.contains("bằng tiếng Việt"));
    }

    #[test]
    fn test_language_is_configurable() {
        let generator = ResponseGenerator::new(Arc::new(FailingLlm)).with_language("English");
        assert!(generator.build_prompt("q", "c").contains("bằng English"));
    }

    #[tokio::test]
    async fn test_generate_passes_prompt_through() {
        let llm = Arc::new(RecordingLlm {
            prompts: Mutex::new(Vec::new()),
        });
        let generator = ResponseGenerator::new(llm.clone());

        assert_eq!(generator.generate("q", "ctx").await.unwrap(), "{}");
        assert_eq!(llm.prompts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_generate_propagates_failure() {
        let generator = ResponseGenerator::new(Arc::new(FailingLlm));
        assert!(matches!(
            generator.generate("q", "ctx").await,
            Err(VonaError::LlmError(_))
        ));
    }
}
