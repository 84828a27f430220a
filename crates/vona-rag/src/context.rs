//! Context assembly
//!
//! Merges the tail of the conversation with retrieved documents into the
//! single text block handed to the generator.

use vona_core::{Conversation, ConversationTurn, Sender};

const USER_LABEL: &str = "Người dùng hỏi";
const BOT_LABEL: &str = "Bot Trả lời";

/// Render the last `max_turns` exchanges, numbered by their position in the
/// full history (1-based)
pub fn render_history(messages: &[ConversationTurn], max_turns: usize) -> String {
    let keep = messages.len().min(max_turns.saturating_mul(2));
    let start = messages.len() - keep;

    messages[start..]
        .iter()
        .enumerate()
        .map(|(offset, turn)| {
            let label = match turn.sender {
                Sender::User => USER_LABEL,
                Sender::Bot => BOT_LABEL,
            };
            format!("{}. {}: {}", start + offset + 1, label, turn.text)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Join documents while their total length stays within `max_chars`
///
/// The first document is always kept.
pub fn join_documents(documents: &[String], max_chars: usize) -> String {
    let mut used = 0;
    let mut kept: Vec<&str> = Vec::with_capacity(documents.len());

    for (i, doc) in documents.iter().enumerate() {
        let cost = doc.chars().count() + usize::from(i > 0);
        if i > 0 && used + cost > max_chars {
            break;
        }
        used += cost;
        kept.push(doc);
    }

    kept.join("\n")
}

/// Build the generation context from history and retrieved documents
pub fn assemble_context(
    conversation: &Conversation,
    documents: &[String],
    max_turns: usize,
    max_chars: usize,
) -> String {
    let history = render_history(&conversation.messages, max_turns);
    let docs = join_documents(documents, max_chars);

    if history.is_empty() {
        docs
    } else {
        format!("{history}\n\n{docs}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversation_with(count: usize) -> Conversation {
        let mut conversation = Conversation::new("u1");
        for i in 0..count {
            let turn = if i % 2 == 0 {
                ConversationTurn::user(format!("câu hỏi {i}"))
            } else {
                ConversationTurn::bot(format!("trả lời {i}"), vec![])
            };
            conversation.push(turn);
        }
        conversation
    }

    #[test]
    fn test_numbering_starts_at_true_position() {
        let conversation = conversation_with(10);
        let history = render_history(&conversation.messages, 3);
        let lines: Vec<&str> = history.lines().collect();

        assert_eq!(lines.len(), 6);
        assert_eq!(lines[0], "5. Người dùng hỏi: câu hỏi 4");
        assert_eq!(lines[5], "10. Bot Trả lời: trả lời 9");
    }

    #[test]
    fn test_short_history_is_kept_whole() {
        let conversation = conversation_with(3);
        let history = render_history(&conversation.messages, 6);
        assert!(history.starts_with("1. Người dùng hỏi: câu hỏi 0"));
        assert_eq!(history.lines().count(), 3);
    }

    #[test]
    fn test_zero_turns_renders_nothing() {
        let conversation = conversation_with(4);
        assert!(render_history(&conversation.messages, 0).is_empty());
    }

    #[test]
    fn test_separator_only_with_history() {
        let docs = vec!["name: A".to_string(), "name: B".to_string()];

        let empty = Conversation::new("u1");
        assert_eq!(assemble_context(&empty, &docs, 6, 8000), "name: A\nname: B");

        let conversation = conversation_with(2);
        let context = assemble_context(&conversation, &docs, 6, 8000);
        assert_eq!(
            context,
            "1. Người dùng hỏi: câu hỏi 0\n2. Bot Trả lời: trả lời 1\n\nname: A\nname: B"
        );
    }

    #[test]
    fn test_documents_are_bounded_but_first_is_kept() {
        let docs = vec!["a".repeat(50), "b".repeat(50), "c".repeat(50)];

        let joined = join_documents(&docs, 101);
        assert_eq!(joined.lines().count(), 2);

        let joined = join_documents(&docs, 10);
        assert_eq!(joined, "a".repeat(50));
    }
}
