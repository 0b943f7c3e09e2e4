//! Centralized prompt assembly for ragchat.
//!
//! This module is the single place that decides what the model sees:
//! persona instruction, retrieved document context, history and the new turn,
//! always in that order.

use crate::message_builders::create_history_messages;
use crate::persona::Persona;
use crate::protocol::{ChatMessage, Message, ScoredChunk};

/// Excerpt length cap per chunk in the context block
pub const MAX_CHUNK_CHARS_IN_PROMPT: usize = 2000;

/// Build the detailed document context section.
pub fn build_retrieved_document_context(chunks_text: &str) -> String {
    format!(
        "## Retrieved Document Context\n\n\
        The following excerpts are relevant to the user's question:\n\n\
        {}\n\n\
        Answer the user's question using this context. Cite sources when helpful.\n\
        If the context doesn't fully answer the question, say so clearly.",
        chunks_text
    )
}

/// Format retrieved chunks as numbered, attributed excerpts.
pub fn format_context_chunks(chunks: &[ScoredChunk]) -> String {
    chunks
        .iter()
        .enumerate()
        .map(|(i, scored)| {
            let text = &scored.chunk.text;
            let excerpt: String = text.chars().take(MAX_CHUNK_CHARS_IN_PROMPT).collect();
            let truncated = if excerpt.len() < text.len() { "..." } else { "" };
            format!(
                "[{}] {} (relevancy: {:.2})\n{}{}",
                i + 1,
                scored.chunk.source_id,
                scored.score,
                excerpt,
                truncated
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Assemble the full message list for one completion request. Pure.
pub fn assemble_prompt(
    persona: Persona,
    context_chunks: &[ScoredChunk],
    history: &[Message],
    user_text: &str,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 3);
    messages.push(ChatMessage::system(persona.instruction()));
    if !context_chunks.is_empty() {
        messages.push(ChatMessage::system(build_retrieved_document_context(
            &format_context_chunks(context_chunks),
        )));
    }
    messages.extend(create_history_messages(history));
    messages.push(ChatMessage::user(user_text));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::DocumentChunk;

    fn scored(text: &str, source: &str, score: f32) -> ScoredChunk {
        ScoredChunk {
            chunk: DocumentChunk {
                text: text.to_string(),
                source_id: source.to_string(),
                offset: 0,
            },
            score,
            position: 0,
        }
    }

    #[test]
    fn test_prompt_order_without_context() {
        let history = vec![Message::user("hi"), Message::assistant("hello")];
        let messages = assemble_prompt(Persona::Concise, &[], &history, "what is rust?");
        let roles: Vec<&str> = messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
        assert_eq!(messages[0].content, Persona::Concise.instruction());
        assert_eq!(messages[3].content, "what is rust?");
    }

    #[test]
    fn test_prompt_includes_numbered_context_before_history() {
        let chunks = vec![
            scored("The sky is blue.", "sky.txt", 0.91),
            scored("Grass is green.", "grass.txt", 0.42),
        ];
        let history = vec![Message::user("earlier")];
        let messages = assemble_prompt(Persona::Helpful, &chunks, &history, "colors?");
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[1].role, "system");
        let context = &messages[1].content;
        assert!(context.contains("[1] sky.txt (relevancy: 0.91)\nThe sky is blue."));
        assert!(context.contains("[2] grass.txt"));
        assert!(context.find("[1]").unwrap() < context.find("[2]").unwrap());
        assert_eq!(messages[2].content, "earlier");
    }

    #[test]
    fn test_assembly_is_pure() {
        let chunks = vec![scored("x", "a", 0.5)];
        let history = vec![Message::user("u")];
        assert_eq!(
            assemble_prompt(Persona::Friendly, &chunks, &history, "q"),
            assemble_prompt(Persona::Friendly, &chunks, &history, "q")
        );
    }

    #[test]
    fn test_long_chunks_are_truncated() {
        let long = "a".repeat(MAX_CHUNK_CHARS_IN_PROMPT + 10);
        let formatted = format_context_chunks(&[scored(&long, "big.txt", 1.0)]);
        assert!(formatted.ends_with("..."));
    }
}
