//! Clause extraction over retrieved context.
//!
//! The generative model is opaque behind [`Generator`]; this module fixes the
//! prompt shape: a constant system instruction framing the task as
//! constrained extraction, and a user message carrying the question followed
//! by the retrieved chunks joined with a blank line.

use anyhow::Result;
use async_trait::async_trait;

pub const SYSTEM_PROMPT: &str =
    "You are a legal assistant. Extract the requested clause from the contract.";

/// Separator placed between retrieved chunks in the context block.
pub const CONTEXT_SEPARATOR: &str = "\n\n";

/// Answer returned when retrieval found nothing to ground the model on.
pub const NO_GROUNDING_ANSWER: &str = "No matching clause was found in this contract.";

/// An opaque (system prompt, question, context) → text model.
///
/// Implementations must run in their most deterministic mode (temperature 0).
#[async_trait]
pub trait Generator: Send + Sync {
    fn model_name(&self) -> &str;

    async fn generate(&self, system_prompt: &str, question: &str, context: &str)
        -> Result<String>;
}

/// Join retrieved chunks, in rank order, into one context block.
pub fn build_context(chunks: &[String]) -> String {
    chunks.join(CONTEXT_SEPARATOR)
}

/// User turn sent to chat-style models.
pub fn user_message(question: &str, context: &str) -> String {
    format!("{}\n\nContract:\n{}", question, context)
}

/// Ask `generator` to extract the clause answering `question` from `chunks`.
pub async fn extract_clause(
    generator: &dyn Generator,
    question: &str,
    chunks: &[String],
) -> Result<String> {
    let context = build_context(chunks);
    let answer = generator
        .generate(SYSTEM_PROMPT, question, &context)
        .await?;
    Ok(answer.trim().to_string())
}
