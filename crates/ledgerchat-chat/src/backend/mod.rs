//! Generative text backend seam.
//!
//! The composer hands a backend a prompt built only from structured facts
//! and the user's question. Any backend failure falls back to the
//! deterministic narrative, so callers never see backend errors.

pub mod openai;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use ledgerchat_core::config::BackendConfig;

use crate::error::BackendError;

pub use openai::OpenAiBackend;

/// A text-generation model behind a single prompt-in, text-out call.
#[async_trait]
pub trait TextBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn generate(&self, prompt: &str) -> Result<String, BackendError>;
}

/// Build the configured backend, or `None` when generation is disabled.
pub fn from_config(config: &BackendConfig) -> Result<Option<Arc<dyn TextBackend>>, BackendError> {
    match config.provider.trim().to_lowercase().as_str() {
        "" | "none" => {
            debug!("No text backend configured");
            Ok(None)
        }
        "openai" => {
            let backend = OpenAiBackend::from_config(config)?;
            info!(model = %config.model, "OpenAI text backend enabled");
            Ok(Some(Arc::new(backend)))
        }
        other => Err(BackendError::Config(format!("unknown provider: {other}"))),
    }
}

/// Prompt asking the model to phrase `facts` as an answer to `question`.
pub fn build_prompt(question: &str, facts: &[String]) -> String {
    let mut prompt = String::from(
        "You are a helpful assistant for a cryptocurrency exchange. Answer the user's \
         question using only the facts below.\n\n\
         Rules:\n\
         - Use only the information in the facts. Do not invent figures.\n\
         - Be precise with numbers, currencies and dates.\n\
         - Use bullet points when listing several items.\n\
         - If a fact needed to answer is missing, say \"I don't have information about \
         that specific aspect\".\n\
         - Keep the answer short and conversational.\n\nFacts:\n",
    );
    for fact in facts {
        prompt.push_str("- ");
        prompt.push_str(fact);
        prompt.push('\n');
    }
    prompt.push_str("\nQuestion: ");
    prompt.push_str(question.trim());
    prompt.push_str("\nAnswer:");
    prompt
}

/// Call `backend` up to `max_attempts` times with exponential backoff.
/// Blank output counts as a failed attempt.
pub async fn generate_with_retry(
    backend: &dyn TextBackend,
    prompt: &str,
    max_attempts: u32,
    base_delay: Duration,
) -> Result<String, BackendError> {
    let attempts = max_attempts.max(1);
    let mut last_error = BackendError::EmptyResponse;

    for attempt in 1..=attempts {
        match backend.generate(prompt).await {
            Ok(text) if !text.trim().is_empty() => return Ok(text.trim().to_string()),
            Ok(_) => last_error = BackendError::EmptyResponse,
            Err(e) => last_error = e,
        }
        warn!(
            backend = backend.name(),
            attempt,
            attempts,
            "Text generation failed: {last_error}"
        );
        if attempt < attempts {
            let delay = base_delay.saturating_mul(2u32.saturating_pow(attempt - 1));
            tokio::time::sleep(delay).await;
        }
    }
    Err(last_error)
}
