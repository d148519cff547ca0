//! Model client: the seam between Lantern and the local inference service.
//!
//! Everything above this module talks to a [`ModelClient`]; the production
//! implementation is [`ollama::OllamaClient`]. Completions use fixed decoding
//! parameters chosen at construction time, so callers only pass a prompt.

#[cfg(test)]
pub(crate) mod mock;
pub mod ollama;

use async_trait::async_trait;

use crate::error::Result;

/// A text-completion and embedding service.
///
/// Implementations must report an unreachable service as
/// [`LanternError::ModelUnavailable`](crate::error::LanternError::ModelUnavailable)
/// so the router can fail fast with a clear message.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Complete a raw prompt and return the generated text.
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Embed a text into a dense vector.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Cheap connectivity check.
    async fn ping(&self) -> Result<()>;

    /// Name of the completion model, for logging.
    fn model_name(&self) -> &str;
}
