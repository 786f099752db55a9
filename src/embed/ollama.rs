use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use ureq::Agent;

use super::{EmbedError, Embedder, Embedding};

const MAX_PROMPT_BYTES: usize = 8192;

/// Embeddings served by a local Ollama instance.
///
/// Holds no mutable state; every call is an independent request through a
/// shared agent, so one instance can serve concurrent callers.
pub struct OllamaEmbedder {
    agent: Agent,
    endpoint: String,
    model: String,
    dimensions: usize,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

impl OllamaEmbedder {
    /// Connects and learns the model's dimension from one short request.
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self> {
        let agent: Agent = Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();

        let mut embedder = Self {
            agent,
            endpoint: format!("{}/api/embeddings", base_url.trim_end_matches('/')),
            model: model.to_string(),
            dimensions: 0,
        };
        embedder.dimensions = embedder.embed("test")?.len();
        tracing::debug!(model, dimensions = embedder.dimensions, "ollama embedder ready");
        Ok(embedder)
    }

    fn request(&self, prompt: &str) -> Result<Embedding, EmbedError> {
        let body = EmbeddingRequest {
            model: &self.model,
            prompt,
        };
        let response: EmbeddingResponse = self
            .agent
            .post(&self.endpoint)
            .send_json(&body)
            .and_then(|mut r| r.body_mut().read_json::<EmbeddingResponse>())
            .map_err(|e| self.unavailable(e))?;

        if response.embedding.is_empty() {
            return Err(EmbedError::Unavailable(anyhow!(
                "ollama model {} returned an empty embedding",
                self.model
            )));
        }
        Ok(response.embedding)
    }

    fn unavailable(&self, e: ureq::Error) -> EmbedError {
        let cause = match e {
            ureq::Error::StatusCode(code) => {
                anyhow!("ollama returned HTTP {code} for model {}", self.model)
            }
            other => anyhow::Error::new(other).context(format!("requesting {}", self.endpoint)),
        };
        EmbedError::Unavailable(cause)
    }
}

impl Embedder for OllamaEmbedder {
    fn embed(&self, text: &str) -> Result<Embedding> {
        // Blank input: embed a single space, the model's notion of "nothing"
        let text = if text.is_empty() { " " } else { text };
        Ok(self.request(truncate_at_char_boundary(text, MAX_PROMPT_BYTES))?)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

fn truncate_at_char_boundary(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
