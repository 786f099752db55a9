pub mod hashing;
pub mod ollama;

use anyhow::Result;
use std::time::Duration;
use thiserror::Error;

use crate::catalog::ItemMetadata;
use crate::config::{EmbedBackend, EmbedConfig};

pub type Embedding = Vec<f32>;

/// A text embedding model. Implementations are shared across threads and
/// must be safe for concurrent read-only use.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Embedding>;
    fn dimensions(&self) -> usize;
    fn model_name(&self) -> &str;
}

const FIELD_SEPARATOR: &str = " || ";
const VALUE_SEPARATOR: &str = " | ";

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("embedding model unavailable")]
    Unavailable(#[source] anyhow::Error),
    #[error("model {model} returned a non-finite component at index {index}")]
    NonFiniteVector { model: String, index: usize },
    #[error("model {model} returned {actual} dimensions, expected {expected}")]
    DimensionMismatch {
        model: String,
        expected: usize,
        actual: usize,
    },
}

/// A vector together with what it was computed from.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedText {
    pub vector: Embedding,
    pub model: String,
    /// BLAKE3 of the serialized document, used to spot stale vectors.
    pub text_hash: String,
}

/// Serialize item metadata into the tagged document fed to the model.
///
/// Empty fields are left out. Each field gets an uppercase `[TAG]` prefix,
/// list values are joined with ` | ` and fields with ` || `, so the model
/// can tell several genres apart from several fields.
pub fn document_text(meta: &ItemMetadata) -> String {
    let mut parts: Vec<String> = Vec::new();

    push_scalar(&mut parts, "TITLE", Some(&meta.title));
    push_scalar(&mut parts, "DESC", meta.description.as_ref());
    push_list(&mut parts, "GENRES", &meta.genres);
    push_list(&mut parts, "TAGS", &meta.tags);
    push_scalar(&mut parts, "DIRECTOR", meta.director.as_ref());
    push_list(&mut parts, "ACTORS", &meta.actors);

    parts.join(FIELD_SEPARATOR)
}

fn push_scalar(parts: &mut Vec<String>, tag: &str, value: Option<&String>) {
    if let Some(value) = value.map(|v| v.trim()).filter(|v| !v.is_empty()) {
        parts.push(format!("[{tag}] {value}"));
    }
}

fn push_list(parts: &mut Vec<String>, tag: &str, values: &[String]) {
    let values: Vec<&str> = values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .collect();
    if !values.is_empty() {
        parts.push(format!("[{tag}] {}", values.join(VALUE_SEPARATOR)));
    }
}

pub fn text_hash(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

/// Embed an item's metadata. Called once per item at write time.
pub fn embed_metadata(
    embedder: &dyn Embedder,
    meta: &ItemMetadata,
) -> std::result::Result<EmbeddedText, EmbedError> {
    let text = document_text(meta);
    let vector = embedder
        .embed(&text)
        .map_err(|e| e.downcast::<EmbedError>().unwrap_or_else(EmbedError::Unavailable))?;
    let model = embedder.model_name().to_string();

    if embedder.dimensions() != 0 && vector.len() != embedder.dimensions() {
        return Err(EmbedError::DimensionMismatch {
            model,
            expected: embedder.dimensions(),
            actual: vector.len(),
        });
    }
    if let Some(index) = vector.iter().position(|x| !x.is_finite()) {
        return Err(EmbedError::NonFiniteVector { model, index });
    }

    Ok(EmbeddedText {
        vector,
        model,
        text_hash: text_hash(&text),
    })
}

/// Build the configured embedder, or `None` when embedding is disabled.
pub fn from_config(config: &EmbedConfig) -> Result<Option<Box<dyn Embedder>>> {
    let timeout = Duration::from_secs(config.timeout_secs);
    match &config.backend {
        EmbedBackend::Ollama { model, url } => Ok(Some(Box::new(ollama::OllamaEmbedder::new(
            url, model, timeout,
        )?))),
        EmbedBackend::Hashing { dimensions } => {
            Ok(Some(Box::new(hashing::HashingEmbedder::new(*dimensions)?)))
        }
        EmbedBackend::None => Ok(None),
    }
}
