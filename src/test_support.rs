//! Fixtures shared by unit tests.

use anyhow::{Result, anyhow};

use crate::catalog::{ItemId, ItemMetadata, UserId};
use crate::embed::{EmbeddedText, Embedder, Embedding};
use crate::store::sqlite::Store;

/// Returns the same vector for every input, or fails when built with `failing`.
pub struct FixedEmbedder {
    vector: Option<Embedding>,
}

impl FixedEmbedder {
    pub fn new(vector: Embedding) -> Self {
        Self {
            vector: Some(vector),
        }
    }

    pub fn failing() -> Self {
        Self { vector: None }
    }
}

impl Embedder for FixedEmbedder {
    fn embed(&self, _text: &str) -> Result<Embedding> {
        self.vector
            .clone()
            .ok_or_else(|| anyhow!("connection refused"))
    }

    fn dimensions(&self) -> usize {
        self.vector.as_ref().map_or(0, Vec::len)
    }

    fn model_name(&self) -> &str {
        "fixed"
    }
}

pub fn movie(title: &str, year: Option<i32>) -> ItemMetadata {
    ItemMetadata {
        title: title.into(),
        description: Some(format!("About {title}")),
        release_year: year,
        ..Default::default()
    }
}

pub fn embedded(vector: Vec<f32>) -> EmbeddedText {
    EmbeddedText {
        vector,
        model: "test".into(),
        text_hash: String::new(),
    }
}

pub fn id(n: u128) -> ItemId {
    ItemId::from_u128(n)
}

pub fn user(n: u128) -> UserId {
    UserId::from_u128(n)
}

/// In-memory store seeded with `(id, title, year, vector)` rows.
pub fn seeded_store(rows: &[(u128, &str, Option<i32>, Option<Vec<f32>>)]) -> Store {
    let store = Store::open_in_memory().expect("in-memory store");
    for (n, title, year, vector) in rows {
        let embedding = vector.clone().map(embedded);
        store
            .insert_item(id(*n), &movie(title, *year), embedding.as_ref())
            .expect("insert item");
    }
    store
}
