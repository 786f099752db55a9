use anyhow::Result;
use serde::Serialize;
use tracing::{info, warn};

use crate::embed::{Embedder, document_text, embed_metadata, text_hash};
use crate::store::InteractionStore;
use crate::store::sqlite::{EmbeddingState, Store};

#[derive(Debug, Serialize)]
pub struct EmbedStats {
    pub total_items: usize,
    pub newly_embedded: usize,
    pub refreshed: usize,
    pub failed: usize,
}

#[derive(Debug, Serialize)]
pub struct CatalogStatus {
    pub items: i64,
    pub embedded: i64,
    pub unembedded: i64,
    /// Items whose metadata changed after their vector was computed.
    pub stale: usize,
    pub dimensions: Option<usize>,
    pub models: Vec<(String, i64)>,
    pub interactions: u64,
    pub users: i64,
}

fn is_stale(state: &EmbeddingState) -> bool {
    state
        .embedded_hash
        .as_deref()
        .is_some_and(|hash| hash != text_hash(&document_text(&state.metadata)))
}

/// Embed items that have no vector yet, and with `include_stale` also the
/// ones whose metadata changed since they were embedded. Failures are
/// logged and skipped.
pub fn embed_pending(
    store: &Store,
    embedder: &dyn Embedder,
    include_stale: bool,
) -> Result<EmbedStats> {
    let states = store.embedding_states()?;
    let mut stats = EmbedStats {
        total_items: states.len(),
        newly_embedded: 0,
        refreshed: 0,
        failed: 0,
    };

    for state in &states {
        let missing = state.embedded_hash.is_none();
        if !missing && !(include_stale && is_stale(state)) {
            continue;
        }
        let embedded = match embed_metadata(embedder, &state.metadata) {
            Ok(e) => e,
            Err(e) => {
                warn!(item = %state.id, title = %state.metadata.title, error = %e, "skipping item");
                stats.failed += 1;
                continue;
            }
        };
        if let Err(e) = store.set_embedding(state.id, &embedded) {
            warn!(item = %state.id, error = %format!("{e:#}"), "could not store vector");
            stats.failed += 1;
            continue;
        }
        if missing {
            stats.newly_embedded += 1;
        } else {
            stats.refreshed += 1;
        }
    }

    info!(
        model = embedder.model_name(),
        new = stats.newly_embedded,
        refreshed = stats.refreshed,
        failed = stats.failed,
        "embedding pass done"
    );
    Ok(stats)
}

pub fn status(store: &Store) -> Result<CatalogStatus> {
    let stats = store.stats()?;
    let stale = store
        .embedding_states()?
        .iter()
        .filter(|s| is_stale(s))
        .count();
    Ok(CatalogStatus {
        items: stats.item_count,
        embedded: stats.embedded_count,
        unembedded: stats.item_count - stats.embedded_count,
        stale,
        dimensions: stats.dimensions,
        models: stats.models,
        interactions: store.interaction_count()?,
        users: stats.user_count,
    })
}
