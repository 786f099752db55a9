use anyhow::{Context, Result, bail};
use tracing::info;

use super::{Item, ItemId, ItemMetadata, ItemSummary, MetadataPatch};
use crate::embed::{Embedder, embed_metadata};
use crate::store::sqlite::Store;

/// Validate, embed once, and store a new item. Returns its fresh id.
pub fn add(store: &Store, embedder: &dyn Embedder, meta: &ItemMetadata) -> Result<ItemId> {
    meta.validate()?;
    let embedded = embed_metadata(embedder, meta)
        .with_context(|| format!("embedding {:?}", meta.title))?;

    let id = ItemId::new_random();
    store.insert_item(id, meta, Some(&embedded))?;
    info!(item = %id, title = %meta.title, model = %embedded.model, "item added");
    Ok(id)
}

/// Change metadata without touching the stored vector, which may go stale.
pub fn update(store: &Store, id: ItemId, patch: MetadataPatch) -> Result<Item> {
    if patch.is_empty() {
        bail!("nothing to update");
    }
    let Some(mut item) = store.get_item(id)? else {
        bail!("item {id} not found");
    };
    item.metadata.apply(patch);
    if item.metadata.title.trim().is_empty() {
        bail!("title cannot be empty");
    }
    store.update_metadata(id, &item.metadata)?;
    info!(item = %id, "item updated");
    store
        .get_item(id)?
        .with_context(|| format!("item {id} vanished during update"))
}

pub fn show(store: &Store, id: ItemId) -> Result<Item> {
    store
        .get_item(id)?
        .with_context(|| format!("item {id} not found"))
}

pub fn list(store: &Store) -> Result<Vec<ItemSummary>> {
    store.list_items()
}

pub fn remove(store: &Store, id: ItemId) -> Result<()> {
    if !store.remove_item(id)? {
        bail!("item {id} not found");
    }
    info!(item = %id, "item removed");
    Ok(())
}
