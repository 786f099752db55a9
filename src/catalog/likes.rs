use anyhow::Result;
use tracing::info;

use super::{ItemId, UserId};
use crate::store::sqlite::Store;

pub fn like(store: &Store, user: UserId, item: ItemId) -> Result<()> {
    store.add_like(user, item)?;
    info!(%user, %item, "liked");
    Ok(())
}

pub fn unlike(store: &Store, user: UserId, item: ItemId) -> Result<()> {
    store.remove_like(user, item)?;
    info!(%user, %item, "unliked");
    Ok(())
}

pub fn list(store: &Store, user: UserId) -> Result<Vec<ItemId>> {
    store.likes_for_user(user)
}

/// Replace everything `user` likes with `items`.
pub fn replace(store: &Store, user: UserId, items: &[ItemId]) -> Result<()> {
    store.replace_likes(user, items)?;
    info!(%user, count = items.len(), "liked set replaced");
    Ok(())
}
