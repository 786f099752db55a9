pub mod schema;
pub mod sqlite;

use anyhow::Result;
use std::collections::{HashMap, HashSet};

use crate::catalog::{CatalogEntry, Fields, ItemId, UserId};
use crate::embed::Embedding;

/// Read access to items and their vectors.
pub trait CatalogStore {
    /// Vectors for the given ids. Unknown ids are absent from the map; known
    /// items without a vector map to `None`.
    fn fetch_vectors(&self, ids: &[ItemId]) -> Result<HashMap<ItemId, Option<Embedding>>>;

    fn fetch_items(&self, excluding: &HashSet<ItemId>, fields: Fields) -> Result<Vec<CatalogEntry>>;

    fn fetch_all_items(&self, fields: Fields) -> Result<Vec<CatalogEntry>> {
        self.fetch_items(&HashSet::new(), fields)
    }
}

/// Read access to aggregates over (user, item) likes.
pub trait InteractionStore {
    /// Distinct liking users per item, skipping `excluding`.
    fn count_likes_by_item(&self, excluding: &HashSet<ItemId>) -> Result<HashMap<ItemId, u64>>;

    fn users_who_liked(&self, ids: &[ItemId]) -> Result<HashSet<UserId>>;

    /// For every item liked by any of `users` (minus `excluding`), how many of
    /// those users liked it.
    fn items_liked_by(
        &self,
        users: &HashSet<UserId>,
        excluding: &HashSet<ItemId>,
    ) -> Result<HashMap<ItemId, u64>>;

    /// Total number of like records.
    fn interaction_count(&self) -> Result<u64>;
}
