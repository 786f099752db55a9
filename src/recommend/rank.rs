use std::cmp::Ordering;
use std::collections::HashSet;

use super::RecommendError;
use crate::catalog::{ItemId, ItemSummary};

/// Number of results a caller asked for, always within `1..=Limit::MAX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limit(usize);

impl Limit {
    pub const MAX: usize = 100;

    /// Out-of-range limits are rejected, never clamped.
    pub fn new(n: usize) -> Result<Self, RecommendError> {
        if n == 0 || n > Self::MAX {
            return Err(RecommendError::InvalidInput(format!(
                "limit must be between 1 and {}, got {n}",
                Self::MAX
            )));
        }
        Ok(Self(n))
    }

    pub fn get(self) -> usize {
        self.0
    }
}

/// A candidate with its ranking key. Higher keys rank first.
#[derive(Debug, Clone)]
pub struct Scored<K> {
    pub item: ItemSummary,
    pub key: K,
}

/// Cosine score with a total order, so it can be a sort key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Similarity(pub f32);

impl Eq for Similarity {}

impl PartialOrd for Similarity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Similarity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Sort by key descending then id ascending, drop excluded and repeated ids,
/// keep the first `n`.
pub fn top_n<K: Ord>(
    scored: Vec<Scored<K>>,
    excluded: &HashSet<ItemId>,
    n: usize,
) -> Vec<ItemSummary> {
    let mut scored: Vec<Scored<K>> = scored
        .into_iter()
        .filter(|s| !excluded.contains(&s.item.id))
        .collect();
    scored.sort_by(|a, b| b.key.cmp(&a.key).then_with(|| a.item.id.cmp(&b.item.id)));

    let mut seen = HashSet::new();
    scored
        .into_iter()
        .map(|s| s.item)
        .filter(|item| seen.insert(item.id))
        .take(n)
        .collect()
}

/// Concatenate two ranked lists, `primary` first. Items already taken or
/// excluded are skipped; the result is cut to `n`.
pub fn merge(
    primary: Vec<ItemSummary>,
    secondary: Vec<ItemSummary>,
    excluded: &HashSet<ItemId>,
    n: usize,
) -> Vec<ItemSummary> {
    let mut seen = HashSet::new();
    primary
        .into_iter()
        .chain(secondary)
        .filter(|item| !excluded.contains(&item.id) && seen.insert(item.id))
        .take(n)
        .collect()
}
