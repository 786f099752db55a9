pub mod rank;
pub mod similarity;
pub mod strategies;

use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{error, info};

use crate::catalog::{ItemId, ItemSummary};
use crate::store::{CatalogStore, InteractionStore};
use rank::Limit;
use similarity::SimilarityError;

#[derive(Debug, Error)]
pub enum RecommendError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("degenerate vector: {0}")]
    DegenerateVector(String),
    #[error("vector dimension mismatch: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },
    #[error("upstream failure")]
    Upstream(#[from] anyhow::Error),
}

impl From<SimilarityError> for RecommendError {
    fn from(e: SimilarityError) -> Self {
        match e {
            SimilarityError::DimensionMismatch { left, right } => {
                Self::DimensionMismatch { left, right }
            }
            other => Self::DegenerateVector(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Content,
    Latest,
    Popularity,
    UserBased,
    Hybrid,
}

impl Strategy {
    pub const ALL: [Strategy; 5] = [
        Strategy::Content,
        Strategy::Latest,
        Strategy::Popularity,
        Strategy::UserBased,
        Strategy::Hybrid,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Strategy::Content => "content",
            Strategy::Latest => "latest",
            Strategy::Popularity => "popularity",
            Strategy::UserBased => "user_based",
            Strategy::Hybrid => "hybrid",
        }
    }

    fn run(
        self,
        sources: &Sources<'_>,
        liked: &LikedSet,
        n: usize,
    ) -> Result<Outcome, RecommendError> {
        match self {
            Strategy::Content => strategies::content(sources, liked, n),
            Strategy::Latest => strategies::latest(sources, liked, n),
            Strategy::Popularity => strategies::popularity(sources, liked, n),
            Strategy::UserBased => strategies::user_based(sources, liked, n),
            Strategy::Hybrid => strategies::hybrid(sources, liked, n),
        }
    }
}

impl FromStr for Strategy {
    type Err = RecommendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.name() == wanted)
            .ok_or_else(|| {
                let names: Vec<&str> = Self::ALL.iter().map(|s| s.name()).collect();
                RecommendError::InvalidInput(format!(
                    "unknown strategy {s:?}, expected one of {}",
                    names.join(", ")
                ))
            })
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Why a request produced nothing, when that is a property of the data
/// rather than of the filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoData {
    /// None of the liked items has a vector.
    UnembeddedLikes,
    /// Nobody has liked anything yet.
    NoInteractions,
}

impl NoData {
    pub fn reason(self) -> &'static str {
        match self {
            NoData::UnembeddedLikes => "No liked items have embeddings.",
            NoData::NoInteractions => "No interaction data yet.",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "result", rename_all = "snake_case")]
pub enum Outcome {
    Ranked(Vec<ItemSummary>),
    NoData(NoData),
}

impl Outcome {
    /// Ranked items; empty for a no-data outcome.
    pub fn items(&self) -> &[ItemSummary] {
        match self {
            Outcome::Ranked(items) => items,
            Outcome::NoData(_) => &[],
        }
    }

    pub fn into_items(self) -> Vec<ItemSummary> {
        match self {
            Outcome::Ranked(items) => items,
            Outcome::NoData(_) => Vec::new(),
        }
    }
}

/// Non-empty, de-duplicated liked ids in caller order.
#[derive(Debug, Clone)]
pub struct LikedSet {
    ids: Vec<ItemId>,
    set: HashSet<ItemId>,
}

impl LikedSet {
    pub fn new(ids: Vec<ItemId>) -> Result<Self, RecommendError> {
        if ids.is_empty() {
            return Err(RecommendError::InvalidInput(
                "liked item ids must be a non-empty list".into(),
            ));
        }
        let mut set = HashSet::with_capacity(ids.len());
        let ids: Vec<ItemId> = ids.into_iter().filter(|id| set.insert(*id)).collect();
        Ok(Self { ids, set })
    }

    pub fn ids(&self) -> &[ItemId] {
        &self.ids
    }

    pub fn as_set(&self) -> &HashSet<ItemId> {
        &self.set
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// A validated recommendation request.
#[derive(Debug, Clone)]
pub struct RecommendRequest {
    pub liked: LikedSet,
    pub limit: Limit,
    pub strategy: Strategy,
}

impl RecommendRequest {
    pub fn new(
        liked: Vec<ItemId>,
        limit: usize,
        strategy: Strategy,
    ) -> Result<Self, RecommendError> {
        Ok(Self {
            liked: LikedSet::new(liked)?,
            limit: Limit::new(limit)?,
            strategy,
        })
    }

    /// Validate raw caller input: every id must be a UUID.
    pub fn parse<S: AsRef<str>>(
        raw_ids: &[S],
        limit: usize,
        strategy: &str,
    ) -> Result<Self, RecommendError> {
        let strategy: Strategy = strategy.parse()?;
        let ids = raw_ids
            .iter()
            .map(|raw| {
                let raw = raw.as_ref();
                raw.parse::<ItemId>().map_err(|_| {
                    RecommendError::InvalidInput(format!("malformed item id {raw:?}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(ids, limit, strategy)
    }
}

/// The external state a strategy reads.
#[derive(Clone, Copy)]
pub struct Sources<'a> {
    pub catalog: &'a dyn CatalogStore,
    pub interactions: &'a dyn InteractionStore,
}

/// Stateless recommendation engine over borrowed stores.
pub struct Recommender<'a> {
    sources: Sources<'a>,
}

impl<'a> Recommender<'a> {
    pub fn new(catalog: &'a dyn CatalogStore, interactions: &'a dyn InteractionStore) -> Self {
        Self {
            sources: Sources {
                catalog,
                interactions,
            },
        }
    }

    pub fn recommend(&self, request: &RecommendRequest) -> Result<Outcome, RecommendError> {
        let strategy = request.strategy;
        let limit = request.limit.get();
        info!(%strategy, limit, liked = request.liked.len(), "recommending");

        let result = strategy.run(&self.sources, &request.liked, limit);
        match &result {
            Ok(Outcome::Ranked(items)) => info!(%strategy, results = items.len(), "ranked"),
            Ok(Outcome::NoData(reason)) => info!(%strategy, ?reason, "no data"),
            Err(RecommendError::Upstream(e)) => {
                error!(
                    %strategy,
                    limit,
                    liked = request.liked.len(),
                    error = %format!("{e:#}"),
                    "store failure during recommendation"
                );
            }
            Err(e) => info!(%strategy, error = %e, "recommendation rejected"),
        }
        result
    }
}
