//! The five ranking strategies. Each takes the stores, the liked set and the
//! number of results wanted, and never returns a liked item.

use std::collections::HashMap;
use tracing::{debug, warn};

use super::rank::{Scored, Similarity, merge, top_n};
use super::similarity::{SimilarityError, cosine_similarity, l2_norm, mean_vector};
use super::{LikedSet, NoData, Outcome, RecommendError, Sources};
use crate::catalog::{Fields, ItemId};

/// Cosine similarity to the mean vector of the liked items.
pub fn content(
    sources: &Sources<'_>,
    liked: &LikedSet,
    n: usize,
) -> Result<Outcome, RecommendError> {
    let vectors = sources.catalog.fetch_vectors(liked.ids())?;

    let mut present: Vec<&[f32]> = Vec::with_capacity(vectors.len());
    for id in liked.ids() {
        match vectors.get(id) {
            Some(Some(v)) => present.push(v),
            Some(None) => warn!(item = %id, "liked item has no embedding, skipped"),
            None => debug!(item = %id, "liked item not in catalog"),
        }
    }

    let Some(query) = mean_vector(&present)? else {
        return Ok(Outcome::NoData(NoData::UnembeddedLikes));
    };
    if l2_norm(&query) == 0.0 {
        return Err(RecommendError::DegenerateVector(
            "mean of the liked vectors has zero norm".into(),
        ));
    }

    let candidates = sources.catalog.fetch_items(liked.as_set(), Fields::WithVector)?;
    let mut scored = Vec::with_capacity(candidates.len());
    let mut degenerate = 0usize;

    for entry in candidates {
        let Some(vector) = entry.vector.as_deref() else {
            continue;
        };
        match cosine_similarity(&query, vector) {
            Ok(score) => scored.push(Scored {
                item: entry.summary,
                key: Similarity(score),
            }),
            Err(SimilarityError::ZeroNorm | SimilarityError::NonFinite) => {
                debug!(item = %entry.summary.id, "degenerate vector, excluded from ranking");
                degenerate += 1;
            }
            Err(e @ SimilarityError::DimensionMismatch { .. }) => return Err(e.into()),
        }
    }

    if scored.is_empty() && degenerate > 0 {
        return Err(RecommendError::DegenerateVector(format!(
            "all {degenerate} embedded candidates have degenerate vectors"
        )));
    }

    Ok(Outcome::Ranked(top_n(scored, liked.as_set(), n)))
}

/// Newest release year first; unknown years last.
pub fn latest(
    sources: &Sources<'_>,
    liked: &LikedSet,
    n: usize,
) -> Result<Outcome, RecommendError> {
    let scored = sources
        .catalog
        .fetch_items(liked.as_set(), Fields::Summary)?
        .into_iter()
        .map(|entry| Scored {
            key: entry.summary.release_year,
            item: entry.summary,
        })
        .collect();
    Ok(Outcome::Ranked(top_n(scored, liked.as_set(), n)))
}

/// Most distinct liking users first. Items nobody liked are left out.
pub fn popularity(
    sources: &Sources<'_>,
    liked: &LikedSet,
    n: usize,
) -> Result<Outcome, RecommendError> {
    if sources.interactions.interaction_count()? == 0 {
        return Ok(Outcome::NoData(NoData::NoInteractions));
    }
    let counts = sources.interactions.count_likes_by_item(liked.as_set())?;
    rank_by_counts(sources, liked, &counts, n)
}

/// Items liked by users who also liked something in the liked set, ranked by
/// how many of those co-likers liked them.
pub fn user_based(
    sources: &Sources<'_>,
    liked: &LikedSet,
    n: usize,
) -> Result<Outcome, RecommendError> {
    let co_likers = sources.interactions.users_who_liked(liked.ids())?;
    if co_likers.is_empty() {
        debug!("no co-likers for the liked set");
        return Ok(Outcome::Ranked(Vec::new()));
    }
    let counts = sources
        .interactions
        .items_liked_by(&co_likers, liked.as_set())?;
    rank_by_counts(sources, liked, &counts, n)
}

/// Content results first, popularity fills the remaining slots.
///
/// Both lists are fetched at twice the limit so deduplication still leaves
/// enough candidates. The content-first bias is deliberate.
/// If content scoring hits a degenerate vector, popularity alone fills the
/// list; the error only surfaces when popularity has nothing either.
pub fn hybrid(
    sources: &Sources<'_>,
    liked: &LikedSet,
    n: usize,
) -> Result<Outcome, RecommendError> {
    let wide = n.saturating_mul(2);
    let by_content = match content(sources, liked, wide) {
        Ok(outcome) => Ok(outcome),
        Err(RecommendError::DegenerateVector(reason)) => {
            warn!(%reason, "content half degenerate, using popularity only");
            Err(reason)
        }
        Err(e) => return Err(e),
    };
    let by_popularity = popularity(sources, liked, wide)?;

    match (by_content, by_popularity) {
        (Err(reason), by_popularity) => {
            if by_popularity.items().is_empty() {
                return Err(RecommendError::DegenerateVector(reason));
            }
            Ok(Outcome::Ranked(merge(
                Vec::new(),
                by_popularity.into_items(),
                liked.as_set(),
                n,
            )))
        }
        (Ok(Outcome::NoData(reason)), Outcome::NoData(_)) => Ok(Outcome::NoData(reason)),
        (Ok(by_content), by_popularity) => Ok(Outcome::Ranked(merge(
            by_content.into_items(),
            by_popularity.into_items(),
            liked.as_set(),
            n,
        ))),
    }
}

fn rank_by_counts(
    sources: &Sources<'_>,
    liked: &LikedSet,
    counts: &HashMap<ItemId, u64>,
    n: usize,
) -> Result<Outcome, RecommendError> {
    if counts.is_empty() {
        return Ok(Outcome::Ranked(Vec::new()));
    }
    let scored = sources
        .catalog
        .fetch_items(liked.as_set(), Fields::Summary)?
        .into_iter()
        .filter_map(|entry| {
            counts
                .get(&entry.summary.id)
                .copied()
                .filter(|&count| count > 0)
                .map(|count| Scored {
                    item: entry.summary,
                    key: count,
                })
        })
        .collect();
    Ok(Outcome::Ranked(top_n(scored, liked.as_set(), n)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ItemSummary;
    use crate::store::sqlite::Store;
    use crate::test_support::{id, seeded_store, user};

    fn sources(store: &Store) -> Sources<'_> {
        Sources {
            catalog: store,
            interactions: store,
        }
    }

    fn liked(ns: &[u128]) -> LikedSet {
        LikedSet::new(ns.iter().map(|n| id(*n)).collect()).unwrap()
    }

    fn ids(outcome: &Outcome) -> Vec<ItemId> {
        outcome.items().iter().map(|i: &ItemSummary| i.id).collect()
    }

    #[test]
    fn content_picks_nearest_to_liked() {
        let store = seeded_store(&[
            (1, "A", None, Some(vec![1.0, 0.0])),
            (2, "B", None, Some(vec![0.0, 1.0])),
            (3, "C", None, Some(vec![0.9, 0.1])),
        ]);
        let outcome = content(&sources(&store), &liked(&[1]), 1).unwrap();
        assert_eq!(ids(&outcome), vec![id(3)]);

        let outcome = content(&sources(&store), &liked(&[1]), 5).unwrap();
        assert_eq!(ids(&outcome), vec![id(3), id(2)]);
    }

    #[test]
    fn content_averages_several_likes() {
        let store = seeded_store(&[
            (1, "A", None, Some(vec![1.0, 0.0])),
            (2, "B", None, Some(vec![0.0, 1.0])),
            (3, "Diagonal", None, Some(vec![1.0, 1.0])),
            (4, "Axis", None, Some(vec![1.0, 0.05])),
        ]);
        let outcome = content(&sources(&store), &liked(&[1, 2]), 2).unwrap();
        assert_eq!(ids(&outcome), vec![id(3), id(4)]);
    }

    #[test]
    fn content_without_vectors_is_no_data() {
        let store = seeded_store(&[(1, "X", None, None), (2, "Y", None, Some(vec![1.0, 0.0]))]);
        let outcome = content(&sources(&store), &liked(&[1]), 5).unwrap();
        assert_eq!(outcome, Outcome::NoData(NoData::UnembeddedLikes));
        assert!(outcome.items().is_empty());
    }

    #[test]
    fn content_skips_unembedded_and_unknown_likes() {
        let store = seeded_store(&[
            (1, "A", None, Some(vec![1.0, 0.0])),
            (2, "Unembedded", None, None),
            (3, "C", None, Some(vec![0.9, 0.1])),
        ]);
        let outcome = content(&sources(&store), &liked(&[1, 2, 99]), 5).unwrap();
        assert_eq!(ids(&outcome), vec![id(3)]);
    }

    #[test]
    fn content_ties_break_by_id_every_time() {
        let store = seeded_store(&[
            (1, "Liked", None, Some(vec![1.0, 0.0])),
            (7, "G", None, Some(vec![0.5, 0.5])),
            (4, "D", None, Some(vec![0.5, 0.5])),
            (9, "I", None, Some(vec![0.5, 0.5])),
        ]);
        let first = content(&sources(&store), &liked(&[1]), 3).unwrap();
        assert_eq!(ids(&first), vec![id(4), id(7), id(9)]);
        for _ in 0..5 {
            assert_eq!(content(&sources(&store), &liked(&[1]), 3).unwrap(), first);
        }
    }

    #[test]
    fn content_excludes_zero_norm_candidates() {
        let store = seeded_store(&[
            (1, "A", None, Some(vec![1.0, 0.0])),
            (2, "Zero", None, Some(vec![0.0, 0.0])),
            (3, "C", None, Some(vec![0.0, 1.0])),
        ]);
        let outcome = content(&sources(&store), &liked(&[1]), 5).unwrap();
        assert_eq!(ids(&outcome), vec![id(3)]);
    }

    #[test]
    fn content_fails_when_every_candidate_is_degenerate() {
        let store = seeded_store(&[
            (1, "A", None, Some(vec![1.0, 0.0])),
            (2, "Zero", None, Some(vec![0.0, 0.0])),
        ]);
        let err = content(&sources(&store), &liked(&[1]), 5).unwrap_err();
        assert!(matches!(err, RecommendError::DegenerateVector(_)));
    }

    #[test]
    fn content_fails_on_zero_query_vector() {
        let store = seeded_store(&[
            (1, "A", None, Some(vec![1.0, 0.0])),
            (2, "Opposite", None, Some(vec![-1.0, 0.0])),
            (3, "C", None, Some(vec![0.0, 1.0])),
        ]);
        let err = content(&sources(&store), &liked(&[1, 2]), 5).unwrap_err();
        assert!(matches!(err, RecommendError::DegenerateVector(_)));
    }

    #[test]
    fn latest_sorts_by_year_with_unknown_last() {
        let store = seeded_store(&[
            (1, "A", Some(2020), None),
            (2, "B", Some(2023), None),
            (3, "C", Some(2010), None),
            (4, "D", None, None),
        ]);
        let outcome = latest(&sources(&store), &liked(&[99]), 2).unwrap();
        assert_eq!(ids(&outcome), vec![id(2), id(1)]);

        let outcome = latest(&sources(&store), &liked(&[2]), 10).unwrap();
        assert_eq!(ids(&outcome), vec![id(1), id(3), id(4)]);
    }

    #[test]
    fn popularity_without_any_likes_is_no_data() {
        let store = seeded_store(&[(1, "A", None, None), (2, "B", None, None)]);
        let outcome = popularity(&sources(&store), &liked(&[1]), 5).unwrap();
        assert_eq!(outcome, Outcome::NoData(NoData::NoInteractions));
    }

    #[test]
    fn popularity_filtered_to_nothing_is_an_empty_ranking() {
        let store = seeded_store(&[(1, "A", None, None), (2, "B", None, None)]);
        store.add_like(user(1), id(1)).unwrap();
        let outcome = popularity(&sources(&store), &liked(&[1]), 5).unwrap();
        assert_eq!(outcome, Outcome::Ranked(Vec::new()));
    }

    #[test]
    fn popularity_ranks_by_distinct_likers_and_omits_unliked() {
        let store = seeded_store(&[
            (1, "A", None, None),
            (2, "B", None, None),
            (3, "C", None, None),
            (4, "Nobody", None, None),
        ]);
        store.replace_likes(user(1), &[id(2), id(3)]).unwrap();
        store.replace_likes(user(2), &[id(3)]).unwrap();
        let outcome = popularity(&sources(&store), &liked(&[1]), 10).unwrap();
        assert_eq!(ids(&outcome), vec![id(3), id(2)]);
    }

    #[test]
    fn user_based_counts_co_likers() {
        let store = seeded_store(&[
            (1, "Liked", None, None),
            (2, "B", None, None),
            (3, "C", None, None),
            (4, "Unrelated", None, None),
        ]);
        store.replace_likes(user(1), &[id(1), id(2), id(3)]).unwrap();
        store.replace_likes(user(2), &[id(1), id(3)]).unwrap();
        store.replace_likes(user(3), &[id(4)]).unwrap();

        let outcome = user_based(&sources(&store), &liked(&[1]), 10).unwrap();
        assert_eq!(ids(&outcome), vec![id(3), id(2)]);
    }

    #[test]
    fn user_based_without_co_likers_is_empty() {
        let store = seeded_store(&[(1, "A", None, None), (2, "B", None, None)]);
        store.add_like(user(1), id(2)).unwrap();
        let outcome = user_based(&sources(&store), &liked(&[1]), 10).unwrap();
        assert_eq!(outcome, Outcome::Ranked(Vec::new()));
    }

    #[test]
    fn hybrid_puts_content_before_popularity() {
        let store = seeded_store(&[
            (1, "Liked", None, Some(vec![1.0, 0.0])),
            (2, "Similar", None, Some(vec![0.9, 0.1])),
            (3, "Popular", None, Some(vec![0.0, 1.0])),
            (4, "Unembedded hit", None, None),
        ]);
        store.replace_likes(user(1), &[id(4), id(3)]).unwrap();
        store.replace_likes(user(2), &[id(4)]).unwrap();

        let outcome = hybrid(&sources(&store), &liked(&[1]), 3).unwrap();
        assert_eq!(ids(&outcome), vec![id(2), id(3), id(4)]);

        let outcome = hybrid(&sources(&store), &liked(&[1]), 1).unwrap();
        assert_eq!(ids(&outcome), vec![id(2)]);
    }

    #[test]
    fn hybrid_falls_back_to_popularity_without_vectors() {
        let store = seeded_store(&[(1, "Liked", None, None), (2, "B", None, None)]);
        store.add_like(user(1), id(2)).unwrap();
        let outcome = hybrid(&sources(&store), &liked(&[1]), 5).unwrap();
        assert_eq!(ids(&outcome), vec![id(2)]);
    }

    #[test]
    fn hybrid_survives_degenerate_content() {
        // Liked vectors cancel out, so the content mean has zero norm.
        let store = seeded_store(&[
            (1, "A", None, Some(vec![1.0, 0.0])),
            (2, "B", None, Some(vec![-1.0, 0.0])),
            (3, "Popular", None, Some(vec![0.0, 1.0])),
        ]);
        store.add_like(user(1), id(3)).unwrap();
        assert!(content(&sources(&store), &liked(&[1, 2]), 5).is_err());
        let outcome = hybrid(&sources(&store), &liked(&[1, 2]), 5).unwrap();
        assert_eq!(ids(&outcome), vec![id(3)]);

        // Every embedded candidate is degenerate; an unembedded item is popular.
        let store = seeded_store(&[
            (1, "Liked", None, Some(vec![1.0, 0.0])),
            (2, "Zero", None, Some(vec![0.0, 0.0])),
            (3, "Popular", None, None),
        ]);
        store.add_like(user(1), id(3)).unwrap();
        assert!(content(&sources(&store), &liked(&[1]), 5).is_err());
        let outcome = hybrid(&sources(&store), &liked(&[1]), 5).unwrap();
        assert_eq!(ids(&outcome), vec![id(3)]);
    }

    #[test]
    fn hybrid_degenerate_content_without_popularity_fails() {
        let store = seeded_store(&[
            (1, "A", None, Some(vec![1.0, 0.0])),
            (2, "B", None, Some(vec![-1.0, 0.0])),
            (3, "C", None, Some(vec![0.0, 1.0])),
        ]);
        let err = hybrid(&sources(&store), &liked(&[1, 2]), 5).unwrap_err();
        assert!(matches!(err, RecommendError::DegenerateVector(_)));
    }

    #[test]
    fn hybrid_with_no_signal_reports_no_data() {
        let store = seeded_store(&[(1, "Liked", None, None), (2, "B", None, None)]);
        let outcome = hybrid(&sources(&store), &liked(&[1]), 5).unwrap();
        assert_eq!(outcome, Outcome::NoData(NoData::UnembeddedLikes));
    }
}
