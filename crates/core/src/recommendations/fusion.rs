//! Rank-position fusion of independent strategy outputs

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::domain::listing::ListingId;

use super::types::{RankedList, ScoredCandidate, StrategyContribution, StrategyKind};

/// Weight applied to each contributing strategy's rank curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionWeights {
    pub collaborative: f64,
    pub content: f64,
    pub trending: f64,
}

impl Default for FusionWeights {
    fn default() -> Self {
        super::DEFAULT_FUSION_WEIGHTS
    }
}

impl FusionWeights {
    /// Popularity stands in for the contextual strategies, so it takes their weight.
    pub fn weight_for(&self, strategy: StrategyKind) -> f64 {
        match strategy {
            StrategyKind::Collaborative => self.collaborative,
            StrategyKind::ContentSimilarity => self.content,
            StrategyKind::Trending => self.trending,
            StrategyKind::Popularity => self.collaborative.max(self.content),
            StrategyKind::Personalization | StrategyKind::Newest | StrategyKind::Hybrid => 0.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RankFusion {
    weights: FusionWeights,
}

impl RankFusion {
    pub fn new() -> Self {
        Self { weights: FusionWeights::default() }
    }

    pub fn with_weights(weights: FusionWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &FusionWeights {
        &self.weights
    }

    /// `(1 - i / n) * weight` for the candidate at position `i` of a list of length `n`.
    pub fn positional_contribution(position: usize, list_len: usize, weight: f64) -> f64 {
        if list_len == 0 {
            return 0.0;
        }
        (1.0 - position as f64 / list_len as f64) * weight
    }

    /// Sum contributions per listing and order by total, highest first.
    ///
    /// Ties keep the order in which listings were first proposed across `lists`.
    pub fn fuse(&self, lists: Vec<RankedList>) -> Vec<ScoredCandidate> {
        let mut order: Vec<ListingId> = Vec::new();
        let mut fused: HashMap<ListingId, ScoredCandidate> = HashMap::new();

        for list in lists {
            let weight = self.weights.weight_for(list.strategy);
            let list_len = list.len();

            for (position, candidate) in list.candidates.into_iter().enumerate() {
                let value = Self::positional_contribution(position, list_len, weight);
                let contribution = StrategyContribution { strategy: list.strategy, value };

                let entry = fused.entry(candidate.id()).or_insert_with(|| {
                    order.push(candidate.id());
                    ScoredCandidate {
                        score: 0.0,
                        contributions: Vec::new(),
                        attribute_similarity: candidate.attribute_similarity,
                        item: candidate.item,
                    }
                });
                entry.score += value;
                entry.contributions.push(contribution);
            }
        }

        let mut ranked: Vec<ScoredCandidate> =
            order.into_iter().filter_map(|id| fused.remove(&id)).collect();
        ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        ranked
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    use super::{FusionWeights, RankFusion};
    use crate::domain::category::CategoryId;
    use crate::domain::listing::{
        ActorId, CatalogItem, ListingCondition, ListingId, ListingStatus, Location,
    };
    use crate::recommendations::{RankedList, ScoredCandidate, StrategyKind};

    fn candidate(id: i64) -> ScoredCandidate {
        ScoredCandidate::new(
            CatalogItem {
                id: ListingId(id),
                owner_id: ActorId(1),
                category_id: CategoryId(1),
                title: format!("Listing {id}"),
                description: String::new(),
                price: Decimal::new(100, 0),
                condition: ListingCondition::New,
                status: ListingStatus::Active,
                location: Location::default(),
                views_count: 0,
                storefront_id: None,
                attributes: Default::default(),
                created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            },
            0.0,
        )
    }

    fn list(strategy: StrategyKind, ids: &[i64]) -> RankedList {
        RankedList::new(strategy, ids.iter().map(|id| candidate(*id)).collect())
    }

    #[test]
    fn trending_only_item_at_head_of_ten_receives_exactly_its_weight() {
        let trending: Vec<i64> = (100..110).collect();
        let fused = RankFusion::new().fuse(vec![
            list(StrategyKind::Collaborative, &[1, 2, 3]),
            list(StrategyKind::ContentSimilarity, &[4, 5]),
            list(StrategyKind::Trending, &trending),
        ]);

        let head = fused.iter().find(|c| c.id() == ListingId(100)).expect("trending head");
        assert_eq!(head.contributions.len(), 1);
        assert_eq!(head.contributions[0].strategy, StrategyKind::Trending);
        assert!((head.score - 0.2).abs() < 1e-12, "got {}", head.score);

        let strategies: std::collections::HashSet<StrategyKind> = fused
            .iter()
            .flat_map(|c| c.contributions.iter().map(|contribution| contribution.strategy))
            .collect();
        assert_eq!(strategies.len(), 3);
    }

    #[test]
    fn contributions_sum_across_lists() {
        let fused = RankFusion::new().fuse(vec![
            list(StrategyKind::Collaborative, &[1, 2]),
            list(StrategyKind::Trending, &[2, 3]),
        ]);

        let two = fused.iter().find(|c| c.id() == ListingId(2)).expect("item 2");
        // 0.5 * 0.4 + 1.0 * 0.2
        assert!((two.score - 0.4).abs() < 1e-12);
        assert_eq!(two.contributions.len(), 2);
        assert_eq!(fused[0].id(), ListingId(1));
    }

    #[test]
    fn ties_keep_first_proposed_order() {
        let fused = RankFusion::with_weights(FusionWeights {
            collaborative: 0.4,
            content: 0.4,
            trending: 0.2,
        })
        .fuse(vec![
            list(StrategyKind::Collaborative, &[7, 8]),
            list(StrategyKind::ContentSimilarity, &[9, 10]),
        ]);

        let ids: Vec<i64> = fused.iter().map(|c| c.id().0).collect();
        assert_eq!(ids, vec![7, 9, 8, 10]);
    }

    #[test]
    fn popularity_uses_contextual_weight() {
        let weights = FusionWeights::default();
        assert_eq!(weights.weight_for(StrategyKind::Popularity), 0.4);

        let fused = RankFusion::new().fuse(vec![list(StrategyKind::Popularity, &[1])]);
        assert!((fused[0].score - 0.4).abs() < 1e-12);
    }

    #[test]
    fn empty_lists_fuse_to_nothing() {
        let fused = RankFusion::new().fuse(vec![list(StrategyKind::Trending, &[])]);
        assert!(fused.is_empty());
        assert_eq!(RankFusion::positional_contribution(0, 0, 0.4), 0.0);
    }
}
