use std::cmp::Ordering;

use crate::domain::listing::{CatalogItem, ListingId};
use crate::errors::ApplicationError;

use super::engine::RecommendationEngine;
use super::scoring::{attribute_similarity, content_score, CategoryRelation};
use super::sources::ItemFilter;
use super::types::{RankedList, ScoredCandidate, StrategyKind};

impl RecommendationEngine {
    /// Listings from the reference item's category and its siblings, scored 0-100.
    pub async fn similar(
        &self,
        reference_id: ListingId,
        limit: usize,
    ) -> Result<RankedList, ApplicationError> {
        let reference = self
            .catalog
            .get_item(reference_id)
            .await?
            .filter(CatalogItem::is_active)
            .ok_or_else(|| ApplicationError::not_found("listing", reference_id))?;

        let mut category_ids = vec![reference.category_id];
        category_ids.extend(
            self.categories
                .list_siblings(reference.category_id)
                .await?
                .into_iter()
                .map(|node| node.id),
        );

        let pool = self
            .catalog
            .list_active_items(
                &ItemFilter::default().in_categories(category_ids).excluding([reference.id]),
            )
            .await?;

        let now = self.now();
        let compare_attributes = !reference.attributes.is_empty();
        let mut scored: Vec<ScoredCandidate> = pool
            .into_iter()
            .filter(|item| item.is_active() && item.id != reference.id)
            .map(|item| {
                let relation = if item.category_id == reference.category_id {
                    CategoryRelation::Same
                } else {
                    CategoryRelation::Sibling
                };
                let score = content_score(&reference, &item, relation, now).total();
                let attribute_similarity = compare_attributes
                    .then(|| attribute_similarity(&reference.attributes, &item.attributes));
                ScoredCandidate { attribute_similarity, ..ScoredCandidate::new(item, score) }
            })
            .collect();

        scored.sort_by(compare_similar);
        scored.truncate(limit);

        Ok(RankedList::new(StrategyKind::ContentSimilarity, scored))
    }
}

/// Score desc; attribute similarity only separates equal scores; then views, recency, id.
fn compare_similar(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| {
            let left = a.attribute_similarity.unwrap_or(0.0);
            let right = b.attribute_similarity.unwrap_or(0.0);
            right.partial_cmp(&left).unwrap_or(Ordering::Equal)
        })
        .then_with(|| b.item.views_count.cmp(&a.item.views_count))
        .then_with(|| b.item.created_at.cmp(&a.item.created_at))
        .then_with(|| a.item.id.cmp(&b.item.id))
}
