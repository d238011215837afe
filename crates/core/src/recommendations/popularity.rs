use crate::errors::ApplicationError;

use super::engine::RecommendationEngine;
use super::sources::{ItemFilter, ItemOrder};
use super::types::{RankedList, ScoredCandidate, StrategyKind};

impl RecommendationEngine {
    /// Most viewed active listings. Only fails when the catalog does.
    pub async fn popular(&self, limit: usize) -> Result<RankedList, ApplicationError> {
        let mut items = self
            .catalog
            .list_active_items(&ItemFilter::default().ordered(ItemOrder::MostViewed).limited(limit))
            .await?;
        items.retain(|item| item.is_active());
        ItemOrder::MostViewed.sort(&mut items);
        items.truncate(limit);

        let candidates = items
            .into_iter()
            .map(|item| {
                let score = f64::from(item.views_count);
                ScoredCandidate::new(item, score)
            })
            .collect();
        Ok(RankedList::new(StrategyKind::Popularity, candidates))
    }

    /// Latest active listings, optionally narrowed by category name.
    pub async fn newest(
        &self,
        category: Option<&str>,
        limit: usize,
    ) -> Result<RankedList, ApplicationError> {
        let mut filter = ItemFilter::default().ordered(ItemOrder::Newest).limited(limit);
        match self.resolve_category_filter(category).await? {
            Some(ids) if ids.is_empty() => {
                return Ok(RankedList::new(StrategyKind::Newest, Vec::new()))
            }
            Some(ids) => filter = filter.in_categories(ids),
            None => {}
        }

        let mut items = self.catalog.list_active_items(&filter).await?;
        items.retain(|item| item.is_active());
        ItemOrder::Newest.sort(&mut items);
        items.truncate(limit);

        let candidates = items
            .into_iter()
            .map(|item| {
                let score = item.created_at.timestamp() as f64;
                ScoredCandidate::new(item, score)
            })
            .collect();
        Ok(RankedList::new(StrategyKind::Newest, candidates))
    }
}
