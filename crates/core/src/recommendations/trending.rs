use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::Duration;

use crate::domain::interaction::InteractionEvent;
use crate::domain::listing::ListingId;
use crate::errors::ApplicationError;

use super::engine::RecommendationEngine;
use super::scoring::{trend_score, TREND_WEIGHTS};
use super::sources::{EventFilter, ItemFilter};
use super::types::{EngagementSummary, RankedList, ScoredCandidate, StrategyKind};
use super::{TRENDING_EVENT_WINDOW_DAYS, TRENDING_MAX_ITEM_AGE_DAYS};

impl RecommendationEngine {
    /// Recent listings ranked by engagement over the trailing week.
    pub async fn trending(&self, limit: usize) -> Result<RankedList, ApplicationError> {
        let now = self.now();
        let pool = self
            .catalog
            .list_active_items(
                &ItemFilter::default()
                    .created_after(now - Duration::days(TRENDING_MAX_ITEM_AGE_DAYS)),
            )
            .await?;
        if pool.is_empty() {
            return Ok(RankedList::new(StrategyKind::Trending, Vec::new()));
        }

        let events = self
            .interactions
            .list_events(
                &EventFilter::for_listings(pool.iter().map(|item| item.id).collect())
                    .since(now - Duration::days(TRENDING_EVENT_WINDOW_DAYS)),
            )
            .await?;
        let mut by_listing: BTreeMap<ListingId, Vec<InteractionEvent>> = BTreeMap::new();
        for event in events {
            by_listing.entry(event.listing_id).or_default().push(event);
        }

        let mut scored: Vec<ScoredCandidate> = pool
            .into_iter()
            .filter(|item| item.is_active())
            .map(|item| {
                let summary = by_listing
                    .get(&item.id)
                    .map(|events| EngagementSummary::from_events(events))
                    .unwrap_or_default();
                let score = trend_score(&summary, &TREND_WEIGHTS);
                ScoredCandidate::new(item, score)
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.item.created_at.cmp(&a.item.created_at))
                .then_with(|| a.item.id.cmp(&b.item.id))
        });
        scored.truncate(limit);

        Ok(RankedList::new(StrategyKind::Trending, scored))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;

    use crate::domain::interaction::InteractionKind;
    use crate::domain::listing::{ListingId, ListingStatus};
    use crate::recommendations::testing::{
        category_tree, days_ago, engine, event, ids, listing, view,
    };
    use crate::recommendations::InMemoryMarketplace;

    #[tokio::test]
    async fn without_events_orders_recent_listings_by_creation() {
        let market = Arc::new(InMemoryMarketplace::default());
        category_tree(&market).await;
        for (id, age) in [(1, 3), (2, 1), (3, 20), (4, 45), (5, 2), (6, 10), (7, 29)] {
            let mut item = listing(id, 9, 100);
            item.created_at = days_ago(age);
            market.insert_item(item).await;
        }

        let ranked = engine(market).trending(5).await.expect("trending");

        assert_eq!(ranked.ids(), [2, 5, 1, 6, 3].map(ListingId).to_vec());
        assert!(ranked.candidates.iter().all(|candidate| candidate.score == 0.0));
    }

    #[tokio::test]
    async fn engagement_in_the_last_week_drives_the_score() {
        let market = Arc::new(InMemoryMarketplace::default());
        category_tree(&market).await;
        for id in 1..=3 {
            let mut item = listing(id, 5, 100);
            item.created_at = days_ago(10 + id);
            market.insert_item(item).await;
        }

        // listing 3: two views by one actor with durations 20 and 40, one favorite
        let mut long_view = view(7, 3, 5, days_ago(1));
        long_view.duration_secs = Some(20);
        market.push_event(long_view.clone()).await;
        long_view.duration_secs = Some(40);
        market.push_event(long_view).await;
        market
            .push_event(event(Some(8), 3, 5, InteractionKind::AddFavorite, days_ago(2)))
            .await;
        // listing 2: an anonymous phone click
        market.push_event(event(None, 2, 5, InteractionKind::ClickPhone, days_ago(1))).await;
        // listing 1: lots of stale views
        for actor in 10..20 {
            market.push_event(view(actor, 1, 5, days_ago(8))).await;
        }

        let ranked = engine(market).trending(10).await.expect("trending");

        assert_eq!(ids(&ranked.clone().into_items()), vec![3, 2, 1]);
        // 2 views * 0.2 + 2 viewers * 0.3 + 1 favorite * 0.25 + 30s * 0.1
        assert!((ranked.candidates[0].score - 4.25).abs() < 1e-9);
        assert!((ranked.candidates[1].score - 0.15).abs() < 1e-9);
        assert_eq!(ranked.candidates[2].score, 0.0);
    }

    #[tokio::test]
    async fn old_and_inactive_listings_are_excluded() {
        let market = Arc::new(InMemoryMarketplace::default());
        category_tree(&market).await;
        let mut old = listing(1, 5, 100);
        old.created_at = days_ago(30) - Duration::seconds(1);
        let mut archived = listing(2, 5, 100);
        archived.created_at = days_ago(1);
        archived.status = ListingStatus::Archived;
        let mut fresh = listing(3, 5, 100);
        fresh.created_at = days_ago(29);
        for item in [old, archived, fresh] {
            market.insert_item(item).await;
        }
        market.push_event(view(1, 1, 5, days_ago(1))).await;
        market.push_event(view(1, 2, 5, days_ago(1))).await;

        let ranked = engine(market).trending(10).await.expect("trending");
        assert_eq!(ranked.ids(), vec![ListingId(3)]);
    }
}
