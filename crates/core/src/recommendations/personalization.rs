use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use crate::domain::interaction::InteractionKind;
use crate::domain::listing::{ActorId, ListingId};
use crate::errors::ApplicationError;

use super::engine::RecommendationEngine;
use super::scoring::{price_affinity, price_bucket};
use super::sources::{EventFilter, ItemFilter};
use super::types::{PriceAffinity, RankedList, ScoredCandidate, StrategyKind};

impl RecommendationEngine {
    /// Price profile of everything the actor viewed, called about or saved.
    pub async fn price_affinity(
        &self,
        actor: ActorId,
    ) -> Result<Option<PriceAffinity>, ApplicationError> {
        let filter =
            EventFilter { kinds: Some(InteractionKind::ALL.to_vec()), ..EventFilter::for_actor(actor) };
        let history = self.interactions.list_events(&filter).await?;
        if history.is_empty() {
            return Ok(None);
        }

        let listing_ids: Vec<ListingId> =
            history.iter().map(|event| event.listing_id).collect::<BTreeSet<_>>().into_iter().collect();
        let prices: BTreeMap<ListingId, f64> = self
            .catalog
            .get_items(&listing_ids)
            .await?
            .into_iter()
            .map(|item| (item.id, item.price_f64()))
            .collect();

        // one sample per event row, so repeat visits weigh in
        Ok(price_affinity(history.iter().filter_map(|event| prices.get(&event.listing_id).copied())))
    }

    /// Unseen listings ranked by how well their price fits the actor's history.
    pub async fn personal(
        &self,
        actor: ActorId,
        category: Option<&str>,
        limit: usize,
    ) -> Result<RankedList, ApplicationError> {
        let category_ids = match self.resolve_category_filter(category).await? {
            Some(ids) if ids.is_empty() => {
                return Ok(RankedList::new(StrategyKind::Personalization, Vec::new()))
            }
            other => other,
        };

        let seen = self.seen_listings(actor).await?;
        let affinity = self.price_affinity(actor).await?;

        let filter = ItemFilter {
            category_ids,
            exclude_listing_ids: seen.iter().copied().collect(),
            ..ItemFilter::default()
        };
        let pool = self.catalog.list_active_items(&filter).await?;

        let mut scored: Vec<ScoredCandidate> = pool
            .into_iter()
            .filter(|item| item.is_active() && !seen.contains(&item.id))
            .filter(|item| {
                affinity.as_ref().map_or(true, |affinity| {
                    let price = item.price_f64();
                    price >= affinity.min && price <= affinity.max
                })
            })
            .map(|item| {
                let score = price_bucket(item.price_f64(), affinity.as_ref());
                ScoredCandidate::new(item, score)
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.item.views_count.cmp(&a.item.views_count))
                .then_with(|| b.item.created_at.cmp(&a.item.created_at))
                .then_with(|| a.item.id.cmp(&b.item.id))
        });
        scored.truncate(limit);

        Ok(RankedList::new(StrategyKind::Personalization, scored))
    }
}
