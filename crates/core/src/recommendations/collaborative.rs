use std::collections::{BTreeMap, BTreeSet};

use chrono::Duration;
use tracing::debug;

use crate::domain::category::CategoryId;
use crate::domain::listing::{ActorId, ListingId};
use crate::errors::ApplicationError;

use super::engine::RecommendationEngine;
use super::sources::{EventFilter, ItemFilter, ItemOrder};
use super::types::{RankedList, ScoredCandidate, StrategyKind};
use super::{MAX_PEERS, MIN_PEER_SHARED_ITEMS, PEER_WINDOW_DAYS};

/// Overlap of one peer actor with the requesting actor's categories.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PeerOverlap {
    actor: ActorId,
    items: usize,
    categories: usize,
}

impl RecommendationEngine {
    /// Listings touched by actors who recently browsed the same categories.
    ///
    /// An actor without history gets the popularity ranking instead.
    pub async fn collaborative(
        &self,
        actor: ActorId,
        limit: usize,
    ) -> Result<RankedList, ApplicationError> {
        let history = self.interactions.list_events(&EventFilter::for_actor(actor)).await?;
        if history.is_empty() {
            debug!(
                event_name = "recommendations.collaborative.cold_start",
                actor_id = actor.0,
                "actor has no history, serving popularity"
            );
            return self.popular(limit).await;
        }

        let seen: BTreeSet<ListingId> = history.iter().map(|event| event.listing_id).collect();
        let categories: BTreeSet<CategoryId> =
            history.iter().map(|event| event.category_id).collect();

        let since = self.now() - Duration::days(PEER_WINDOW_DAYS);
        let overlapping = self
            .interactions
            .list_events(
                &EventFilter::default()
                    .in_categories(categories.into_iter().collect())
                    .excluding_actor(actor)
                    .since(since),
            )
            .await?;

        let mut per_actor: BTreeMap<ActorId, (BTreeSet<ListingId>, BTreeSet<CategoryId>)> =
            BTreeMap::new();
        for event in &overlapping {
            let Some(peer) = event.actor_id else { continue };
            let entry = per_actor.entry(peer).or_default();
            entry.0.insert(event.listing_id);
            entry.1.insert(event.category_id);
        }

        let peers = rank_peers(per_actor);
        if peers.is_empty() {
            return Ok(RankedList::new(StrategyKind::Collaborative, Vec::new()));
        }

        let peer_events = self
            .interactions
            .list_events(&EventFilter::for_actors(peers.iter().map(|peer| peer.actor).collect()))
            .await?;
        let candidate_ids: Vec<ListingId> = peer_events
            .iter()
            .map(|event| event.listing_id)
            .filter(|id| !seen.contains(id))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if candidate_ids.is_empty() {
            return Ok(RankedList::new(StrategyKind::Collaborative, Vec::new()));
        }

        let mut items = self
            .catalog
            .list_active_items(
                &ItemFilter::default().with_ids(candidate_ids).ordered(ItemOrder::MostViewed),
            )
            .await?;
        items.retain(|item| item.is_active() && !seen.contains(&item.id));
        ItemOrder::MostViewed.sort(&mut items);
        items.truncate(limit);

        let candidates = items
            .into_iter()
            .map(|item| {
                let score = f64::from(item.views_count);
                ScoredCandidate::new(item, score)
            })
            .collect();
        Ok(RankedList::new(StrategyKind::Collaborative, candidates))
    }
}

fn rank_peers(
    per_actor: BTreeMap<ActorId, (BTreeSet<ListingId>, BTreeSet<CategoryId>)>,
) -> Vec<PeerOverlap> {
    let mut peers: Vec<PeerOverlap> = per_actor
        .into_iter()
        .map(|(actor, (items, categories))| PeerOverlap {
            actor,
            items: items.len(),
            categories: categories.len(),
        })
        .filter(|peer| peer.items >= MIN_PEER_SHARED_ITEMS)
        .collect();

    peers.sort_by(|a, b| {
        b.items
            .cmp(&a.items)
            .then_with(|| b.categories.cmp(&a.categories))
            .then_with(|| a.actor.cmp(&b.actor))
    });
    peers.truncate(MAX_PEERS);
    peers
}
