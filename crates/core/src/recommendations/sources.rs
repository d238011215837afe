//! Read-only collaborators consumed by the recommendation engine

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::category::{CategoryId, CategoryNode};
use crate::domain::interaction::{InteractionEvent, InteractionKind, NewInteraction};
use crate::domain::listing::{ActorId, CatalogItem, ListingId};
use crate::errors::ApplicationError;

use super::types::EngagementSummary;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ItemOrder {
    /// views desc, created desc, id asc
    MostViewed,
    /// created desc, id desc
    Newest,
}

impl ItemOrder {
    pub fn sort(&self, items: &mut [CatalogItem]) {
        match self {
            Self::MostViewed => items.sort_by(|a, b| {
                b.views_count
                    .cmp(&a.views_count)
                    .then_with(|| b.created_at.cmp(&a.created_at))
                    .then_with(|| a.id.cmp(&b.id))
            }),
            Self::Newest => items.sort_by(|a, b| {
                b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id))
            }),
        }
    }
}

/// Narrowing applied to the active item pool. Empty filter means every active item.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ItemFilter {
    pub category_ids: Option<Vec<CategoryId>>,
    pub listing_ids: Option<Vec<ListingId>>,
    pub exclude_listing_ids: Vec<ListingId>,
    /// Exclusive lower bound on creation time.
    pub created_after: Option<DateTime<Utc>>,
    /// Unordered results come back by id ascending.
    pub order: Option<ItemOrder>,
    /// Applied after ordering.
    pub limit: Option<usize>,
}

impl ItemFilter {
    pub fn in_categories(mut self, category_ids: Vec<CategoryId>) -> Self {
        self.category_ids = Some(category_ids);
        self
    }

    pub fn with_ids(mut self, listing_ids: Vec<ListingId>) -> Self {
        self.listing_ids = Some(listing_ids);
        self
    }

    pub fn excluding(mut self, listing_ids: impl IntoIterator<Item = ListingId>) -> Self {
        self.exclude_listing_ids.extend(listing_ids);
        self
    }

    pub fn created_after(mut self, cutoff: DateTime<Utc>) -> Self {
        self.created_after = Some(cutoff);
        self
    }

    pub fn ordered(mut self, order: ItemOrder) -> Self {
        self.order = Some(order);
        self
    }

    pub fn limited(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Narrowing applied to the interaction log.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EventFilter {
    pub actor_ids: Option<Vec<ActorId>>,
    pub exclude_actor: Option<ActorId>,
    /// Drop anonymous events.
    pub identified_only: bool,
    pub listing_ids: Option<Vec<ListingId>>,
    pub category_ids: Option<Vec<CategoryId>>,
    /// Exclusive lower bound on event time.
    pub since: Option<DateTime<Utc>>,
    pub kinds: Option<Vec<InteractionKind>>,
}

impl EventFilter {
    pub fn for_actor(actor: ActorId) -> Self {
        Self { actor_ids: Some(vec![actor]), ..Self::default() }
    }

    pub fn for_actors(actors: Vec<ActorId>) -> Self {
        Self { actor_ids: Some(actors), ..Self::default() }
    }

    pub fn for_listings(listing_ids: Vec<ListingId>) -> Self {
        Self { listing_ids: Some(listing_ids), ..Self::default() }
    }

    pub fn in_categories(mut self, category_ids: Vec<CategoryId>) -> Self {
        self.category_ids = Some(category_ids);
        self
    }

    pub fn excluding_actor(mut self, actor: ActorId) -> Self {
        self.exclude_actor = Some(actor);
        self.identified_only = true;
        self
    }

    pub fn since(mut self, cutoff: DateTime<Utc>) -> Self {
        self.since = Some(cutoff);
        self
    }

    /// Shared predicate so every reader applies identical semantics.
    pub fn matches(&self, event: &InteractionEvent) -> bool {
        if self.identified_only && event.actor_id.is_none() {
            return false;
        }
        if let Some(actors) = &self.actor_ids {
            match event.actor_id {
                Some(actor) if actors.contains(&actor) => {}
                _ => return false,
            }
        }
        if self.exclude_actor.is_some() && event.actor_id == self.exclude_actor {
            return false;
        }
        if let Some(listings) = &self.listing_ids {
            if !listings.contains(&event.listing_id) {
                return false;
            }
        }
        if let Some(categories) = &self.category_ids {
            if !categories.contains(&event.category_id) {
                return false;
            }
        }
        if let Some(since) = self.since {
            if event.created_at <= since {
                return false;
            }
        }
        if let Some(kinds) = &self.kinds {
            if !kinds.contains(&event.kind) {
                return false;
            }
        }
        true
    }
}

#[async_trait]
pub trait CatalogReader: Send + Sync {
    /// Any status.
    async fn get_item(&self, id: ListingId) -> Result<Option<CatalogItem>, ApplicationError>;

    /// Any status, unordered; unknown ids are skipped.
    async fn get_items(&self, ids: &[ListingId]) -> Result<Vec<CatalogItem>, ApplicationError>;

    /// Only `status = active` items.
    async fn list_active_items(
        &self,
        filter: &ItemFilter,
    ) -> Result<Vec<CatalogItem>, ApplicationError>;
}

#[async_trait]
pub trait InteractionLogReader: Send + Sync {
    /// Events oldest first, then by id.
    async fn list_events(
        &self,
        filter: &EventFilter,
    ) -> Result<Vec<InteractionEvent>, ApplicationError>;

    /// Engagement counters for one listing, optionally limited to events after `since`.
    async fn summarize_listing(
        &self,
        listing_id: ListingId,
        since: Option<DateTime<Utc>>,
    ) -> Result<EngagementSummary, ApplicationError> {
        let filter = EventFilter { since, ..EventFilter::for_listings(vec![listing_id]) };
        let events = self.list_events(&filter).await?;
        Ok(EngagementSummary::from_events(&events))
    }
}

/// Append-only write side of the interaction log.
#[async_trait]
pub trait InteractionRecorder: Send + Sync {
    async fn record(&self, interaction: NewInteraction)
        -> Result<InteractionEvent, ApplicationError>;
}

#[async_trait]
pub trait CategoryReader: Send + Sync {
    async fn get_category(&self, id: CategoryId)
        -> Result<Option<CategoryNode>, ApplicationError>;

    async fn get_parent(&self, id: CategoryId) -> Result<Option<CategoryNode>, ApplicationError>;

    /// Categories sharing the non-null parent of `id`, excluding `id` itself.
    async fn list_siblings(&self, id: CategoryId) -> Result<Vec<CategoryNode>, ApplicationError>;

    /// Case-insensitive substring match on the category name.
    async fn find_by_name(&self, fragment: &str) -> Result<Vec<CategoryNode>, ApplicationError>;
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::EventFilter;
    use crate::domain::category::CategoryId;
    use crate::domain::interaction::{InteractionEvent, InteractionKind};
    use crate::domain::listing::{ActorId, ListingId};

    fn event(actor: Option<i64>, listing: i64, days_ago: i64) -> InteractionEvent {
        let now = Utc.with_ymd_and_hms(2026, 5, 10, 0, 0, 0).unwrap();
        InteractionEvent {
            id: listing,
            actor_id: actor.map(ActorId),
            listing_id: ListingId(listing),
            category_id: CategoryId(1),
            kind: InteractionKind::View,
            duration_secs: None,
            created_at: now - Duration::days(days_ago),
        }
    }

    #[test]
    fn excluding_actor_also_drops_anonymous_events() {
        let filter = EventFilter::default().excluding_actor(ActorId(1));

        assert!(!filter.matches(&event(Some(1), 10, 0)));
        assert!(!filter.matches(&event(None, 10, 0)));
        assert!(filter.matches(&event(Some(2), 10, 0)));
    }

    #[test]
    fn since_bound_is_exclusive() {
        let now = Utc.with_ymd_and_hms(2026, 5, 10, 0, 0, 0).unwrap();
        let filter = EventFilter::default().since(now - Duration::days(7));

        assert!(filter.matches(&event(Some(1), 10, 6)));
        assert!(!filter.matches(&event(Some(1), 10, 7)));
    }

    #[test]
    fn actor_filter_never_matches_anonymous_events() {
        let filter = EventFilter::for_actor(ActorId(3));
        assert!(!filter.matches(&event(None, 10, 0)));
        assert!(filter.matches(&event(Some(3), 10, 0)));
    }
}
