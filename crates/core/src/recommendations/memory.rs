use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::SubsecRound;
use tokio::sync::RwLock;

use crate::domain::category::{CategoryId, CategoryNode};
use crate::domain::interaction::{InteractionEvent, NewInteraction};
use crate::domain::listing::{CatalogItem, ListingId};
use crate::errors::ApplicationError;

use super::sources::{
    CatalogReader, CategoryReader, EventFilter, InteractionLogReader, InteractionRecorder,
    ItemFilter,
};

/// Marketplace state held in memory; implements every reader plus the recorder.
///
/// Timestamps are kept at whole seconds, like the SQL store.
#[derive(Default)]
pub struct InMemoryMarketplace {
    items: RwLock<BTreeMap<ListingId, CatalogItem>>,
    categories: RwLock<BTreeMap<CategoryId, CategoryNode>>,
    events: RwLock<Vec<InteractionEvent>>,
}

impl InMemoryMarketplace {
    pub async fn insert_category(&self, category: CategoryNode) {
        self.categories.write().await.insert(category.id, category);
    }

    pub async fn insert_item(&self, mut item: CatalogItem) {
        item.created_at = item.created_at.trunc_subsecs(0);
        self.items.write().await.insert(item.id, item);
    }

    pub async fn push_event(&self, mut event: InteractionEvent) {
        event.created_at = event.created_at.trunc_subsecs(0);
        let mut events = self.events.write().await;
        if event.id == 0 {
            event.id = events.len() as i64 + 1;
        }
        events.push(event);
    }

    pub async fn event_count(&self) -> usize {
        self.events.read().await.len()
    }
}

#[async_trait]
impl CatalogReader for InMemoryMarketplace {
    async fn get_item(&self, id: ListingId) -> Result<Option<CatalogItem>, ApplicationError> {
        Ok(self.items.read().await.get(&id).cloned())
    }

    async fn get_items(&self, ids: &[ListingId]) -> Result<Vec<CatalogItem>, ApplicationError> {
        let items = self.items.read().await;
        Ok(ids.iter().filter_map(|id| items.get(id).cloned()).collect())
    }

    async fn list_active_items(
        &self,
        filter: &ItemFilter,
    ) -> Result<Vec<CatalogItem>, ApplicationError> {
        let items = self.items.read().await;
        let mut selected: Vec<CatalogItem> = items
            .values()
            .filter(|item| item.is_active())
            .filter(|item| {
                filter.category_ids.as_ref().map_or(true, |ids| ids.contains(&item.category_id))
            })
            .filter(|item| filter.listing_ids.as_ref().map_or(true, |ids| ids.contains(&item.id)))
            .filter(|item| !filter.exclude_listing_ids.contains(&item.id))
            .filter(|item| filter.created_after.map_or(true, |cutoff| item.created_at > cutoff))
            .cloned()
            .collect();

        if let Some(order) = filter.order {
            order.sort(&mut selected);
        }
        if let Some(limit) = filter.limit {
            selected.truncate(limit);
        }
        Ok(selected)
    }
}

#[async_trait]
impl InteractionLogReader for InMemoryMarketplace {
    async fn list_events(
        &self,
        filter: &EventFilter,
    ) -> Result<Vec<InteractionEvent>, ApplicationError> {
        let events = self.events.read().await;
        let mut selected: Vec<InteractionEvent> =
            events.iter().filter(|event| filter.matches(event)).cloned().collect();
        selected.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(selected)
    }
}

#[async_trait]
impl InteractionRecorder for InMemoryMarketplace {
    async fn record(
        &self,
        interaction: NewInteraction,
    ) -> Result<InteractionEvent, ApplicationError> {
        let mut events = self.events.write().await;
        let event = InteractionEvent {
            id: events.len() as i64 + 1,
            actor_id: interaction.actor_id,
            listing_id: interaction.listing_id,
            category_id: interaction.category_id,
            kind: interaction.kind,
            duration_secs: interaction.duration_secs,
            created_at: interaction.created_at.trunc_subsecs(0),
        };
        events.push(event.clone());
        Ok(event)
    }
}

#[async_trait]
impl CategoryReader for InMemoryMarketplace {
    async fn get_category(
        &self,
        id: CategoryId,
    ) -> Result<Option<CategoryNode>, ApplicationError> {
        Ok(self.categories.read().await.get(&id).cloned())
    }

    async fn get_parent(&self, id: CategoryId) -> Result<Option<CategoryNode>, ApplicationError> {
        let categories = self.categories.read().await;
        Ok(categories
            .get(&id)
            .and_then(|node| node.parent_id)
            .and_then(|parent| categories.get(&parent).cloned()))
    }

    async fn list_siblings(&self, id: CategoryId) -> Result<Vec<CategoryNode>, ApplicationError> {
        let categories = self.categories.read().await;
        let Some(node) = categories.get(&id) else {
            return Ok(Vec::new());
        };
        Ok(categories.values().filter(|other| node.is_sibling_of(other)).cloned().collect())
    }

    async fn find_by_name(&self, fragment: &str) -> Result<Vec<CategoryNode>, ApplicationError> {
        let categories = self.categories.read().await;
        Ok(categories.values().filter(|node| node.name_matches(fragment)).cloned().collect())
    }
}
