use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;

use crate::domain::category::{CategoryId, CategoryNode};
use crate::domain::interaction::{InteractionEvent, InteractionKind};
use crate::domain::listing::{
    ActorId, CatalogItem, ListingCondition, ListingId, ListingStatus, Location,
};
use crate::errors::ApplicationError;

use super::engine::RecommendationEngine;
use super::memory::InMemoryMarketplace;
use super::sources::{CatalogReader, EventFilter, InteractionLogReader, ItemFilter};

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 15, 12, 0, 0).unwrap()
}

pub fn days_ago(days: i64) -> DateTime<Utc> {
    now() - Duration::days(days)
}

pub fn listing(id: i64, category: i64, price: i64) -> CatalogItem {
    CatalogItem {
        id: ListingId(id),
        owner_id: ActorId(900),
        category_id: CategoryId(category),
        title: format!("Listing {id}"),
        description: String::new(),
        price: Decimal::new(price, 0),
        condition: ListingCondition::Used,
        status: ListingStatus::Active,
        location: Location::default(),
        views_count: 0,
        storefront_id: None,
        attributes: Default::default(),
        created_at: days_ago(200),
    }
}

pub fn event(
    actor: Option<i64>,
    listing: i64,
    category: i64,
    kind: InteractionKind,
    at: DateTime<Utc>,
) -> InteractionEvent {
    InteractionEvent {
        id: 0,
        actor_id: actor.map(ActorId),
        listing_id: ListingId(listing),
        category_id: CategoryId(category),
        kind,
        duration_secs: None,
        created_at: at,
    }
}

pub fn view(actor: i64, listing: i64, category: i64, at: DateTime<Utc>) -> InteractionEvent {
    event(Some(actor), listing, category, InteractionKind::View, at)
}

/// Electronics(1) > Phones(5), Tablets(6); Furniture(2) > Sofas(9); Books(3) is a root.
pub async fn category_tree(market: &InMemoryMarketplace) {
    for (id, parent, name) in [
        (1, None, "Electronics"),
        (2, None, "Furniture"),
        (3, None, "Books"),
        (5, Some(1), "Phones"),
        (6, Some(1), "Tablets"),
        (9, Some(2), "Sofas"),
    ] {
        market
            .insert_category(CategoryNode {
                id: CategoryId(id),
                parent_id: parent.map(CategoryId),
                name: name.to_string(),
            })
            .await;
    }
}

pub fn engine(market: Arc<InMemoryMarketplace>) -> RecommendationEngine {
    RecommendationEngine::from_source(market).with_now(now())
}

pub fn ids(items: &[CatalogItem]) -> Vec<i64> {
    items.iter().map(|item| item.id.0).collect()
}

/// Interaction log that fails every read.
pub struct UnavailableLog;

#[async_trait]
impl InteractionLogReader for UnavailableLog {
    async fn list_events(
        &self,
        _filter: &EventFilter,
    ) -> Result<Vec<InteractionEvent>, ApplicationError> {
        Err(unavailable("interaction log"))
    }
}

/// Catalog that fails every read.
pub struct UnavailableCatalog;

#[async_trait]
impl CatalogReader for UnavailableCatalog {
    async fn get_item(&self, _id: ListingId) -> Result<Option<CatalogItem>, ApplicationError> {
        Err(unavailable("catalog"))
    }

    async fn get_items(&self, _ids: &[ListingId]) -> Result<Vec<CatalogItem>, ApplicationError> {
        Err(unavailable("catalog"))
    }

    async fn list_active_items(
        &self,
        _filter: &ItemFilter,
    ) -> Result<Vec<CatalogItem>, ApplicationError> {
        Err(unavailable("catalog"))
    }
}

fn unavailable(store: &str) -> ApplicationError {
    ApplicationError::Persistence(format!("{store} unavailable"))
}
