use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite};

use marketrank_core::domain::category::{CategoryId, CategoryNode};
use marketrank_core::domain::listing::{
    ActorId, AttributeSet, AttributeValue, CatalogItem, ListingCondition, ListingId,
    ListingStatus, Location,
};
use marketrank_core::errors::ApplicationError;
use marketrank_core::recommendations::{CatalogReader, CategoryReader, ItemFilter, ItemOrder};

use super::{encode_timestamp, parse_timestamp, parse_u32, push_id_list, RepositoryError};
use crate::DbPool;

const LISTING_COLUMNS: &str = "id, user_id, category_id, title, description, price, condition, \
     status, location, city, country, latitude, longitude, views_count, storefront_id, created_at";

/// Listings, their attributes and the category tree.
pub struct SqlCatalogRepository {
    pool: DbPool,
}

impl SqlCatalogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn save_category(&self, category: &CategoryNode) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO categories (id, parent_id, name) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET parent_id = excluded.parent_id, name = excluded.name",
        )
        .bind(category.id.0)
        .bind(category.parent_id.map(|parent| parent.0))
        .bind(&category.name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Upserts the listing row and replaces its attribute set.
    pub async fn save_listing(&self, item: &CatalogItem) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO listings (
                id, user_id, category_id, title, description, price, condition, status,
                location, city, country, latitude, longitude, views_count, storefront_id,
                created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
             ON CONFLICT(id) DO UPDATE SET
                user_id = excluded.user_id,
                category_id = excluded.category_id,
                title = excluded.title,
                description = excluded.description,
                price = excluded.price,
                condition = excluded.condition,
                status = excluded.status,
                location = excluded.location,
                city = excluded.city,
                country = excluded.country,
                latitude = excluded.latitude,
                longitude = excluded.longitude,
                views_count = excluded.views_count,
                storefront_id = excluded.storefront_id,
                updated_at = excluded.updated_at",
        )
        .bind(item.id.0)
        .bind(item.owner_id.0)
        .bind(item.category_id.0)
        .bind(&item.title)
        .bind(&item.description)
        .bind(item.price.to_string())
        .bind(item.condition.as_str())
        .bind(item.status.as_str())
        .bind(item.location.raw.as_deref())
        .bind(item.location.city.as_deref())
        .bind(item.location.country.as_deref())
        .bind(item.location.latitude)
        .bind(item.location.longitude)
        .bind(i64::from(item.views_count))
        .bind(item.storefront_id)
        .bind(encode_timestamp(item.created_at))
        .bind(encode_timestamp(Utc::now()))
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM listing_attributes WHERE listing_id = ?1")
            .bind(item.id.0)
            .execute(&mut *tx)
            .await?;

        for (name, value) in &item.attributes {
            let (text, number, flag) = match value {
                AttributeValue::Text(text) => (Some(text.as_str()), None, None),
                AttributeValue::Number(number) => (None, Some(*number), None),
                AttributeValue::Boolean(flag) => (None, None, Some(i64::from(*flag))),
            };
            sqlx::query(
                "INSERT INTO listing_attributes
                    (listing_id, name, value_type, value_text, value_number, value_bool)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )
            .bind(item.id.0)
            .bind(name)
            .bind(value.kind())
            .bind(text)
            .bind(number)
            .bind(flag)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn fetch_items(&self, ids: &[ListingId]) -> Result<Vec<CatalogItem>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut query = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {LISTING_COLUMNS} FROM listings WHERE id IN "
        ));
        push_id_list(&mut query, ids.iter().map(|id| id.0));
        query.push(" ORDER BY id ASC");

        let rows = query.build().fetch_all(&self.pool).await?;
        let mut items = rows.into_iter().map(listing_from_row).collect::<Result<Vec<_>, _>>()?;
        self.attach_attributes(&mut items).await?;
        Ok(items)
    }

    async fn fetch_active(&self, filter: &ItemFilter) -> Result<Vec<CatalogItem>, RepositoryError> {
        let mut query = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {LISTING_COLUMNS} FROM listings WHERE status = 'active'"
        ));

        if let Some(category_ids) = &filter.category_ids {
            if category_ids.is_empty() {
                return Ok(Vec::new());
            }
            query.push(" AND category_id IN ");
            push_id_list(&mut query, category_ids.iter().map(|id| id.0));
        }
        if let Some(listing_ids) = &filter.listing_ids {
            if listing_ids.is_empty() {
                return Ok(Vec::new());
            }
            query.push(" AND id IN ");
            push_id_list(&mut query, listing_ids.iter().map(|id| id.0));
        }
        if !filter.exclude_listing_ids.is_empty() {
            query.push(" AND id NOT IN ");
            push_id_list(&mut query, filter.exclude_listing_ids.iter().map(|id| id.0));
        }
        if let Some(cutoff) = filter.created_after {
            query.push(" AND created_at > ").push_bind(encode_timestamp(cutoff));
        }

        query.push(match filter.order {
            Some(ItemOrder::MostViewed) => " ORDER BY views_count DESC, created_at DESC, id ASC",
            Some(ItemOrder::Newest) => " ORDER BY created_at DESC, id DESC",
            None => " ORDER BY id ASC",
        });
        if let Some(limit) = filter.limit {
            query.push(" LIMIT ").push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
        }

        let rows = query.build().fetch_all(&self.pool).await?;
        let mut items = rows.into_iter().map(listing_from_row).collect::<Result<Vec<_>, _>>()?;
        self.attach_attributes(&mut items).await?;
        Ok(items)
    }

    async fn attach_attributes(&self, items: &mut [CatalogItem]) -> Result<(), RepositoryError> {
        if items.is_empty() {
            return Ok(());
        }
        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT listing_id, name, value_type, value_text, value_number, value_bool
             FROM listing_attributes WHERE listing_id IN ",
        );
        push_id_list(&mut query, items.iter().map(|item| item.id.0));

        let mut by_listing: BTreeMap<i64, AttributeSet> = BTreeMap::new();
        for row in query.build().fetch_all(&self.pool).await? {
            let listing_id: i64 = row.try_get("listing_id")?;
            let (name, value) = attribute_from_row(&row)?;
            by_listing.entry(listing_id).or_default().insert(name, value);
        }

        for item in items.iter_mut() {
            if let Some(attributes) = by_listing.remove(&item.id.0) {
                item.attributes = attributes;
            }
        }
        Ok(())
    }

    async fn fetch_categories(
        &self,
        sql: &str,
        bind: i64,
    ) -> Result<Vec<CategoryNode>, RepositoryError> {
        sqlx::query(sql)
            .bind(bind)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(category_from_row)
            .collect()
    }
}

#[async_trait::async_trait]
impl CatalogReader for SqlCatalogRepository {
    async fn get_item(&self, id: ListingId) -> Result<Option<CatalogItem>, ApplicationError> {
        Ok(self.fetch_items(&[id]).await?.into_iter().next())
    }

    async fn get_items(&self, ids: &[ListingId]) -> Result<Vec<CatalogItem>, ApplicationError> {
        Ok(self.fetch_items(ids).await?)
    }

    async fn list_active_items(
        &self,
        filter: &ItemFilter,
    ) -> Result<Vec<CatalogItem>, ApplicationError> {
        Ok(self.fetch_active(filter).await?)
    }
}

#[async_trait::async_trait]
impl CategoryReader for SqlCatalogRepository {
    async fn get_category(
        &self,
        id: CategoryId,
    ) -> Result<Option<CategoryNode>, ApplicationError> {
        let found = self
            .fetch_categories("SELECT id, parent_id, name FROM categories WHERE id = ?1", id.0)
            .await?;
        Ok(found.into_iter().next())
    }

    async fn get_parent(&self, id: CategoryId) -> Result<Option<CategoryNode>, ApplicationError> {
        let found = self
            .fetch_categories(
                "SELECT parent.id, parent.parent_id, parent.name
                 FROM categories child
                 JOIN categories parent ON parent.id = child.parent_id
                 WHERE child.id = ?1",
                id.0,
            )
            .await?;
        Ok(found.into_iter().next())
    }

    async fn list_siblings(&self, id: CategoryId) -> Result<Vec<CategoryNode>, ApplicationError> {
        Ok(self
            .fetch_categories(
                "SELECT id, parent_id, name FROM categories
                 WHERE parent_id IS NOT NULL
                   AND parent_id = (SELECT parent_id FROM categories WHERE id = ?1)
                   AND id <> ?1
                 ORDER BY id ASC",
                id.0,
            )
            .await?)
    }

    async fn find_by_name(&self, fragment: &str) -> Result<Vec<CategoryNode>, ApplicationError> {
        // SQLite's LOWER only folds ASCII, so names are matched with Unicode case folding here.
        let rows = sqlx::query("SELECT id, parent_id, name FROM categories ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(RepositoryError::from)?;

        let mut matches = Vec::new();
        for row in rows {
            let node = category_from_row(row)?;
            if node.name_matches(fragment) {
                matches.push(node);
            }
        }
        Ok(matches)
    }
}

fn listing_from_row(row: SqliteRow) -> Result<CatalogItem, RepositoryError> {
    let price_raw = row.try_get::<String, _>("price")?;
    let price = Decimal::from_str(price_raw.trim())
        .map_err(|error| RepositoryError::Decode(format!("invalid price `{price_raw}`: {error}")))?;

    let condition_raw = row.try_get::<String, _>("condition")?;
    let condition = ListingCondition::parse(&condition_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown listing condition `{condition_raw}`"))
    })?;

    let status_raw = row.try_get::<String, _>("status")?;
    let status = ListingStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown listing status `{status_raw}`")))?;

    Ok(CatalogItem {
        id: ListingId(row.try_get("id")?),
        owner_id: ActorId(row.try_get("user_id")?),
        category_id: CategoryId(row.try_get("category_id")?),
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        price,
        condition,
        status,
        location: Location {
            raw: row.try_get("location")?,
            city: row.try_get("city")?,
            country: row.try_get("country")?,
            latitude: row.try_get("latitude")?,
            longitude: row.try_get("longitude")?,
        },
        views_count: parse_u32("views_count", row.try_get("views_count")?)?,
        storefront_id: row.try_get("storefront_id")?,
        attributes: AttributeSet::new(),
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

fn attribute_from_row(row: &SqliteRow) -> Result<(String, AttributeValue), RepositoryError> {
    let name: String = row.try_get("name")?;
    let kind: String = row.try_get("value_type")?;
    let missing = || RepositoryError::Decode(format!("attribute `{name}` has no {kind} value"));

    let value = match kind.as_str() {
        "text" => {
            let text = row.try_get::<Option<String>, _>("value_text")?;
            AttributeValue::Text(text.ok_or_else(missing)?)
        }
        "number" => {
            let number = row.try_get::<Option<f64>, _>("value_number")?;
            AttributeValue::Number(number.ok_or_else(missing)?)
        }
        "boolean" => {
            let flag = row.try_get::<Option<i64>, _>("value_bool")?;
            AttributeValue::Boolean(flag.ok_or_else(missing)? != 0)
        }
        other => {
            return Err(RepositoryError::Decode(format!("unknown attribute type `{other}`")));
        }
    };
    Ok((name, value))
}

fn category_from_row(row: SqliteRow) -> Result<CategoryNode, RepositoryError> {
    Ok(CategoryNode {
        id: CategoryId(row.try_get("id")?),
        parent_id: row.try_get::<Option<i64>, _>("parent_id")?.map(CategoryId),
        name: row.try_get("name")?,
    })
}
