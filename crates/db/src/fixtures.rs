use serde::Serialize;
use sqlx::{Executor, QueryBuilder, Sqlite};

use crate::connection::DbPool;
use crate::repositories::{push_id_list, RepositoryError};

const SEED_CATEGORY_IDS: &[i64] = &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10];

/// Parent links the recommendation strategies depend on for sibling lookups.
const SEED_CATEGORY_PARENTS: &[(i64, i64)] = &[(5, 1), (6, 1), (7, 1), (8, 2), (9, 3), (10, 3)];

const SEED_LISTINGS: &[SeedListingContract] = &[
    SeedListingContract {
        id: 1,
        label: "listing-iphone-13-128",
        title: "iPhone 13 128GB",
        category_id: 5,
        status: "active",
        attribute_count: 2,
    },
    SeedListingContract {
        id: 2,
        label: "listing-iphone-13-256",
        title: "iPhone 13 256GB",
        category_id: 5,
        status: "active",
        attribute_count: 2,
    },
    SeedListingContract {
        id: 3,
        label: "listing-pixel-7",
        title: "Pixel 7",
        category_id: 5,
        status: "active",
        attribute_count: 2,
    },
    SeedListingContract {
        id: 4,
        label: "listing-ipad-air",
        title: "iPad Air",
        category_id: 6,
        status: "active",
        attribute_count: 0,
    },
    SeedListingContract {
        id: 5,
        label: "listing-galaxy-tab",
        title: "Galaxy Tab S8",
        category_id: 6,
        status: "active",
        attribute_count: 0,
    },
    SeedListingContract {
        id: 6,
        label: "listing-thinkpad",
        title: "ThinkPad X1 Carbon",
        category_id: 7,
        status: "active",
        attribute_count: 0,
    },
    SeedListingContract {
        id: 7,
        label: "listing-golf",
        title: "VW Golf 2017",
        category_id: 8,
        status: "active",
        attribute_count: 3,
    },
    SeedListingContract {
        id: 8,
        label: "listing-octavia",
        title: "Skoda Octavia 2018",
        category_id: 8,
        status: "active",
        attribute_count: 3,
    },
    SeedListingContract {
        id: 9,
        label: "listing-sofa",
        title: "Three-seat sofa",
        category_id: 9,
        status: "active",
        attribute_count: 0,
    },
    SeedListingContract {
        id: 10,
        label: "listing-dining-table",
        title: "Oak dining table",
        category_id: 10,
        status: "sold",
        attribute_count: 0,
    },
    SeedListingContract {
        id: 11,
        label: "listing-rust-book",
        title: "Rust in Action",
        category_id: 4,
        status: "active",
        attribute_count: 0,
    },
    SeedListingContract {
        id: 12,
        label: "listing-iphone-12",
        title: "iPhone 12",
        category_id: 5,
        status: "archived",
        attribute_count: 0,
    },
];

const SEED_EVENT_IDS: &[i64] = &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17];

/// Anonymous rows in the seeded interaction log.
const SEED_ANONYMOUS_EVENTS: i64 = 2;

/// Demo marketplace used by `marketrank seed` and the integration suites.
///
/// Seeds a two-level category tree, listings in every status the engine
/// distinguishes, typed attributes for the tie-breaker, and a week of
/// identified plus anonymous interactions.
pub struct DemoMarketplaceDataset;

impl DemoMarketplaceDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_marketplace.sql");

    /// Load the dataset. Rows that already exist are left untouched.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;

        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        let listings_seeded = SEED_LISTINGS
            .iter()
            .map(|listing| ListingSeedInfo {
                listing_id: listing.id,
                title: listing.title,
                status: listing.status,
            })
            .collect::<Vec<_>>();

        Ok(SeedResult {
            categories_seeded: SEED_CATEGORY_IDS.len(),
            listings_seeded,
            events_seeded: SEED_EVENT_IDS.len(),
        })
    }

    /// Check the seeded rows against the contract above.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        let mut query =
            QueryBuilder::<Sqlite>::new("SELECT COUNT(1) FROM categories WHERE id IN ");
        push_id_list(&mut query, SEED_CATEGORY_IDS.iter().copied());
        let categories: i64 = query.build_query_scalar().fetch_one(pool).await?;
        checks.push(("categories", categories == SEED_CATEGORY_IDS.len() as i64));

        let mut tree_ok = true;
        for (child, parent) in SEED_CATEGORY_PARENTS {
            let linked: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM categories WHERE id = ?1 AND parent_id = ?2)",
            )
            .bind(*child)
            .bind(*parent)
            .fetch_one(pool)
            .await?;
            tree_ok &= linked == 1;
        }
        checks.push(("category-tree", tree_ok));

        for listing in SEED_LISTINGS {
            let present: i64 = sqlx::query_scalar(
                "SELECT EXISTS(
                    SELECT 1 FROM listings
                    WHERE id = ?1 AND title = ?2 AND category_id = ?3 AND status = ?4
                 )",
            )
            .bind(listing.id)
            .bind(listing.title)
            .bind(listing.category_id)
            .bind(listing.status)
            .fetch_one(pool)
            .await?;

            let attributes: i64 =
                sqlx::query_scalar("SELECT COUNT(1) FROM listing_attributes WHERE listing_id = ?1")
                    .bind(listing.id)
                    .fetch_one(pool)
                    .await?;

            checks.push((listing.label, present == 1 && attributes == listing.attribute_count));
        }

        let mut query =
            QueryBuilder::<Sqlite>::new("SELECT COUNT(1) FROM interaction_events WHERE id IN ");
        push_id_list(&mut query, SEED_EVENT_IDS.iter().copied());
        let events: i64 = query.build_query_scalar().fetch_one(pool).await?;
        checks.push(("interaction-events", events == SEED_EVENT_IDS.len() as i64));

        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT COUNT(1) FROM interaction_events WHERE user_id IS NULL AND id IN ",
        );
        push_id_list(&mut query, SEED_EVENT_IDS.iter().copied());
        let anonymous: i64 = query.build_query_scalar().fetch_one(pool).await?;
        checks.push(("anonymous-events", anonymous == SEED_ANONYMOUS_EVENTS));

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }

    /// Remove the seeded rows, children before parents.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;
        let listing_ids = SEED_LISTINGS.iter().map(|listing| listing.id).collect::<Vec<_>>();

        let mut query = QueryBuilder::<Sqlite>::new("DELETE FROM interaction_events WHERE id IN ");
        push_id_list(&mut query, SEED_EVENT_IDS.iter().copied());
        query.build().execute(&mut *tx).await?;

        let mut query =
            QueryBuilder::<Sqlite>::new("DELETE FROM listing_attributes WHERE listing_id IN ");
        push_id_list(&mut query, listing_ids.iter().copied());
        query.build().execute(&mut *tx).await?;

        let mut query = QueryBuilder::<Sqlite>::new("DELETE FROM listings WHERE id IN ");
        push_id_list(&mut query, listing_ids.iter().copied());
        query.build().execute(&mut *tx).await?;

        // leaves before roots so parent links never dangle mid-delete
        let mut query = QueryBuilder::<Sqlite>::new(
            "DELETE FROM categories WHERE parent_id IS NOT NULL AND id IN ",
        );
        push_id_list(&mut query, SEED_CATEGORY_IDS.iter().copied());
        query.build().execute(&mut *tx).await?;

        let mut query = QueryBuilder::<Sqlite>::new("DELETE FROM categories WHERE id IN ");
        push_id_list(&mut query, SEED_CATEGORY_IDS.iter().copied());
        query.build().execute(&mut *tx).await?;

        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct SeedListingContract {
    id: i64,
    label: &'static str,
    title: &'static str,
    category_id: i64,
    status: &'static str,
    attribute_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeedResult {
    pub categories_seeded: usize,
    pub listings_seeded: Vec<ListingSeedInfo>,
    pub events_seeded: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListingSeedInfo {
    pub listing_id: i64,
    pub title: &'static str,
    pub status: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

impl VerificationResult {
    pub fn failed_checks(&self) -> Vec<&'static str> {
        self.checks.iter().filter(|(_, ok)| !ok).map(|(label, _)| *label).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{DemoMarketplaceDataset, SEED_LISTINGS};
    use crate::{connect_with_settings, migrations};

    async fn setup_pool() -> crate::DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30)
            .await
            .expect("connect to in-memory db");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    #[tokio::test]
    async fn seed_load_verify_clean_round_trip() {
        let pool = setup_pool().await;

        let seeded = DemoMarketplaceDataset::load(&pool).await.expect("load");
        assert_eq!(seeded.categories_seeded, 10);
        assert_eq!(seeded.listings_seeded.len(), SEED_LISTINGS.len());
        assert_eq!(seeded.events_seeded, 17);

        let verification = DemoMarketplaceDataset::verify(&pool).await.expect("verify");
        assert!(verification.all_present, "failed checks: {:?}", verification.failed_checks());

        DemoMarketplaceDataset::clean(&pool).await.expect("clean");
        let after_clean = DemoMarketplaceDataset::verify(&pool).await.expect("verify after clean");
        assert!(!after_clean.all_present);

        let listings: i64 =
            sqlx::query_scalar("SELECT COUNT(1) FROM listings").fetch_one(&pool).await.expect("count");
        assert_eq!(listings, 0);
    }

    #[tokio::test]
    async fn loading_twice_is_idempotent() {
        let pool = setup_pool().await;

        DemoMarketplaceDataset::load(&pool).await.expect("first load");
        DemoMarketplaceDataset::load(&pool).await.expect("second load");

        let events: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM interaction_events")
            .fetch_one(&pool)
            .await
            .expect("count");
        assert_eq!(events, 17);

        let verification = DemoMarketplaceDataset::verify(&pool).await.expect("verify");
        assert!(verification.all_present);
    }

    #[tokio::test]
    async fn verification_flags_a_missing_listing() {
        let pool = setup_pool().await;
        DemoMarketplaceDataset::load(&pool).await.expect("load");

        sqlx::query("DELETE FROM listings WHERE id = 3").execute(&pool).await.expect("delete");

        let verification = DemoMarketplaceDataset::verify(&pool).await.expect("verify");
        assert!(!verification.all_present);
        assert_eq!(verification.failed_checks(), vec!["listing-pixel-7"]);
    }
}
