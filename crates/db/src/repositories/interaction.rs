use chrono::{DateTime, SubsecRound, Utc};
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite};
use tracing::debug;

use marketrank_core::domain::category::CategoryId;
use marketrank_core::domain::interaction::{InteractionEvent, InteractionKind, NewInteraction};
use marketrank_core::domain::listing::{ActorId, ListingId};
use marketrank_core::errors::ApplicationError;
use marketrank_core::recommendations::{
    EngagementSummary, EventFilter, InteractionLogReader, InteractionRecorder,
};

use super::{encode_timestamp, parse_timestamp, parse_u32, push_id_list, RepositoryError};
use crate::DbPool;

/// Append-only interaction log.
pub struct SqlInteractionRepository {
    pool: DbPool,
}

impl SqlInteractionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn count(&self) -> Result<i64, RepositoryError> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM interaction_events")
            .fetch_one(&self.pool)
            .await?)
    }

    async fn fetch_events(
        &self,
        filter: &EventFilter,
    ) -> Result<Vec<InteractionEvent>, RepositoryError> {
        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT id, user_id, listing_id, category_id, interaction_type,
                    view_duration_seconds, created_at
             FROM interaction_events
             WHERE 1 = 1",
        );

        if filter.identified_only {
            query.push(" AND user_id IS NOT NULL");
        }
        if let Some(actor_ids) = &filter.actor_ids {
            if actor_ids.is_empty() {
                return Ok(Vec::new());
            }
            query.push(" AND user_id IN ");
            push_id_list(&mut query, actor_ids.iter().map(|actor| actor.0));
        }
        if let Some(excluded) = filter.exclude_actor {
            query.push(" AND (user_id IS NULL OR user_id <> ").push_bind(excluded.0).push(")");
        }
        if let Some(listing_ids) = &filter.listing_ids {
            if listing_ids.is_empty() {
                return Ok(Vec::new());
            }
            query.push(" AND listing_id IN ");
            push_id_list(&mut query, listing_ids.iter().map(|id| id.0));
        }
        if let Some(category_ids) = &filter.category_ids {
            if category_ids.is_empty() {
                return Ok(Vec::new());
            }
            query.push(" AND category_id IN ");
            push_id_list(&mut query, category_ids.iter().map(|id| id.0));
        }
        if let Some(since) = filter.since {
            query.push(" AND created_at > ").push_bind(encode_timestamp(since));
        }
        if let Some(kinds) = &filter.kinds {
            if kinds.is_empty() {
                return Ok(Vec::new());
            }
            query.push(" AND interaction_type IN (");
            let mut separated = query.separated(", ");
            for kind in kinds {
                separated.push_bind(kind.as_str());
            }
            separated.push_unseparated(")");
        }
        query.push(" ORDER BY created_at ASC, id ASC");

        query.build().fetch_all(&self.pool).await?.into_iter().map(event_from_row).collect()
    }

    async fn aggregate_listing(
        &self,
        listing_id: ListingId,
        since: Option<DateTime<Utc>>,
    ) -> Result<EngagementSummary, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                COALESCE(SUM(CASE WHEN interaction_type = 'view' THEN 1 ELSE 0 END), 0) AS total_views,
                COUNT(DISTINCT user_id) AS unique_viewers,
                COALESCE(SUM(CASE WHEN interaction_type = 'add_favorite' THEN 1 ELSE 0 END), 0) AS favorites,
                COALESCE(SUM(CASE WHEN interaction_type = 'click_phone' THEN 1 ELSE 0 END), 0) AS phone_clicks,
                AVG(view_duration_seconds) AS avg_view_duration
             FROM interaction_events
             WHERE listing_id = ?1 AND (?2 IS NULL OR created_at > ?2)",
        )
        .bind(listing_id.0)
        .bind(since.map(encode_timestamp))
        .fetch_one(&self.pool)
        .await?;

        Ok(EngagementSummary {
            total_views: parse_count("total_views", row.try_get("total_views")?)?,
            unique_viewers: parse_count("unique_viewers", row.try_get("unique_viewers")?)?,
            favorites: parse_count("favorites", row.try_get("favorites")?)?,
            phone_clicks: parse_count("phone_clicks", row.try_get("phone_clicks")?)?,
            avg_view_duration: row.try_get::<Option<f64>, _>("avg_view_duration")?.unwrap_or(0.0),
        })
    }

    async fn insert(&self, interaction: NewInteraction) -> Result<InteractionEvent, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO interaction_events
                (user_id, listing_id, category_id, interaction_type, view_duration_seconds, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(interaction.actor_id.map(|actor| actor.0))
        .bind(interaction.listing_id.0)
        .bind(interaction.category_id.0)
        .bind(interaction.kind.as_str())
        .bind(interaction.duration_secs.map(i64::from))
        .bind(encode_timestamp(interaction.created_at))
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        debug!(
            event_name = "interactions.recorded",
            interaction_id = id,
            listing_id = interaction.listing_id.0,
            interaction_type = interaction.kind.as_str(),
            anonymous = interaction.actor_id.is_none(),
            "interaction recorded"
        );

        Ok(InteractionEvent {
            id,
            actor_id: interaction.actor_id,
            listing_id: interaction.listing_id,
            category_id: interaction.category_id,
            kind: interaction.kind,
            duration_secs: interaction.duration_secs,
            created_at: interaction.created_at.trunc_subsecs(0),
        })
    }
}

#[async_trait::async_trait]
impl InteractionLogReader for SqlInteractionRepository {
    async fn list_events(
        &self,
        filter: &EventFilter,
    ) -> Result<Vec<InteractionEvent>, ApplicationError> {
        Ok(self.fetch_events(filter).await?)
    }

    async fn summarize_listing(
        &self,
        listing_id: ListingId,
        since: Option<DateTime<Utc>>,
    ) -> Result<EngagementSummary, ApplicationError> {
        Ok(self.aggregate_listing(listing_id, since).await?)
    }
}

#[async_trait::async_trait]
impl InteractionRecorder for SqlInteractionRepository {
    async fn record(
        &self,
        interaction: NewInteraction,
    ) -> Result<InteractionEvent, ApplicationError> {
        Ok(self.insert(interaction).await?)
    }
}

fn event_from_row(row: SqliteRow) -> Result<InteractionEvent, RepositoryError> {
    let kind_raw = row.try_get::<String, _>("interaction_type")?;
    let kind = InteractionKind::parse(&kind_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown interaction type `{kind_raw}`")))?;

    Ok(InteractionEvent {
        id: row.try_get("id")?,
        actor_id: row.try_get::<Option<i64>, _>("user_id")?.map(ActorId),
        listing_id: ListingId(row.try_get("listing_id")?),
        category_id: CategoryId(row.try_get("category_id")?),
        kind,
        duration_secs: row
            .try_get::<Option<i64>, _>("view_duration_seconds")?
            .map(|value| parse_u32("view_duration_seconds", value))
            .transpose()?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

fn parse_count(column: &str, value: i64) -> Result<u64, RepositoryError> {
    u64::try_from(value)
        .map_err(|_| RepositoryError::Decode(format!("negative aggregate in `{column}`: {value}")))
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use marketrank_core::domain::category::CategoryId;
    use marketrank_core::domain::interaction::{InteractionEvent, InteractionKind, NewInteraction};
    use marketrank_core::domain::listing::{ActorId, ListingId};
    use marketrank_core::recommendations::{
        EngagementSummary, EventFilter, InteractionLogReader, InteractionRecorder,
    };

    use super::SqlInteractionRepository;
    use crate::connect_with_settings;
    use crate::migrations;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 15, 12, 0, 0).unwrap()
    }

    fn new_event(
        actor: Option<i64>,
        listing: i64,
        kind: InteractionKind,
        duration: Option<u32>,
        days_ago: i64,
    ) -> NewInteraction {
        NewInteraction {
            actor_id: actor.map(ActorId),
            listing_id: ListingId(listing),
            category_id: CategoryId(listing % 3 + 1),
            kind,
            duration_secs: duration,
            created_at: now() - Duration::days(days_ago),
        }
    }

    async fn setup() -> SqlInteractionRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlInteractionRepository::new(pool)
    }

    async fn seeded() -> SqlInteractionRepository {
        let repo = setup().await;
        for event in [
            new_event(Some(1), 10, InteractionKind::View, Some(20), 9),
            new_event(Some(1), 10, InteractionKind::View, Some(40), 3),
            new_event(Some(2), 10, InteractionKind::AddFavorite, None, 2),
            new_event(None, 10, InteractionKind::View, Some(30), 1),
            new_event(Some(2), 11, InteractionKind::ClickPhone, None, 1),
            new_event(Some(3), 12, InteractionKind::View, None, 7),
        ] {
            repo.record(event).await.expect("record");
        }
        repo
    }

    fn ids(events: &[InteractionEvent]) -> Vec<i64> {
        events.iter().map(|event| event.id).collect()
    }

    #[tokio::test]
    async fn record_assigns_increasing_ids_and_keeps_anonymous_actor() {
        let repo = setup().await;

        let first = repo
            .record(new_event(None, 10, InteractionKind::View, Some(5), 0))
            .await
            .expect("record");
        let second = repo
            .record(new_event(Some(4), 10, InteractionKind::ClickPhone, None, 0))
            .await
            .expect("record");

        assert!(second.id > first.id);
        assert_eq!(first.actor_id, None);
        assert_eq!(repo.count().await.expect("count"), 2);

        let stored = repo.list_events(&EventFilter::default()).await.expect("list");
        assert_eq!(stored, vec![first, second]);
    }

    #[tokio::test]
    async fn filters_compose_like_the_shared_predicate() {
        let repo = seeded().await;
        let all = repo.list_events(&EventFilter::default()).await.expect("list");
        assert_eq!(all.len(), 6);
        // oldest first
        assert_eq!(ids(&all), vec![1, 6, 2, 3, 4, 5]);

        let filters = [
            EventFilter::for_actor(ActorId(1)),
            EventFilter::default().excluding_actor(ActorId(1)),
            EventFilter::for_listings(vec![ListingId(10)]).since(now() - Duration::days(3)),
            EventFilter { kinds: Some(vec![InteractionKind::View]), ..EventFilter::default() },
            EventFilter::default().in_categories(vec![CategoryId(2)]),
        ];
        for filter in filters {
            let expected: Vec<i64> =
                all.iter().filter(|event| filter.matches(event)).map(|event| event.id).collect();
            let actual = repo.list_events(&filter).await.expect("list");
            assert_eq!(ids(&actual), expected, "filter {filter:?}");
        }

        let nobody = repo.list_events(&EventFilter::for_actors(Vec::new())).await.expect("list");
        assert!(nobody.is_empty());
    }

    #[tokio::test]
    async fn since_bound_is_exclusive() {
        let repo = seeded().await;

        let events = repo
            .list_events(&EventFilter::for_listings(vec![ListingId(12)]).since(now() - Duration::days(7)))
            .await
            .expect("list");

        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn recorded_time_is_whole_seconds() {
        let repo = setup().await;
        let mut event = new_event(Some(1), 10, InteractionKind::View, None, 0);
        event.created_at = now() + Duration::milliseconds(400);

        let recorded = repo.record(event).await.expect("record");
        assert_eq!(recorded.created_at, now());

        let stored = repo
            .list_events(&EventFilter::for_listings(vec![ListingId(10)]).since(now()))
            .await
            .expect("list");
        assert!(stored.is_empty());
    }

    #[tokio::test]
    async fn sql_summary_matches_event_fold() {
        let repo = seeded().await;

        for since in [None, Some(now() - Duration::days(5))] {
            let events = repo
                .list_events(&EventFilter { since, ..EventFilter::for_listings(vec![ListingId(10)]) })
                .await
                .expect("list");
            let folded = EngagementSummary::from_events(&events);
            let aggregated = repo.summarize_listing(ListingId(10), since).await.expect("summary");
            assert_eq!(aggregated, folded);
        }

        let all_time = repo.summarize_listing(ListingId(10), None).await.expect("summary");
        assert_eq!(all_time.total_views, 3);
        assert_eq!(all_time.unique_viewers, 2);
        assert_eq!(all_time.favorites, 1);
        assert!((all_time.avg_view_duration - 30.0).abs() < 1e-9);

        let untouched = repo.summarize_listing(ListingId(404), None).await.expect("summary");
        assert_eq!(untouched, EngagementSummary::default());
    }
}
