use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{QueryBuilder, Sqlite};
use thiserror::Error;

use marketrank_core::errors::ApplicationError;
use marketrank_core::recommendations::RecommendationEngine;

use crate::DbPool;

pub mod catalog;
pub mod interaction;

pub use catalog::SqlCatalogRepository;
pub use interaction::SqlInteractionRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for ApplicationError {
    fn from(error: RepositoryError) -> Self {
        ApplicationError::Persistence(error.to_string())
    }
}

/// Engine wired to the SQL catalog, category tree and interaction log.
pub fn recommendation_engine(pool: &DbPool) -> RecommendationEngine {
    let catalog = Arc::new(SqlCatalogRepository::new(pool.clone()));
    let interactions = Arc::new(SqlInteractionRepository::new(pool.clone()));
    RecommendationEngine::new(catalog.clone(), interactions, catalog)
}

/// Timestamps are stored as RFC 3339 text at second precision in UTC.
pub(crate) fn encode_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub(crate) fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

pub(crate) fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative u32): {value}"
        ))
    })
}

/// Appends an `IN` operand for `ids`.
///
/// The whole list travels as one JSON array bound to a single parameter, so the
/// statement stays under SQLite's host parameter limit whatever the list size.
pub(crate) fn push_id_list(query: &mut QueryBuilder<'_, Sqlite>, ids: impl IntoIterator<Item = i64>) {
    let encoded = serde_json::Value::from(ids.into_iter().collect::<Vec<i64>>()).to_string();
    query.push("(SELECT value FROM json_each(").push_bind(encoded).push("))");
}
