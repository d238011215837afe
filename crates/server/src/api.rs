//! JSON API over the recommendation engine.
//!
//! Every response is wrapped in the same envelope (`success`, `message`, `data`,
//! `correlation_id`). The correlation id is taken from `x-correlation-id` when the
//! caller sends one.

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use marketrank_core::config::{AnonymousInteractionPolicy, AppConfig};
use marketrank_core::{
    ActorId, ApplicationError, AttributeSet, CatalogItem, CategoryId, DomainError,
    InteractionEvent, InteractionKind, InteractionRecorder, InterfaceError, ListingId,
    NewInteraction, RecommendationEngine, RecommendationMode, RecommendationRequest, ViewStats,
};
use marketrank_db::{recommendation_engine, DbPool, SqlInteractionRepository};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

pub const CORRELATION_HEADER: &str = "x-correlation-id";

#[derive(Clone)]
pub struct ApiState {
    engine: Arc<RecommendationEngine>,
    recorder: Arc<dyn InteractionRecorder>,
    anonymous_interactions: AnonymousInteractionPolicy,
}

impl ApiState {
    pub fn new(
        engine: Arc<RecommendationEngine>,
        recorder: Arc<dyn InteractionRecorder>,
        anonymous_interactions: AnonymousInteractionPolicy,
    ) -> Self {
        Self { engine, recorder, anonymous_interactions }
    }

    pub fn from_pool(pool: DbPool, config: &AppConfig) -> Self {
        let engine = recommendation_engine(&pool).with_config(&config.recommendations);
        Self::new(
            Arc::new(engine),
            Arc::new(SqlInteractionRepository::new(pool)),
            config.recommendations.anonymous_interactions,
        )
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/recommendations", get(recommendations))
        .route("/api/v1/interactions", post(record_interaction))
        .route("/api/v1/listings/{id}/view-stats", get(view_stats))
        .with_state(state)
}

#[derive(Debug, Serialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    pub message: String,
    pub data: Option<T>,
    pub correlation_id: String,
}

impl<T> ApiEnvelope<T> {
    fn ok(message: impl Into<String>, data: Option<T>, correlation_id: String) -> Self {
        Self { success: true, message: message.into(), data, correlation_id }
    }
}

impl ApiEnvelope<()> {
    fn failure(message: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
            correlation_id: correlation_id.into(),
        }
    }
}

pub type ApiError = (StatusCode, Json<ApiEnvelope<()>>);

/// Query string of `GET /api/v1/recommendations`.
#[derive(Debug, Default, Deserialize)]
pub struct RecommendationQuery {
    #[serde(rename = "type")]
    pub mode: Option<String>,
    pub category: Option<String>,
    pub current_item_id: Option<i64>,
    pub actor_id: Option<i64>,
    pub limit: Option<i64>,
}

impl RecommendationQuery {
    fn into_request(self) -> RecommendationRequest {
        let mode = self.mode.as_deref().map(RecommendationMode::parse).unwrap_or_default();
        RecommendationRequest {
            mode,
            current_item_id: self.current_item_id.map(ListingId),
            actor_id: self.actor_id.map(ActorId),
            category: self.category,
            limit: self.limit,
        }
    }
}

/// Public projection of a listing. Scores stay internal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListingView {
    pub id: i64,
    pub user_id: i64,
    pub category_id: i64,
    pub title: String,
    pub description: String,
    pub price: String,
    pub condition: &'static str,
    pub status: &'static str,
    pub location: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub views_count: u32,
    pub storefront_id: Option<i64>,
    pub attributes: AttributeSet,
    pub created_at: DateTime<Utc>,
}

impl From<CatalogItem> for ListingView {
    fn from(item: CatalogItem) -> Self {
        Self {
            id: item.id.0,
            user_id: item.owner_id.0,
            category_id: item.category_id.0,
            title: item.title,
            description: item.description,
            price: item.price.to_string(),
            condition: item.condition.as_str(),
            status: item.status.as_str(),
            location: item.location.raw,
            city: item.location.city,
            country: item.location.country,
            latitude: item.location.latitude,
            longitude: item.location.longitude,
            views_count: item.views_count,
            storefront_id: item.storefront_id,
            attributes: item.attributes,
            created_at: item.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RecordInteractionBody {
    pub listing_id: i64,
    pub category_id: i64,
    pub interaction_type: String,
    pub view_duration_seconds: Option<u32>,
    pub actor_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ViewStatsQuery {
    pub window_days: Option<u32>,
}

pub async fn recommendations(
    State(state): State<ApiState>,
    headers: HeaderMap,
    query: Result<Query<RecommendationQuery>, QueryRejection>,
) -> Result<Json<ApiEnvelope<Vec<ListingView>>>, ApiError> {
    let correlation_id = correlation_id(&headers);
    let Query(query) =
        query.map_err(|rejection| bad_request(rejection.body_text(), &correlation_id))?;
    let request = query.into_request();

    let items = state
        .engine
        .recommend(&request)
        .await
        .map_err(|error| reject(error, &correlation_id))?;

    info!(
        event_name = "api.recommendations.served",
        correlation_id = %correlation_id,
        mode = request.mode.as_str(),
        returned = items.len(),
        "recommendations served"
    );

    let listings = items.into_iter().map(ListingView::from).collect::<Vec<_>>();
    let message = format!("{} {} recommendations", listings.len(), request.mode.as_str());
    Ok(Json(ApiEnvelope::ok(message, Some(listings), correlation_id)))
}

pub async fn record_interaction(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Result<Json<RecordInteractionBody>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiEnvelope<InteractionEvent>>), ApiError> {
    let correlation_id = correlation_id(&headers);
    let Json(body) =
        body.map_err(|rejection| bad_request(rejection.body_text(), &correlation_id))?;

    let kind = InteractionKind::parse(&body.interaction_type).ok_or_else(|| {
        reject(
            DomainError::UnknownValue {
                field: "interaction_type",
                value: body.interaction_type.clone(),
            }
            .into(),
            &correlation_id,
        )
    })?;

    if body.actor_id.is_none() && state.anonymous_interactions == AnonymousInteractionPolicy::Drop
    {
        info!(
            event_name = "interactions.anonymous_dropped",
            correlation_id = %correlation_id,
            listing_id = body.listing_id,
            interaction_type = kind.as_str(),
            "anonymous interaction dropped by policy"
        );
        return Ok((
            StatusCode::ACCEPTED,
            Json(ApiEnvelope::ok("anonymous interaction not recorded", None, correlation_id)),
        ));
    }

    let event = state
        .recorder
        .record(NewInteraction {
            actor_id: body.actor_id.map(ActorId),
            listing_id: ListingId(body.listing_id),
            category_id: CategoryId(body.category_id),
            kind,
            duration_secs: body.view_duration_seconds,
            created_at: Utc::now(),
        })
        .await
        .map_err(|error| reject(error, &correlation_id))?;

    Ok((
        StatusCode::CREATED,
        Json(ApiEnvelope::ok("interaction recorded", Some(event), correlation_id)),
    ))
}

pub async fn view_stats(
    State(state): State<ApiState>,
    headers: HeaderMap,
    listing_id: Result<Path<i64>, PathRejection>,
    query: Result<Query<ViewStatsQuery>, QueryRejection>,
) -> Result<Json<ApiEnvelope<ViewStats>>, ApiError> {
    let correlation_id = correlation_id(&headers);
    let Path(listing_id) =
        listing_id.map_err(|rejection| bad_request(rejection.body_text(), &correlation_id))?;
    let Query(query) =
        query.map_err(|rejection| bad_request(rejection.body_text(), &correlation_id))?;

    let stats = state
        .engine
        .view_stats(ListingId(listing_id), query.window_days)
        .await
        .map_err(|error| reject(error, &correlation_id))?;

    Ok(Json(ApiEnvelope::ok("view statistics", Some(stats), correlation_id)))
}

fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn bad_request(message: String, correlation_id: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(ApiEnvelope::failure(message, correlation_id)))
}

fn reject(error: ApplicationError, correlation_id: &str) -> ApiError {
    let interface = error.into_interface(correlation_id);
    let status = match &interface {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };

    // storage details stay in the log
    let message = if status.is_server_error() {
        warn!(
            event_name = "api.request.failed",
            correlation_id = %interface.correlation_id(),
            status = status.as_u16(),
            error = %interface,
            "request failed"
        );
        interface.user_message().to_string()
    } else {
        interface.message().to_string()
    };

    (status, Json(ApiEnvelope::failure(message, interface.correlation_id())))
}
