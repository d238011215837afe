//! Types for the recommendation engine

use serde::{Deserialize, Serialize};

use crate::domain::interaction::{InteractionEvent, InteractionKind};
use crate::domain::listing::{ActorId, CatalogItem, ListingId};
use crate::errors::ApplicationError;

/// Which ranking a caller asked for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationMode {
    Similar,
    Personal,
    Trending,
    New,
    Recommended,
}

impl RecommendationMode {
    pub const ALL: [RecommendationMode; 5] =
        [Self::Similar, Self::Personal, Self::Trending, Self::New, Self::Recommended];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Similar => "similar",
            Self::Personal => "personal",
            Self::Trending => "trending",
            Self::New => "new",
            Self::Recommended => "recommended",
        }
    }

    /// Case-insensitive parse. Unrecognised or empty values select `Trending`.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "similar" => Self::Similar,
            "personal" => Self::Personal,
            "new" => Self::New,
            "recommended" => Self::Recommended,
            _ => Self::Trending,
        }
    }
}

impl Default for RecommendationMode {
    fn default() -> Self {
        Self::Trending
    }
}

/// Inbound recommendation query.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecommendationRequest {
    pub mode: RecommendationMode,
    pub current_item_id: Option<ListingId>,
    pub actor_id: Option<ActorId>,
    /// Category name fragment; empty or `all` disables narrowing.
    pub category: Option<String>,
    /// Signed so that non-positive values can be rejected instead of wrapped.
    pub limit: Option<i64>,
}

impl RecommendationRequest {
    pub fn new(mode: RecommendationMode) -> Self {
        Self { mode, ..Self::default() }
    }

    pub fn with_item(mut self, item: ListingId) -> Self {
        self.current_item_id = Some(item);
        self
    }

    pub fn with_actor(mut self, actor: ActorId) -> Self {
        self.actor_id = Some(actor);
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Resolve the requested limit against the configured default and ceiling.
    pub fn effective_limit(
        &self,
        default_limit: usize,
        max_limit: usize,
    ) -> Result<usize, ApplicationError> {
        match self.limit {
            None => Ok(default_limit.min(max_limit)),
            Some(limit) if limit < 1 => Err(ApplicationError::InvalidInput(format!(
                "limit must be at least 1, got {limit}"
            ))),
            Some(limit) => Ok(usize::try_from(limit).unwrap_or(usize::MAX).min(max_limit)),
        }
    }
}

/// Strategy that produced or contributed to a candidate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    ContentSimilarity,
    Collaborative,
    Personalization,
    Trending,
    Popularity,
    Newest,
    Hybrid,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ContentSimilarity => "content_similarity",
            Self::Collaborative => "collaborative",
            Self::Personalization => "personalization",
            Self::Trending => "trending",
            Self::Popularity => "popularity",
            Self::Newest => "newest",
            Self::Hybrid => "hybrid",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StrategyContribution {
    pub strategy: StrategyKind,
    pub value: f64,
}

/// A catalog item with its score for one ranking pass. Never persisted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub item: CatalogItem,
    pub score: f64,
    /// Attribute overlap with the reference item, only set by content similarity.
    pub attribute_similarity: Option<f64>,
    /// Per-strategy rank contributions, only set by fusion.
    pub contributions: Vec<StrategyContribution>,
}

impl ScoredCandidate {
    pub fn new(item: CatalogItem, score: f64) -> Self {
        Self { item, score, attribute_similarity: None, contributions: Vec::new() }
    }

    pub fn id(&self) -> ListingId {
        self.item.id
    }
}

/// Ordered output of one strategy.
#[derive(Clone, Debug, PartialEq)]
pub struct RankedList {
    pub strategy: StrategyKind,
    pub candidates: Vec<ScoredCandidate>,
}

impl RankedList {
    pub fn new(strategy: StrategyKind, candidates: Vec<ScoredCandidate>) -> Self {
        Self { strategy, candidates }
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn ids(&self) -> Vec<ListingId> {
        self.candidates.iter().map(ScoredCandidate::id).collect()
    }

    pub fn into_items(self) -> Vec<CatalogItem> {
        self.candidates.into_iter().map(|candidate| candidate.item).collect()
    }
}

/// Price profile of an actor's interaction history.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceAffinity {
    pub average: f64,
    pub min: f64,
    pub max: f64,
    pub samples: usize,
}

/// Engagement counters over a set of events for one listing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EngagementSummary {
    pub total_views: u64,
    pub unique_viewers: u64,
    pub favorites: u64,
    pub phone_clicks: u64,
    pub avg_view_duration: f64,
}

impl EngagementSummary {
    pub fn from_events<'a>(events: impl IntoIterator<Item = &'a InteractionEvent>) -> Self {
        let mut summary = Self::default();
        let mut viewers = std::collections::BTreeSet::new();
        let mut duration_total = 0u64;
        let mut duration_samples = 0u64;

        for event in events {
            match event.kind {
                InteractionKind::View => summary.total_views += 1,
                InteractionKind::AddFavorite => summary.favorites += 1,
                InteractionKind::ClickPhone => summary.phone_clicks += 1,
            }
            if let Some(actor) = event.actor_id {
                viewers.insert(actor);
            }
            if let Some(duration) = event.duration_secs {
                duration_total += u64::from(duration);
                duration_samples += 1;
            }
        }

        summary.unique_viewers = viewers.len() as u64;
        if duration_samples > 0 {
            summary.avg_view_duration = duration_total as f64 / duration_samples as f64;
        }
        summary
    }
}

/// Aggregated engagement for a single listing.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ViewStats {
    pub listing_id: ListingId,
    pub views_count: u64,
    pub unique_users: u64,
    pub avg_duration: f64,
    pub favorites: u64,
    pub phone_clicks: u64,
}

impl ViewStats {
    pub fn from_summary(listing_id: ListingId, summary: EngagementSummary) -> Self {
        Self {
            listing_id,
            views_count: summary.total_views,
            unique_users: summary.unique_viewers,
            avg_duration: summary.avg_view_duration,
            favorites: summary.favorites,
            phone_clicks: summary.phone_clicks,
        }
    }
}
