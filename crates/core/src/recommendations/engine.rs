//! Recommendation engine: mode dispatch, hybrid fusion and view statistics
//!
//! Individual strategies live in sibling modules as `impl RecommendationEngine` blocks.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, SubsecRound, Utc};
use tracing::{debug, info, warn};

use crate::config::RecommendationConfig;
use crate::domain::category::CategoryId;
use crate::domain::listing::{ActorId, CatalogItem, ListingId};
use crate::errors::ApplicationError;

use super::fusion::{FusionWeights, RankFusion};
use super::sources::{CatalogReader, CategoryReader, EventFilter, InteractionLogReader};
use super::types::{
    RankedList, RecommendationMode, RecommendationRequest, StrategyKind, ViewStats,
};
use super::{ALL_CATEGORIES, DEFAULT_LIMIT, MAX_LIMIT};

pub struct RecommendationEngine {
    pub(super) catalog: Arc<dyn CatalogReader>,
    pub(super) interactions: Arc<dyn InteractionLogReader>,
    pub(super) categories: Arc<dyn CategoryReader>,
    fusion: RankFusion,
    default_limit: usize,
    max_limit: usize,
    pinned_now: Option<DateTime<Utc>>,
}

impl RecommendationEngine {
    pub fn new(
        catalog: Arc<dyn CatalogReader>,
        interactions: Arc<dyn InteractionLogReader>,
        categories: Arc<dyn CategoryReader>,
    ) -> Self {
        Self {
            catalog,
            interactions,
            categories,
            fusion: RankFusion::new(),
            default_limit: DEFAULT_LIMIT,
            max_limit: MAX_LIMIT,
            pinned_now: None,
        }
    }

    /// Build from one store that implements every reader.
    pub fn from_source<S>(source: Arc<S>) -> Self
    where
        S: CatalogReader + InteractionLogReader + CategoryReader + 'static,
    {
        Self::new(source.clone(), source.clone(), source)
    }

    pub fn with_config(mut self, config: &RecommendationConfig) -> Self {
        self.fusion = RankFusion::with_weights(FusionWeights {
            collaborative: config.collaborative_weight,
            content: config.content_weight,
            trending: config.trending_weight,
        });
        self.default_limit = config.default_limit;
        self.max_limit = config.max_limit;
        self
    }

    pub fn with_weights(mut self, weights: FusionWeights) -> Self {
        self.fusion = RankFusion::with_weights(weights);
        self
    }

    /// Evaluate every time window against a fixed instant instead of the wall clock.
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.pinned_now = Some(now);
        self
    }

    pub fn weights(&self) -> &FusionWeights {
        self.fusion.weights()
    }

    /// Whole seconds, the precision stored timestamps carry.
    pub(super) fn now(&self) -> DateTime<Utc> {
        self.pinned_now.unwrap_or_else(Utc::now).trunc_subsecs(0)
    }

    /// Dispatch a request to its strategy and return the ordered listings.
    pub async fn recommend(
        &self,
        request: &RecommendationRequest,
    ) -> Result<Vec<CatalogItem>, ApplicationError> {
        Ok(self.rank(request).await?.into_items())
    }

    /// Same as [`Self::recommend`] but keeps scores and contributions.
    pub async fn rank(
        &self,
        request: &RecommendationRequest,
    ) -> Result<RankedList, ApplicationError> {
        let limit = request.effective_limit(self.default_limit, self.max_limit)?;
        let category = request.category.as_deref();

        let ranked = match request.mode {
            RecommendationMode::Similar => {
                let item = request.current_item_id.ok_or_else(|| {
                    ApplicationError::InvalidInput(
                        "current_item_id is required for similar recommendations".to_string(),
                    )
                })?;
                self.similar(item, limit).await?
            }
            RecommendationMode::Personal => {
                let actor = request.actor_id.ok_or_else(|| {
                    ApplicationError::InvalidInput(
                        "actor_id is required for personal recommendations".to_string(),
                    )
                })?;
                self.personal(actor, category, limit).await?
            }
            RecommendationMode::Trending => self.trending(limit).await?,
            RecommendationMode::New => self.newest(category, limit).await?,
            RecommendationMode::Recommended => {
                self.hybrid(request.actor_id, request.current_item_id, limit).await?
            }
        };

        debug!(
            event_name = "recommendations.request.completed",
            mode = request.mode.as_str(),
            strategy = ranked.strategy.as_str(),
            limit,
            returned = ranked.len(),
            "recommendation request completed"
        );
        Ok(ranked)
    }

    /// Fuse collaborative, content similarity and trending by rank position.
    ///
    /// A failing strategy is dropped and the rest still fuse. The actor's seen history is
    /// the exception: content, trending and popularity lists can all hold listings the
    /// actor already saw, so an unreadable history fails the request rather than serve them.
    pub async fn hybrid(
        &self,
        actor: Option<ActorId>,
        item: Option<ListingId>,
        limit: usize,
    ) -> Result<RankedList, ApplicationError> {
        let budget = limit.saturating_mul(2);

        let collaborative = async {
            match actor {
                Some(actor) => Some(self.collaborative(actor, budget).await),
                None => None,
            }
        };
        let content = async {
            match item {
                Some(item) => Some(self.similar(item, budget).await),
                None => None,
            }
        };
        let seen = async {
            match actor {
                Some(actor) => self.seen_listings(actor).await,
                None => Ok(BTreeSet::new()),
            }
        };

        let (collaborative, content, trending, seen) =
            tokio::join!(collaborative, content, self.trending(budget), seen);
        let seen = seen.map_err(|error| {
            warn!(
                event_name = "recommendations.seen_lookup.failed",
                actor_id = actor.map(|actor| actor.0),
                error = %error,
                "seen listings unavailable, refusing to fuse"
            );
            error
        })?;

        let mut lists = Vec::new();
        let mut failure: Option<ApplicationError> = None;
        let mut contextual_candidates = false;

        for (strategy, outcome) in [
            (StrategyKind::Collaborative, collaborative),
            (StrategyKind::ContentSimilarity, content),
        ] {
            match outcome {
                None => {}
                Some(Ok(list)) => {
                    contextual_candidates |= !list.is_empty();
                    lists.push(list);
                }
                Some(Err(error)) => record_failure(strategy, error, &mut failure),
            }
        }

        match trending {
            Ok(list) => lists.push(list),
            Err(error) => record_failure(StrategyKind::Trending, error, &mut failure),
        }

        if !contextual_candidates {
            match self.popular(budget).await {
                Ok(list) => lists.push(list),
                Err(error) => record_failure(StrategyKind::Popularity, error, &mut failure),
            }
        }

        if lists.is_empty() {
            if let Some(error) = failure {
                return Err(error);
            }
        }

        let proposed = lists.len();
        let mut fused = self.fusion.fuse(lists);
        fused.retain(|candidate| {
            Some(candidate.id()) != item && !seen.contains(&candidate.id())
        });
        fused.truncate(limit);

        info!(
            event_name = "recommendations.fusion.completed",
            actor_id = actor.map(|actor| actor.0),
            item_id = item.map(|item| item.0),
            lists = proposed,
            popularity_fallback = !contextual_candidates,
            returned = fused.len(),
            "hybrid recommendations fused"
        );

        Ok(RankedList::new(StrategyKind::Hybrid, fused))
    }

    /// Engagement counters for a listing, all-time unless a trailing window is given.
    pub async fn view_stats(
        &self,
        listing_id: ListingId,
        window_days: Option<u32>,
    ) -> Result<ViewStats, ApplicationError> {
        if self.catalog.get_item(listing_id).await?.is_none() {
            return Err(ApplicationError::not_found("listing", listing_id));
        }

        let since = window_days.map(|days| self.now() - Duration::days(i64::from(days)));
        let summary = self.interactions.summarize_listing(listing_id, since).await?;
        Ok(ViewStats::from_summary(listing_id, summary))
    }

    /// Every listing the actor has an event for, any kind, any time.
    pub(super) async fn seen_listings(
        &self,
        actor: ActorId,
    ) -> Result<BTreeSet<ListingId>, ApplicationError> {
        let events = self.interactions.list_events(&EventFilter::for_actor(actor)).await?;
        Ok(events.into_iter().map(|event| event.listing_id).collect())
    }

    /// `None` disables narrowing; `Some(empty)` means nothing can match.
    pub(super) async fn resolve_category_filter(
        &self,
        category: Option<&str>,
    ) -> Result<Option<Vec<CategoryId>>, ApplicationError> {
        let Some(fragment) = category.map(str::trim).filter(|value| !value.is_empty()) else {
            return Ok(None);
        };
        if fragment.eq_ignore_ascii_case(ALL_CATEGORIES) {
            return Ok(None);
        }

        let matches = self.categories.find_by_name(fragment).await?;
        Ok(Some(matches.into_iter().map(|node| node.id).collect()))
    }
}

fn record_failure(
    strategy: StrategyKind,
    error: ApplicationError,
    failure: &mut Option<ApplicationError>,
) {
    warn!(
        event_name = "recommendations.strategy.failed",
        strategy = strategy.as_str(),
        error = %error,
        "strategy dropped from fusion"
    );

    // keep the most severe error for the all-failed case
    let replace = match failure {
        None => true,
        Some(existing) => existing.is_not_found() && !error.is_not_found(),
    };
    if replace {
        *failure = Some(error);
    }
}
