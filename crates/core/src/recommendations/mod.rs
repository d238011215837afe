//! Hybrid recommendation engine
//!
//! Ranks marketplace listings for a browsing context using content similarity,
//! collaborative filtering over peer actors, price personalization, short-window
//! trending and a popularity fallback. The `recommended` mode fuses the contextual
//! strategies by rank position.

mod collaborative;
mod content;
mod engine;
mod fusion;
mod memory;
mod personalization;
mod popularity;
pub mod scoring;
mod sources;
#[cfg(test)]
mod testing;
mod trending;
mod types;

pub use engine::RecommendationEngine;
pub use fusion::{FusionWeights, RankFusion};
pub use memory::InMemoryMarketplace;
pub use sources::{
    CatalogReader, CategoryReader, EventFilter, InteractionLogReader, InteractionRecorder,
    ItemFilter, ItemOrder,
};
pub use types::*;

/// Default rank-fusion weights.
pub const DEFAULT_FUSION_WEIGHTS: FusionWeights =
    FusionWeights { collaborative: 0.40, content: 0.40, trending: 0.20 };

/// Results returned when the caller does not ask for a limit.
pub const DEFAULT_LIMIT: usize = 10;

/// Upper bound a requested limit is clamped to.
pub const MAX_LIMIT: usize = 100;

/// Trailing window used to find peer actors.
pub const PEER_WINDOW_DAYS: i64 = 30;

/// Distinct items a peer must have touched in the shared categories.
pub const MIN_PEER_SHARED_ITEMS: usize = 3;

/// Peers kept after ranking.
pub const MAX_PEERS: usize = 20;

/// Trailing window of events that feed the trend score.
pub const TRENDING_EVENT_WINDOW_DAYS: i64 = 7;

/// Maximum listing age for the trending pool.
pub const TRENDING_MAX_ITEM_AGE_DAYS: i64 = 30;

/// Category filter value that disables category narrowing.
pub const ALL_CATEGORIES: &str = "all";
