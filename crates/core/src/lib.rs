pub mod config;
pub mod domain;
pub mod errors;
pub mod recommendations;

pub use domain::category::{CategoryId, CategoryNode};
pub use domain::interaction::{InteractionEvent, InteractionKind, NewInteraction};
pub use domain::listing::{
    ActorId, AttributeSet, AttributeValue, CatalogItem, ListingCondition, ListingId,
    ListingStatus, Location,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use recommendations::{
    CatalogReader, CategoryReader, EventFilter, InMemoryMarketplace, InteractionLogReader,
    InteractionRecorder, ItemFilter, ItemOrder, RankedList, RecommendationEngine,
    RecommendationMode, RecommendationRequest, ScoredCandidate, StrategyKind, ViewStats,
};
