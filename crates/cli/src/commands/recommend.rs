use marketrank_core::{
    ActorId, ApplicationError, ListingId, RankedList, RecommendationMode, RecommendationRequest,
};
use marketrank_db::recommendation_engine;
use serde::Serialize;

use crate::commands::{load_config, migrated_pool, runtime, CommandResult, StepError};

/// Flags of `marketrank recommend`, already parsed by clap.
#[derive(Debug, Clone, Default)]
pub struct RecommendArgs {
    pub mode: String,
    pub item: Option<i64>,
    pub actor: Option<i64>,
    pub category: Option<String>,
    pub limit: Option<i64>,
}

impl RecommendArgs {
    pub fn to_request(&self) -> RecommendationRequest {
        RecommendationRequest {
            mode: RecommendationMode::parse(&self.mode),
            current_item_id: self.item.map(ListingId),
            actor_id: self.actor.map(ActorId),
            category: self.category.clone(),
            limit: self.limit,
        }
    }
}

#[derive(Debug, Serialize)]
struct RankedRow {
    rank: usize,
    listing_id: i64,
    title: String,
    category_id: i64,
    price: String,
    score: f64,
}

pub fn run(args: &RecommendArgs) -> CommandResult {
    let config = match load_config("recommend") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match runtime("recommend") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };
    let request = args.to_request();

    let result = runtime.block_on(async {
        let pool = migrated_pool(&config).await?;
        let engine = recommendation_engine(&pool).with_config(&config.recommendations);
        let ranked = engine.rank(&request).await.map_err(classify);
        pool.close().await;
        ranked
    });

    match result {
        Ok(ranked) => {
            let message = format!(
                "{} {} recommendations (strategy: {})",
                ranked.len(),
                request.mode.as_str(),
                ranked.strategy.as_str()
            );
            let rows = rows(ranked);
            CommandResult::success_with_data("recommend", message, serde_json::to_value(rows).ok())
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("recommend", error_class, message, exit_code)
        }
    }
}

fn rows(ranked: RankedList) -> Vec<RankedRow> {
    ranked
        .candidates
        .into_iter()
        .enumerate()
        .map(|(position, candidate)| RankedRow {
            rank: position + 1,
            listing_id: candidate.item.id.0,
            title: candidate.item.title,
            category_id: candidate.item.category_id.0,
            price: candidate.item.price.to_string(),
            score: candidate.score,
        })
        .collect()
}

fn classify(error: ApplicationError) -> StepError {
    match error {
        ApplicationError::Domain(_) | ApplicationError::InvalidInput(_) => {
            ("invalid_input", error.to_string(), 7)
        }
        ApplicationError::NotFound { .. } => ("not_found", error.to_string(), 8),
        ApplicationError::Persistence(_) | ApplicationError::Configuration(_) => {
            ("recommendation", error.to_string(), 9)
        }
    }
}
