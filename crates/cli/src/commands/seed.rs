use marketrank_db::{DemoMarketplaceDataset, SeedResult};

use crate::commands::{load_config, migrated_pool, runtime, CommandResult, StepError};

pub fn run() -> CommandResult {
    let config = match load_config("seed") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match runtime("seed") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = migrated_pool(&config).await?;

        let seeded = DemoMarketplaceDataset::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

        let verification = DemoMarketplaceDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

        let run_result: Result<SeedResult, StepError> = if verification.all_present {
            Ok(seeded)
        } else {
            Err(("seed_verification", verification_message(&verification.failed_checks()), 6u8))
        };

        pool.close().await;
        run_result
    });

    match result {
        Ok(seeded) => CommandResult::success("seed", render_summary(&seeded)),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

fn render_summary(seeded: &SeedResult) -> String {
    let listings = seeded
        .listings_seeded
        .iter()
        .map(|listing| {
            format!("  - #{}: {} ({})", listing.listing_id, listing.title, listing.status)
        })
        .collect::<Vec<_>>();
    format!(
        "demo marketplace loaded: {} categories, {} listings, {} interaction events\n{}",
        seeded.categories_seeded,
        seeded.listings_seeded.len(),
        seeded.events_seeded,
        listings.join("\n")
    )
}

fn verification_message(failed_checks: &[&str]) -> String {
    if failed_checks.is_empty() {
        "Some seed data failed to load".to_string()
    } else {
        format!("Seed verification failed for checks: {}", failed_checks.join(", "))
    }
}
