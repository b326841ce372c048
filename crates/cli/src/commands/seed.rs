use crate::commands::{with_pool, CommandResult, Failure};
use quorum_db::{DemoDataset, SeedResult};

pub fn run() -> CommandResult {
    let result = with_pool("seed", |_config, pool| async move {
        let seeded = DemoDataset::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

        let verification = DemoDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

        if !verification.all_present {
            let failed_checks = verification
                .checks
                .iter()
                .filter_map(|(check, passed)| (!passed).then_some(*check))
                .collect::<Vec<_>>();
            return Err(("seed_verification", verification_message(&failed_checks), 6u8));
        }

        Ok::<SeedResult, Failure>(seeded)
    });

    match result {
        Ok(seeded) => CommandResult::success("seed", seed_message(&seeded)),
        Err(failure) => failure,
    }
}

fn seed_message(seeded: &SeedResult) -> String {
    let cart_state = if seeded.order_created { "created" } else { "already present" };
    format!(
        "demo dataset loaded: groups {} with {} role memberships; cart {} {cart_state}",
        seeded.groups_seeded.join(", "),
        seeded.memberships_seeded,
        seeded.order_id,
    )
}

fn verification_message(failed_checks: &[&str]) -> String {
    if failed_checks.is_empty() {
        "Some seed data failed to load".to_string()
    } else {
        format!("Seed verification failed for checks: {}", failed_checks.join(", "))
    }
}
