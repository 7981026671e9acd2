use crate::commands::{prepare, CommandResult};
use tradebook_core::OwnerId;
use tradebook_db::{connect_with_settings, migrations, DemoSeedDataset, SeedResult};

pub const DEFAULT_OWNER: &str = "demo-owner";

pub fn run(owner: &str) -> CommandResult {
    let owner_id = OwnerId::new(owner.trim());
    if owner_id.is_blank() {
        return CommandResult::failure("seed", "invalid_input", "--owner must not be blank", 2);
    }

    let (config, runtime) = match prepare("seed") {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let seeded = DemoSeedDataset::load(&pool, &owner_id)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

        let verification = DemoSeedDataset::verify(&pool, &owner_id)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

        let run_result = if verification.all_present {
            Ok(seeded)
        } else {
            let failed_checks = verification
                .checks
                .iter()
                .filter_map(|(check, passed)| (!passed).then_some(*check))
                .collect::<Vec<_>>();
            Err(("seed_verification", verification_failure_message(&failed_checks), 6u8))
        };

        pool.close().await;
        run_result
    });

    match result {
        Ok(seeded) => CommandResult::success("seed", summary(&seeded)),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

fn summary(seeded: &SeedResult) -> String {
    format!(
        "demo records ready for owner `{}`: {} inventory items, {} buyers, {} expenses",
        seeded.owner_id, seeded.inventory_items, seeded.buyers, seeded.expenses
    )
}

fn verification_failure_message(failed_checks: &[&str]) -> String {
    if failed_checks.is_empty() {
        "Some seed data failed to load".to_string()
    } else {
        format!("Seed verification failed for checks: {}", failed_checks.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use tradebook_core::OwnerId;
    use tradebook_db::SeedResult;

    use super::{summary, verification_failure_message};

    #[test]
    fn verification_error_message_targets_failed_checks() {
        let message = verification_failure_message(&["buyers-seeded", "expenses-seeded"]);

        assert_eq!(message, "Seed verification failed for checks: buyers-seeded, expenses-seeded");
    }

    #[test]
    fn verification_error_message_falls_back_to_generic_when_no_labels() {
        assert_eq!(verification_failure_message(&[]), "Some seed data failed to load");
    }

    #[test]
    fn summary_lists_counts_per_record_kind() {
        let seeded = SeedResult {
            owner_id: OwnerId::new("owner-7"),
            inventory_items: 3,
            buyers: 2,
            expenses: 2,
        };

        assert_eq!(
            summary(&seeded),
            "demo records ready for owner `owner-7`: 3 inventory items, 2 buyers, 2 expenses"
        );
    }
}
