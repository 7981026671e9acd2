use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;

use tradebook_core::{
    Buyer, BuyerId, Expense, ExpenseId, InventoryItem, InventoryItemId, OwnerId,
};

use crate::connection::DbPool;
use crate::repositories::{
    BuyerRepository, ExpenseRepository, InventoryRepository, RepositoryError, SqlBuyerRepository,
    SqlExpenseRepository, SqlInventoryRepository,
};

struct InventorySeed {
    key: &'static str,
    name: &'static str,
    sku: &'static str,
    category: &'static str,
    quantity: i64,
    unit_price_cents: i64,
}

struct BuyerSeed {
    key: &'static str,
    first_name: &'static str,
    last_name: &'static str,
    email: &'static str,
    balance_cents: i64,
}

struct ExpenseSeed {
    key: &'static str,
    description: &'static str,
    category: &'static str,
    amount_cents: i64,
    incurred_on: (i32, u32, u32),
}

const INVENTORY_SEEDS: &[InventorySeed] = &[
    InventorySeed {
        key: "inv-001",
        name: "Walnut desk",
        sku: "DSK-001",
        category: "Furniture",
        quantity: 4,
        unit_price_cents: 34_900,
    },
    InventorySeed {
        key: "inv-002",
        name: "Ergonomic chair",
        sku: "CHR-002",
        category: "Furniture",
        quantity: 0,
        unit_price_cents: 21_950,
    },
    InventorySeed {
        key: "inv-003",
        name: "Desk lamp",
        sku: "LMP-003",
        category: "Lighting",
        quantity: 27,
        unit_price_cents: 3_999,
    },
];

const BUYER_SEEDS: &[BuyerSeed] = &[
    BuyerSeed {
        key: "byr-001",
        first_name: "Ada",
        last_name: "Lovelace",
        email: "ada@analytical.io",
        balance_cents: 125_000,
    },
    BuyerSeed {
        key: "byr-002",
        first_name: "Grace",
        last_name: "Hopper",
        email: "grace@cobol.dev",
        balance_cents: 0,
    },
];

const EXPENSE_SEEDS: &[ExpenseSeed] = &[
    ExpenseSeed {
        key: "exp-001",
        description: "Warehouse rent",
        category: "Rent",
        amount_cents: 180_000,
        incurred_on: (2026, 1, 1),
    },
    ExpenseSeed {
        key: "exp-002",
        description: "Electricity bill",
        category: "Utilities",
        amount_cents: 21_475,
        incurred_on: (2026, 1, 12),
    },
];

/// Deterministic demo records for one owner. Ids are derived from the owner so
/// loading twice overwrites instead of duplicating.
pub struct DemoSeedDataset;

impl DemoSeedDataset {
    pub async fn load(pool: &DbPool, owner_id: &OwnerId) -> Result<SeedResult, RepositoryError> {
        let now = Utc::now();
        let inventory = SqlInventoryRepository::new(pool.clone());
        let buyers = SqlBuyerRepository::new(pool.clone());
        let expenses = SqlExpenseRepository::new(pool.clone());

        for seed in INVENTORY_SEEDS {
            inventory
                .save(InventoryItem {
                    id: InventoryItemId(seeded_id(owner_id, seed.key)),
                    owner_id: owner_id.clone(),
                    name: seed.name.to_string(),
                    sku: Some(seed.sku.to_string()),
                    category: Some(seed.category.to_string()),
                    quantity: seed.quantity,
                    unit_price: Decimal::new(seed.unit_price_cents, 2),
                    updated_at: now,
                })
                .await?;
        }

        for seed in BUYER_SEEDS {
            buyers
                .save(Buyer {
                    id: BuyerId(seeded_id(owner_id, seed.key)),
                    owner_id: owner_id.clone(),
                    first_name: seed.first_name.to_string(),
                    last_name: seed.last_name.to_string(),
                    email: seed.email.to_string(),
                    phone: None,
                    balance: Decimal::new(seed.balance_cents, 2),
                    created_at: now,
                })
                .await?;
        }

        for seed in EXPENSE_SEEDS {
            let (year, month, day) = seed.incurred_on;
            let incurred_on = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
                RepositoryError::Decode(format!("invalid seed date for {}", seed.key))
            })?;
            expenses
                .save(Expense {
                    id: ExpenseId(seeded_id(owner_id, seed.key)),
                    owner_id: owner_id.clone(),
                    description: seed.description.to_string(),
                    category: Some(seed.category.to_string()),
                    amount: Decimal::new(seed.amount_cents, 2),
                    incurred_on,
                    created_at: now,
                })
                .await?;
        }

        Ok(SeedResult {
            owner_id: owner_id.clone(),
            inventory_items: INVENTORY_SEEDS.len(),
            buyers: BUYER_SEEDS.len(),
            expenses: EXPENSE_SEEDS.len(),
        })
    }

    pub async fn verify(
        pool: &DbPool,
        owner_id: &OwnerId,
    ) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for (label, table, seeds) in [
            ("inventory-seeded", "inventory_item", INVENTORY_SEEDS.iter().map(|s| s.key).collect::<Vec<_>>()),
            ("buyers-seeded", "buyer", BUYER_SEEDS.iter().map(|s| s.key).collect()),
            ("expenses-seeded", "expense", EXPENSE_SEEDS.iter().map(|s| s.key).collect()),
        ] {
            let mut present = true;
            for key in seeds {
                let exists: i64 = sqlx::query_scalar(&format!(
                    "SELECT EXISTS(SELECT 1 FROM {table} WHERE id = ?1 AND owner_id = ?2)"
                ))
                .bind(seeded_id(owner_id, key))
                .bind(owner_id.as_str())
                .fetch_one(pool)
                .await?;
                present &= exists == 1;
            }
            checks.push((label, present));
        }

        let all_present = checks.iter().all(|(_, exists)| *exists);
        Ok(VerificationResult { all_present, checks })
    }

    /// Removes every record of the owner, seeded or not.
    pub async fn clean(pool: &DbPool, owner_id: &OwnerId) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;

        for table in ["expense", "buyer", "inventory_item"] {
            sqlx::query(&format!("DELETE FROM {table} WHERE owner_id = ?1"))
                .bind(owner_id.as_str())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

fn seeded_id(owner_id: &OwnerId, key: &str) -> String {
    format!("seed-{}-{key}", owner_id.as_str())
}

#[derive(Debug)]
pub struct SeedResult {
    pub owner_id: OwnerId,
    pub inventory_items: usize,
    pub buyers: usize,
    pub expenses: usize,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
