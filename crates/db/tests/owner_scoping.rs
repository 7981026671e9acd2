use chrono::Utc;
use rust_decimal::Decimal;

use tradebook_core::{Buyer, BuyerId, OwnerId, RecordFilter};
use tradebook_db::repositories::{
    BuyerRepository, ExpenseRepository, InventoryRepository, SqlBuyerRepository,
    SqlExpenseRepository, SqlInventoryRepository,
};
use tradebook_db::{connect_with_settings, migrations, DemoSeedDataset};

type ScopingTestResult<T = ()> = Result<T, String>;

macro_rules! require {
    ($cond:expr) => {
        if !$cond {
            return Err(format!("assertion failed: `{}`", stringify!($cond)));
        }
    };
    ($cond:expr, $($arg:tt)*) => {
        if !$cond {
            return Err(format!($($arg)*));
        }
    };
}

macro_rules! require_eq {
    ($left:expr, $right:expr) => {
        if $left != $right {
            return Err(format!(
                "assertion failed: `left == right` (`{:?}` != `{:?}`)",
                $left,
                $right
            ));
        }
    };
}

async fn seeded_pool(owners: &[&str]) -> ScopingTestResult<tradebook_db::DbPool> {
    let pool = connect_with_settings("sqlite::memory:", 1, 30)
        .await
        .map_err(|e| format!("connect: {e}"))?;
    migrations::run_pending(&pool).await.map_err(|e| format!("migrate: {e}"))?;
    for owner in owners {
        DemoSeedDataset::load(&pool, &OwnerId::new(*owner))
            .await
            .map_err(|e| format!("seed {owner}: {e}"))?;
    }
    Ok(pool)
}

#[tokio::test]
async fn every_repository_scopes_reads_to_the_owner() -> ScopingTestResult {
    let pool = seeded_pool(&["alpha", "beta"]).await?;
    let alpha = OwnerId::new("alpha");

    let inventory = SqlInventoryRepository::new(pool.clone())
        .list(&alpha, &RecordFilter::default())
        .await
        .map_err(|e| e.to_string())?;
    require!(!inventory.is_empty());
    require!(inventory.iter().all(|item| item.owner_id == alpha), "inventory leaked across owners");

    let buyers = SqlBuyerRepository::new(pool.clone())
        .list(&alpha, &RecordFilter::default())
        .await
        .map_err(|e| e.to_string())?;
    require!(buyers.iter().all(|buyer| buyer.owner_id == alpha), "buyers leaked across owners");

    let expenses = SqlExpenseRepository::new(pool.clone())
        .list(&alpha, &RecordFilter::default())
        .await
        .map_err(|e| e.to_string())?;
    require!(
        expenses.iter().all(|expense| expense.owner_id == alpha),
        "expenses leaked across owners"
    );

    pool.close().await;
    Ok(())
}

#[tokio::test]
async fn unknown_owner_sees_nothing() -> ScopingTestResult {
    let pool = seeded_pool(&["alpha"]).await?;
    let stranger = OwnerId::new("stranger");

    let buyers = SqlBuyerRepository::new(pool.clone())
        .list(&stranger, &RecordFilter::default())
        .await
        .map_err(|e| e.to_string())?;
    require_eq!(buyers.len(), 0);

    pool.close().await;
    Ok(())
}

#[tokio::test]
async fn buyer_query_finds_record_saved_after_seed() -> ScopingTestResult {
    let pool = seeded_pool(&["alpha"]).await?;
    let alpha = OwnerId::new("alpha");
    let repo = SqlBuyerRepository::new(pool.clone());

    repo.save(Buyer {
        id: BuyerId::generate(),
        owner_id: alpha.clone(),
        first_name: "John".to_string(),
        last_name: "Doe".to_string(),
        email: "john@x.com".to_string(),
        phone: Some("+1 555 0100".to_string()),
        balance: Decimal::new(100, 0),
        created_at: Utc::now(),
    })
    .await
    .map_err(|e| e.to_string())?;

    let found =
        repo.list(&alpha, &RecordFilter::with_query("john")).await.map_err(|e| e.to_string())?;
    require_eq!(found.len(), 1);
    require_eq!(found[0].balance, Decimal::new(100, 0));
    require_eq!(found[0].phone.as_deref(), Some("+1 555 0100"));

    pool.close().await;
    Ok(())
}
