use async_trait::async_trait;
use thiserror::Error;

use tradebook_core::{Buyer, Expense, InventoryItem, OwnerId, RecordFilter};

pub mod buyer;
pub mod expense;
pub mod inventory;
pub mod memory;

pub use buyer::SqlBuyerRepository;
pub use expense::SqlExpenseRepository;
pub use inventory::SqlInventoryRepository;
pub use memory::{InMemoryBuyerRepository, InMemoryExpenseRepository, InMemoryInventoryRepository};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Reads are always scoped to one owner; the filter narrows within that scope.
#[async_trait]
pub trait InventoryRepository: Send + Sync {
    async fn list(
        &self,
        owner_id: &OwnerId,
        filter: &RecordFilter,
    ) -> Result<Vec<InventoryItem>, RepositoryError>;
    async fn save(&self, item: InventoryItem) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait BuyerRepository: Send + Sync {
    async fn list(
        &self,
        owner_id: &OwnerId,
        filter: &RecordFilter,
    ) -> Result<Vec<Buyer>, RepositoryError>;
    async fn save(&self, buyer: Buyer) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ExpenseRepository: Send + Sync {
    async fn list(
        &self,
        owner_id: &OwnerId,
        filter: &RecordFilter,
    ) -> Result<Vec<Expense>, RepositoryError>;
    async fn save(&self, expense: Expense) -> Result<(), RepositoryError>;
}

pub(crate) fn decode_err(error: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::Decode(error.to_string())
}

/// Substring pattern for `LIKE ? ESCAPE '\\'`; wildcards in the input match literally.
pub(crate) fn like_pattern(value: Option<String>) -> Option<String> {
    value.map(|value| {
        let mut escaped = String::with_capacity(value.len() + 2);
        escaped.push('%');
        for ch in value.chars() {
            if matches!(ch, '\\' | '%' | '_') {
                escaped.push('\\');
            }
            escaped.push(ch);
        }
        escaped.push('%');
        escaped
    })
}

pub(crate) fn parse_decimal(
    column: &str,
    raw: &str,
) -> Result<rust_decimal::Decimal, RepositoryError> {
    raw.parse::<rust_decimal::Decimal>()
        .map_err(|e| RepositoryError::Decode(format!("{column}: {e}")))
}

pub(crate) fn parse_timestamp(
    column: &str,
    raw: &str,
) -> Result<chrono::DateTime<chrono::Utc>, RepositoryError> {
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .map_err(|e| RepositoryError::Decode(format!("{column}: {e}")))
}
