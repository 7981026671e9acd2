use chrono::NaiveDate;
use sqlx::Row;

use tradebook_core::{Expense, ExpenseId, OwnerId, RecordFilter};

use super::{
    decode_err, like_pattern, parse_decimal, parse_timestamp, ExpenseRepository, RepositoryError,
};
use crate::DbPool;

const DATE_FORMAT: &str = "%Y-%m-%d";

pub struct SqlExpenseRepository {
    pool: DbPool,
}

impl SqlExpenseRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_expense(row: &sqlx::sqlite::SqliteRow) -> Result<Expense, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_err)?;
    let owner_id: String = row.try_get("owner_id").map_err(decode_err)?;
    let description: String = row.try_get("description").map_err(decode_err)?;
    let category: Option<String> = row.try_get("category").map_err(decode_err)?;
    let amount: String = row.try_get("amount").map_err(decode_err)?;
    let incurred_on: String = row.try_get("incurred_on").map_err(decode_err)?;
    let created_at: String = row.try_get("created_at").map_err(decode_err)?;

    let incurred_on = NaiveDate::parse_from_str(&incurred_on, DATE_FORMAT)
        .map_err(|e| RepositoryError::Decode(format!("incurred_on: {e}")))?;

    Ok(Expense {
        id: ExpenseId(id),
        owner_id: OwnerId(owner_id),
        description,
        category,
        amount: parse_decimal("amount", &amount)?,
        incurred_on,
        created_at: parse_timestamp("created_at", &created_at)?,
    })
}

#[async_trait::async_trait]
impl ExpenseRepository for SqlExpenseRepository {
    async fn list(
        &self,
        owner_id: &OwnerId,
        filter: &RecordFilter,
    ) -> Result<Vec<Expense>, RepositoryError> {
        let pattern = like_pattern(filter.normalized_query());
        let category = filter.normalized_category();

        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT id, owner_id, description, category, amount, incurred_on, created_at
             FROM expense
             WHERE owner_id = ?
               AND (? IS NULL OR lower(description) LIKE ? ESCAPE '\\')
               AND (? IS NULL OR lower(coalesce(category, '')) = ?)
             ORDER BY incurred_on DESC, created_at DESC
             LIMIT ?",
        )
        .bind(owner_id.as_str())
        .bind(&pattern)
        .bind(&pattern)
        .bind(&category)
        .bind(&category)
        .bind(filter.effective_limit())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_expense).collect::<Result<Vec<_>, _>>()
    }

    async fn save(&self, expense: Expense) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO expense (id, owner_id, description, category, amount, incurred_on,
                                  created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 description = excluded.description,
                 category = excluded.category,
                 amount = excluded.amount,
                 incurred_on = excluded.incurred_on",
        )
        .bind(&expense.id.0)
        .bind(expense.owner_id.as_str())
        .bind(&expense.description)
        .bind(&expense.category)
        .bind(expense.amount.to_string())
        .bind(expense.incurred_on.format(DATE_FORMAT).to_string())
        .bind(expense.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;

    use tradebook_core::{Expense, ExpenseId, OwnerId, RecordFilter};

    use super::SqlExpenseRepository;
    use crate::repositories::ExpenseRepository;
    use crate::{connect_with_settings, migrations};

    fn expense(description: &str, day: u32, cents: i64) -> Expense {
        Expense {
            id: ExpenseId::generate(),
            owner_id: OwnerId::new("owner-1"),
            description: description.to_string(),
            category: Some("Utilities".to_string()),
            amount: Decimal::new(cents, 2),
            incurred_on: NaiveDate::from_ymd_opt(2026, 3, day).expect("valid date"),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn list_orders_newest_first_and_honors_limit() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let repo = SqlExpenseRepository::new(pool.clone());

        repo.save(expense("Electricity", 1, 12000)).await.expect("save");
        repo.save(expense("Water", 15, 4550)).await.expect("save");
        repo.save(expense("Internet", 9, 6000)).await.expect("save");

        let filter = RecordFilter { limit: Some(2), ..RecordFilter::default() };
        let expenses = repo.list(&OwnerId::new("owner-1"), &filter).await.expect("list");

        assert_eq!(expenses.len(), 2);
        assert_eq!(expenses[0].description, "Water");
        assert_eq!(expenses[0].amount, Decimal::new(4550, 2));
        assert_eq!(expenses[1].description, "Internet");

        pool.close().await;
    }
}
