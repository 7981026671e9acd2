use sqlx::Row;

use tradebook_core::{Buyer, BuyerId, OwnerId, RecordFilter};

use super::{
    decode_err, like_pattern, parse_decimal, parse_timestamp, BuyerRepository, RepositoryError,
};
use crate::DbPool;

pub struct SqlBuyerRepository {
    pool: DbPool,
}

impl SqlBuyerRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_buyer(row: &sqlx::sqlite::SqliteRow) -> Result<Buyer, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_err)?;
    let owner_id: String = row.try_get("owner_id").map_err(decode_err)?;
    let first_name: String = row.try_get("first_name").map_err(decode_err)?;
    let last_name: String = row.try_get("last_name").map_err(decode_err)?;
    let email: String = row.try_get("email").map_err(decode_err)?;
    let phone: Option<String> = row.try_get("phone").map_err(decode_err)?;
    let balance: String = row.try_get("balance").map_err(decode_err)?;
    let created_at: String = row.try_get("created_at").map_err(decode_err)?;

    Ok(Buyer {
        id: BuyerId(id),
        owner_id: OwnerId(owner_id),
        first_name,
        last_name,
        email,
        phone,
        balance: parse_decimal("balance", &balance)?,
        created_at: parse_timestamp("created_at", &created_at)?,
    })
}

#[async_trait::async_trait]
impl BuyerRepository for SqlBuyerRepository {
    async fn list(
        &self,
        owner_id: &OwnerId,
        filter: &RecordFilter,
    ) -> Result<Vec<Buyer>, RepositoryError> {
        let pattern = like_pattern(filter.normalized_query());

        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT id, owner_id, first_name, last_name, email, phone, balance, created_at
             FROM buyer
             WHERE owner_id = ?
               AND (? IS NULL
                    OR lower(first_name || ' ' || last_name) LIKE ? ESCAPE '\\'
                    OR lower(email) LIKE ? ESCAPE '\\')
             ORDER BY last_name ASC, first_name ASC
             LIMIT ?",
        )
        .bind(owner_id.as_str())
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .bind(filter.effective_limit())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_buyer).collect::<Result<Vec<_>, _>>()
    }

    async fn save(&self, buyer: Buyer) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO buyer (id, owner_id, first_name, last_name, email, phone, balance,
                                created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 first_name = excluded.first_name,
                 last_name = excluded.last_name,
                 email = excluded.email,
                 phone = excluded.phone,
                 balance = excluded.balance",
        )
        .bind(&buyer.id.0)
        .bind(buyer.owner_id.as_str())
        .bind(&buyer.first_name)
        .bind(&buyer.last_name)
        .bind(&buyer.email)
        .bind(&buyer.phone)
        .bind(buyer.balance.to_string())
        .bind(buyer.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
