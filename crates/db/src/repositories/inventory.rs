use sqlx::Row;

use tradebook_core::{InventoryItem, InventoryItemId, OwnerId, RecordFilter};

use super::{
    decode_err, like_pattern, parse_decimal, parse_timestamp, InventoryRepository,
    RepositoryError,
};
use crate::DbPool;

pub struct SqlInventoryRepository {
    pool: DbPool,
}

impl SqlInventoryRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_item(row: &sqlx::sqlite::SqliteRow) -> Result<InventoryItem, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_err)?;
    let owner_id: String = row.try_get("owner_id").map_err(decode_err)?;
    let name: String = row.try_get("name").map_err(decode_err)?;
    let sku: Option<String> = row.try_get("sku").map_err(decode_err)?;
    let category: Option<String> = row.try_get("category").map_err(decode_err)?;
    let quantity: i64 = row.try_get("quantity").map_err(decode_err)?;
    let unit_price: String = row.try_get("unit_price").map_err(decode_err)?;
    let updated_at: String = row.try_get("updated_at").map_err(decode_err)?;

    Ok(InventoryItem {
        id: InventoryItemId(id),
        owner_id: OwnerId(owner_id),
        name,
        sku,
        category,
        quantity,
        unit_price: parse_decimal("unit_price", &unit_price)?,
        updated_at: parse_timestamp("updated_at", &updated_at)?,
    })
}

#[async_trait::async_trait]
impl InventoryRepository for SqlInventoryRepository {
    async fn list(
        &self,
        owner_id: &OwnerId,
        filter: &RecordFilter,
    ) -> Result<Vec<InventoryItem>, RepositoryError> {
        let pattern = like_pattern(filter.normalized_query());
        let category = filter.normalized_category();

        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT id, owner_id, name, sku, category, quantity, unit_price, updated_at
             FROM inventory_item
             WHERE owner_id = ?
               AND (? IS NULL
                    OR lower(name) LIKE ? ESCAPE '\\'
                    OR lower(coalesce(sku, '')) LIKE ? ESCAPE '\\')
               AND (? IS NULL OR lower(coalesce(category, '')) = ?)
             ORDER BY name ASC
             LIMIT ?",
        )
        .bind(owner_id.as_str())
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .bind(&category)
        .bind(&category)
        .bind(filter.effective_limit())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_item).collect::<Result<Vec<_>, _>>()
    }

    async fn save(&self, item: InventoryItem) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO inventory_item (id, owner_id, name, sku, category, quantity,
                                         unit_price, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 sku = excluded.sku,
                 category = excluded.category,
                 quantity = excluded.quantity,
                 unit_price = excluded.unit_price,
                 updated_at = excluded.updated_at",
        )
        .bind(&item.id.0)
        .bind(item.owner_id.as_str())
        .bind(&item.name)
        .bind(&item.sku)
        .bind(&item.category)
        .bind(item.quantity)
        .bind(item.unit_price.to_string())
        .bind(item.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use tradebook_core::{InventoryItem, InventoryItemId, OwnerId, RecordFilter};

    use super::SqlInventoryRepository;
    use crate::repositories::InventoryRepository;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> crate::DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn item(owner: &str, name: &str, category: Option<&str>, quantity: i64) -> InventoryItem {
        InventoryItem {
            id: InventoryItemId::generate(),
            owner_id: OwnerId::new(owner),
            name: name.to_string(),
            sku: None,
            category: category.map(str::to_string),
            quantity,
            unit_price: Decimal::new(1250, 2),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn save_then_list_round_trips_decimal_price() {
        let pool = setup().await;
        let repo = SqlInventoryRepository::new(pool.clone());

        repo.save(item("owner-1", "Walnut desk", Some("Furniture"), 4)).await.expect("save");

        let items = repo.list(&OwnerId::new("owner-1"), &RecordFilter::default()).await.expect("list");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].unit_price, Decimal::new(1250, 2));
        assert_eq!(items[0].quantity, 4);

        pool.close().await;
    }

    #[tokio::test]
    async fn list_filters_by_query_and_category_within_owner() {
        let pool = setup().await;
        let repo = SqlInventoryRepository::new(pool.clone());

        repo.save(item("owner-1", "Walnut desk", Some("Furniture"), 4)).await.expect("save");
        repo.save(item("owner-1", "Desk lamp", Some("Lighting"), 10)).await.expect("save");
        repo.save(item("owner-2", "Oak desk", Some("Furniture"), 1)).await.expect("save");

        let owner = OwnerId::new("owner-1");
        let desks = repo.list(&owner, &RecordFilter::with_query("DESK")).await.expect("list");
        assert_eq!(desks.len(), 2);

        let furniture = RecordFilter {
            query: Some("desk".to_string()),
            category: Some("furniture".to_string()),
            limit: None,
        };
        let filtered = repo.list(&owner, &furniture).await.expect("list");
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].name, "Walnut desk");

        pool.close().await;
    }
}
