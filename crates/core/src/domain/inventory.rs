use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::owner::OwnerId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InventoryItemId(pub String);

impl InventoryItemId {
    pub fn generate() -> Self {
        Self(format!("INV-{}", Uuid::new_v4().simple()))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItem {
    pub id: InventoryItemId,
    pub owner_id: OwnerId,
    pub name: String,
    pub sku: Option<String>,
    pub category: Option<String>,
    pub quantity: i64,
    pub unit_price: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl InventoryItem {
    pub fn stock_value(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }

    pub fn is_out_of_stock(&self) -> bool {
        self.quantity <= 0
    }
}
