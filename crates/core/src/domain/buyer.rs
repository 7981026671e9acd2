use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::owner::OwnerId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuyerId(pub String);

impl BuyerId {
    pub fn generate() -> Self {
        Self(format!("BYR-{}", Uuid::new_v4().simple()))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Buyer {
    pub id: BuyerId,
    pub owner_id: OwnerId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
}

impl Buyer {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim()).trim().to_string()
    }

    /// Matches the way a person refers to a buyer in chat: by email or by name.
    pub fn matches_identifier(&self, identifier: &str) -> bool {
        let needle = identifier.trim().to_ascii_lowercase();
        if needle.is_empty() {
            return false;
        }
        self.email.to_ascii_lowercase() == needle
            || self.full_name().to_ascii_lowercase() == needle
            || self.first_name.to_ascii_lowercase() == needle
    }
}

/// Loose email shape check: one `@`, non-empty local part, dotted domain.
pub fn is_valid_email(value: &str) -> bool {
    let value = value.trim();
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    let mut labels = domain.split('.');
    let has_dot = domain.contains('.');
    has_dot && labels.all(|label| !label.is_empty())
}
