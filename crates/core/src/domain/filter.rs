use serde::{Deserialize, Serialize};

pub const DEFAULT_RECORD_LIMIT: u32 = 20;
pub const MAX_RECORD_LIMIT: u32 = 100;

/// Owner-independent part of a record lookup. The owner scope is always passed
/// separately so a filter can never widen a read past one tenant.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFilter {
    pub query: Option<String>,
    pub category: Option<String>,
    pub limit: Option<u32>,
}

impl RecordFilter {
    pub fn with_query(query: impl Into<String>) -> Self {
        Self { query: Some(query.into()), ..Self::default() }
    }

    pub fn normalized_query(&self) -> Option<String> {
        normalize(self.query.as_deref())
    }

    pub fn normalized_category(&self) -> Option<String> {
        normalize(self.category.as_deref())
    }

    pub fn effective_limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_RECORD_LIMIT).clamp(1, MAX_RECORD_LIMIT)
    }

    /// Case-insensitive substring match against any of the given fields.
    pub fn matches_query<'a>(&self, fields: impl IntoIterator<Item = &'a str>) -> bool {
        match self.normalized_query() {
            None => true,
            Some(query) => fields.into_iter().any(|field| field.to_lowercase().contains(&query)),
        }
    }

    pub fn matches_category(&self, category: Option<&str>) -> bool {
        match self.normalized_category() {
            None => true,
            Some(wanted) => category.map(|value| value.to_lowercase() == wanted).unwrap_or(false),
        }
    }
}

fn normalize(value: Option<&str>) -> Option<String> {
    value.map(|raw| raw.trim().to_lowercase()).filter(|raw| !raw.is_empty())
}
