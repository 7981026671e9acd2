use std::collections::HashMap;

use tokio::sync::RwLock;

use tradebook_core::{Buyer, Expense, InventoryItem, OwnerId, RecordFilter};

use super::{BuyerRepository, ExpenseRepository, InventoryRepository, RepositoryError};

fn take_limit<T>(mut records: Vec<T>, filter: &RecordFilter) -> Vec<T> {
    records.truncate(filter.effective_limit() as usize);
    records
}

#[derive(Default)]
pub struct InMemoryInventoryRepository {
    items: RwLock<HashMap<String, InventoryItem>>,
}

#[async_trait::async_trait]
impl InventoryRepository for InMemoryInventoryRepository {
    async fn list(
        &self,
        owner_id: &OwnerId,
        filter: &RecordFilter,
    ) -> Result<Vec<InventoryItem>, RepositoryError> {
        let items = self.items.read().await;
        let mut matched: Vec<InventoryItem> = items
            .values()
            .filter(|item| &item.owner_id == owner_id)
            .filter(|item| {
                filter.matches_query([item.name.as_str(), item.sku.as_deref().unwrap_or_default()])
            })
            .filter(|item| filter.matches_category(item.category.as_deref()))
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(take_limit(matched, filter))
    }

    async fn save(&self, item: InventoryItem) -> Result<(), RepositoryError> {
        let mut items = self.items.write().await;
        items.insert(item.id.0.clone(), item);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryBuyerRepository {
    buyers: RwLock<HashMap<String, Buyer>>,
}

#[async_trait::async_trait]
impl BuyerRepository for InMemoryBuyerRepository {
    async fn list(
        &self,
        owner_id: &OwnerId,
        filter: &RecordFilter,
    ) -> Result<Vec<Buyer>, RepositoryError> {
        let buyers = self.buyers.read().await;
        let mut matched: Vec<Buyer> = buyers
            .values()
            .filter(|buyer| &buyer.owner_id == owner_id)
            .filter(|buyer| {
                let full_name = buyer.full_name();
                filter.matches_query([full_name.as_str(), buyer.email.as_str()])
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| {
            (a.last_name.as_str(), a.first_name.as_str())
                .cmp(&(b.last_name.as_str(), b.first_name.as_str()))
        });
        Ok(take_limit(matched, filter))
    }

    async fn save(&self, buyer: Buyer) -> Result<(), RepositoryError> {
        let mut buyers = self.buyers.write().await;
        buyers.insert(buyer.id.0.clone(), buyer);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryExpenseRepository {
    expenses: RwLock<HashMap<String, Expense>>,
}

#[async_trait::async_trait]
impl ExpenseRepository for InMemoryExpenseRepository {
    async fn list(
        &self,
        owner_id: &OwnerId,
        filter: &RecordFilter,
    ) -> Result<Vec<Expense>, RepositoryError> {
        let expenses = self.expenses.read().await;
        let mut matched: Vec<Expense> = expenses
            .values()
            .filter(|expense| &expense.owner_id == owner_id)
            .filter(|expense| filter.matches_query([expense.description.as_str()]))
            .filter(|expense| filter.matches_category(expense.category.as_deref()))
            .cloned()
            .collect();
        matched.sort_by(|a, b| {
            b.incurred_on.cmp(&a.incurred_on).then_with(|| b.created_at.cmp(&a.created_at))
        });
        Ok(take_limit(matched, filter))
    }

    async fn save(&self, expense: Expense) -> Result<(), RepositoryError> {
        let mut expenses = self.expenses.write().await;
        expenses.insert(expense.id.0.clone(), expense);
        Ok(())
    }
}
