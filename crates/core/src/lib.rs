pub mod config;
pub mod domain;
pub mod errors;

pub use domain::buyer::{Buyer, BuyerId};
pub use domain::expense::{Expense, ExpenseId};
pub use domain::filter::RecordFilter;
pub use domain::inventory::{InventoryItem, InventoryItemId};
pub use domain::owner::OwnerId;
pub use errors::{ApplicationError, DomainError, InterfaceError};
