pub mod buyer;
pub mod expense;
pub mod filter;
pub mod inventory;
pub mod owner;
