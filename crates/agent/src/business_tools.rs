//! The six business operations the assistant can call.
//!
//! Reads go straight to the owner-scoped repositories. Writes go through the
//! remote business service and hand its response back unchanged.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use tradebook_core::domain::buyer::is_valid_email;
use tradebook_core::domain::expense::total_amount;
use tradebook_core::domain::filter::MAX_RECORD_LIMIT;
use tradebook_core::RecordFilter;
use tradebook_db::repositories::{BuyerRepository, ExpenseRepository, InventoryRepository};

use crate::remote::{BusinessApi, BuyerUpdateRequest, NewBuyerRequest, NewExpenseRequest};
use crate::tools::{Tool, ToolContext, ToolError, ToolRegistry};

pub const GET_INVENTORY: &str = "get_inventory";
pub const GET_BUYERS: &str = "get_buyers";
pub const GET_EXPENSES: &str = "get_expenses";
pub const ADD_BUYER: &str = "add_buyer";
pub const UPDATE_BUYER: &str = "update_buyer";
pub const ADD_EXPENSE: &str = "add_expense";

/// Collaborators shared by the business tools.
#[derive(Clone)]
pub struct BusinessToolDeps {
    pub inventory: Arc<dyn InventoryRepository>,
    pub buyers: Arc<dyn BuyerRepository>,
    pub expenses: Arc<dyn ExpenseRepository>,
    pub api: Arc<dyn BusinessApi>,
}

pub fn register_business_tools(registry: &mut ToolRegistry, deps: BusinessToolDeps) {
    registry.register(GetInventoryTool { repository: deps.inventory });
    registry.register(GetBuyersTool { repository: deps.buyers.clone() });
    registry.register(GetExpensesTool { repository: deps.expenses });
    registry.register(AddBuyerTool { api: deps.api.clone() });
    registry.register(UpdateBuyerTool { buyers: deps.buyers, api: deps.api.clone() });
    registry.register(AddExpenseTool { api: deps.api });
}

fn parse_args<T: DeserializeOwned>(arguments: Value) -> Result<T, ToolError> {
    let arguments = if arguments.is_null() { json!({}) } else { arguments };
    serde_json::from_value(arguments).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

fn required_text(field: &str, value: String) -> Result<String, ToolError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ToolError::InvalidArguments(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

fn optional_text(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn checked_email(value: String) -> Result<String, ToolError> {
    let email = required_text("email", value)?;
    if !is_valid_email(&email) {
        return Err(ToolError::InvalidArguments(format!("email `{email}` is not a valid address")));
    }
    Ok(email)
}

fn checked_balance(value: Decimal) -> Result<Decimal, ToolError> {
    if value < Decimal::ZERO {
        return Err(ToolError::InvalidArguments("balance must not be negative".to_string()));
    }
    Ok(value)
}

fn lookup_schema(subject: &str, with_category: bool) -> Value {
    let mut properties = json!({
        "query": {
            "type": "string",
            "description": format!("Optional text to match against {subject}")
        },
        "limit": {
            "type": "integer",
            "minimum": 1,
            "maximum": MAX_RECORD_LIMIT,
            "description": "Maximum number of records to return (default 20)"
        }
    });
    if with_category {
        properties["category"] =
            json!({"type": "string", "description": "Optional exact category name"});
    }
    json!({"type": "object", "properties": properties, "additionalProperties": false})
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupArgs {
    query: Option<String>,
    category: Option<String>,
    limit: Option<u32>,
}

impl From<LookupArgs> for RecordFilter {
    fn from(args: LookupArgs) -> Self {
        RecordFilter { query: args.query, category: args.category, limit: args.limit }
    }
}

pub struct GetInventoryTool {
    repository: Arc<dyn InventoryRepository>,
}

#[async_trait]
impl Tool for GetInventoryTool {
    fn name(&self) -> &'static str {
        GET_INVENTORY
    }

    fn description(&self) -> &'static str {
        "List inventory items, optionally filtered by a name/SKU query or a category."
    }

    fn parameters(&self) -> Value {
        lookup_schema("item names and SKUs", true)
    }

    async fn execute(&self, arguments: Value, context: &ToolContext) -> Result<Value, ToolError> {
        let owner_id = context.require_owner()?;
        let filter = RecordFilter::from(parse_args::<LookupArgs>(arguments)?);
        let items = self.repository.list(owner_id, &filter).await?;
        let out_of_stock = items.iter().filter(|item| item.is_out_of_stock()).count();
        Ok(json!({ "count": items.len(), "outOfStock": out_of_stock, "items": items }))
    }
}

pub struct GetBuyersTool {
    repository: Arc<dyn BuyerRepository>,
}

#[async_trait]
impl Tool for GetBuyersTool {
    fn name(&self) -> &'static str {
        GET_BUYERS
    }

    fn description(&self) -> &'static str {
        "List buyers, optionally filtered by a name or email query."
    }

    fn parameters(&self) -> Value {
        lookup_schema("buyer names and emails", false)
    }

    async fn execute(&self, arguments: Value, context: &ToolContext) -> Result<Value, ToolError> {
        let owner_id = context.require_owner()?;
        let args = parse_args::<LookupArgs>(arguments)?;
        let filter = RecordFilter { category: None, ..RecordFilter::from(args) };
        let buyers = self.repository.list(owner_id, &filter).await?;
        Ok(json!({ "count": buyers.len(), "buyers": buyers }))
    }
}

pub struct GetExpensesTool {
    repository: Arc<dyn ExpenseRepository>,
}

#[async_trait]
impl Tool for GetExpensesTool {
    fn name(&self) -> &'static str {
        GET_EXPENSES
    }

    fn description(&self) -> &'static str {
        "List expenses, newest first, optionally filtered by a description query or a category."
    }

    fn parameters(&self) -> Value {
        lookup_schema("expense descriptions", true)
    }

    async fn execute(&self, arguments: Value, context: &ToolContext) -> Result<Value, ToolError> {
        let owner_id = context.require_owner()?;
        let filter = RecordFilter::from(parse_args::<LookupArgs>(arguments)?);
        let expenses = self.repository.list(owner_id, &filter).await?;
        Ok(json!({
            "count": expenses.len(),
            "total": total_amount(&expenses),
            "expenses": expenses,
        }))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddBuyerArgs {
    first_name: String,
    last_name: String,
    email: String,
    phone: Option<String>,
    balance: Option<Decimal>,
}

pub struct AddBuyerTool {
    api: Arc<dyn BusinessApi>,
}

#[async_trait]
impl Tool for AddBuyerTool {
    fn name(&self) -> &'static str {
        ADD_BUYER
    }

    fn description(&self) -> &'static str {
        "Create a new buyer. Requires first name, last name and email."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "firstName": {"type": "string"},
                "lastName": {"type": "string"},
                "email": {"type": "string", "format": "email"},
                "phone": {"type": "string"},
                "balance": {"type": "number", "minimum": 0, "description": "Opening balance (default 0)"}
            },
            "required": ["firstName", "lastName", "email"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, arguments: Value, context: &ToolContext) -> Result<Value, ToolError> {
        let owner_id = context.require_owner()?;
        let args = parse_args::<AddBuyerArgs>(arguments)?;

        let request = NewBuyerRequest {
            owner_id: owner_id.as_str().to_string(),
            first_name: required_text("firstName", args.first_name)?,
            last_name: required_text("lastName", args.last_name)?,
            email: checked_email(args.email)?,
            phone: optional_text(args.phone),
            balance: checked_balance(args.balance.unwrap_or(Decimal::ZERO))?,
        };

        Ok(self.api.create_buyer(&request).await?)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateBuyerArgs {
    identifier: String,
    first_name: Option<String>,
    last_name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    balance: Option<Decimal>,
}

pub struct UpdateBuyerTool {
    buyers: Arc<dyn BuyerRepository>,
    api: Arc<dyn BusinessApi>,
}

#[async_trait]
impl Tool for UpdateBuyerTool {
    fn name(&self) -> &'static str {
        UPDATE_BUYER
    }

    fn description(&self) -> &'static str {
        "Update an existing buyer found by name or email. Only the given fields change."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "identifier": {"type": "string", "description": "Buyer's email, full name or first name"},
                "firstName": {"type": "string"},
                "lastName": {"type": "string"},
                "email": {"type": "string", "format": "email"},
                "phone": {"type": "string"},
                "balance": {"type": "number", "minimum": 0}
            },
            "required": ["identifier"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, arguments: Value, context: &ToolContext) -> Result<Value, ToolError> {
        let owner_id = context.require_owner()?;
        let args = parse_args::<UpdateBuyerArgs>(arguments)?;
        let identifier = required_text("identifier", args.identifier)?;

        let first_name = optional_text(args.first_name);
        let last_name = optional_text(args.last_name);
        let email = optional_text(args.email).map(checked_email).transpose()?;
        let phone = optional_text(args.phone);
        let balance = args.balance.map(checked_balance).transpose()?;

        if first_name.is_none()
            && last_name.is_none()
            && email.is_none()
            && phone.is_none()
            && balance.is_none()
        {
            return Err(ToolError::InvalidArguments(
                "at least one field to change is required".to_string(),
            ));
        }

        // The substring query narrows to rows containing the identifier; the
        // exact match below picks email, full name or first name among them.
        let narrowed = RecordFilter {
            query: Some(identifier.clone()),
            limit: Some(MAX_RECORD_LIMIT),
            ..RecordFilter::default()
        };
        let candidates = self.buyers.list(owner_id, &narrowed).await?;
        let mut matches = candidates.into_iter().filter(|b| b.matches_identifier(&identifier));
        let buyer = match (matches.next(), matches.next()) {
            (Some(buyer), None) => buyer,
            (None, _) => {
                return Err(ToolError::NotFound(format!("no buyer matches `{identifier}`")));
            }
            (Some(_), Some(_)) => {
                return Err(ToolError::InvalidArguments(format!(
                    "`{identifier}` matches more than one buyer; use the buyer's email"
                )));
            }
        };

        let request = BuyerUpdateRequest {
            owner_id: owner_id.as_str().to_string(),
            buyer_id: buyer.id.0,
            first_name,
            last_name,
            email,
            phone,
            balance,
        };

        Ok(self.api.update_buyer(&request).await?)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddExpenseArgs {
    description: String,
    amount: Decimal,
    category: Option<String>,
    date: Option<NaiveDate>,
}

pub struct AddExpenseTool {
    api: Arc<dyn BusinessApi>,
}

#[async_trait]
impl Tool for AddExpenseTool {
    fn name(&self) -> &'static str {
        ADD_EXPENSE
    }

    fn description(&self) -> &'static str {
        "Record a new expense. Amount must be positive; date defaults to today."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "description": {"type": "string"},
                "amount": {"type": "number", "exclusiveMinimum": 0},
                "category": {"type": "string"},
                "date": {"type": "string", "format": "date", "description": "YYYY-MM-DD"}
            },
            "required": ["description", "amount"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, arguments: Value, context: &ToolContext) -> Result<Value, ToolError> {
        let owner_id = context.require_owner()?;
        let args = parse_args::<AddExpenseArgs>(arguments)?;

        if args.amount <= Decimal::ZERO {
            return Err(ToolError::InvalidArguments("amount must be greater than zero".to_string()));
        }

        let request = NewExpenseRequest {
            owner_id: owner_id.as_str().to_string(),
            description: required_text("description", args.description)?,
            amount: args.amount,
            category: optional_text(args.category),
            date: args.date.unwrap_or_else(|| Utc::now().date_naive()),
        };

        Ok(self.api.create_expense(&request).await?)
    }
}
