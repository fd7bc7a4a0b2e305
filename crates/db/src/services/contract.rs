//! Contract price book. Writes manage headers and their expense-type lines;
//! reads load a customer's active headers and hand them to the pure resolver.

use chrono::{NaiveDate, Utc};
use settly_core::domain::contract::{
    ContractId, ContractPriceHeader, ContractPriceItem, ContractStatus,
};
use settly_core::domain::quote::{Currency, ExpenseType};
use settly_core::errors::CoreError;
use settly_core::pricing::{self, PriceSuggestion};
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use super::ServiceError;
use crate::rows;
use crate::DbPool;

#[derive(Clone, Debug)]
pub struct PriceBookCommand {
    pub customer_id: String,
    pub name: String,
    pub priority: i32,
    pub effective_date: NaiveDate,
    pub expiration_date: Option<NaiveDate>,
    pub items: Vec<ContractPriceItem>,
}

pub struct ContractPriceBook {
    pool: DbPool,
}

impl ContractPriceBook {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, cmd: PriceBookCommand) -> Result<ContractPriceHeader, ServiceError> {
        validate_command(&cmd)?;

        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;
        let now = Utc::now().to_rfc3339();
        let header = ContractPriceHeader {
            id: ContractId(Uuid::new_v4().to_string()),
            customer_id: cmd.customer_id,
            name: cmd.name,
            priority: cmd.priority,
            effective_date: cmd.effective_date,
            expiration_date: cmd.expiration_date,
            status: ContractStatus::Active,
            items: cmd.items,
        };

        sqlx::query(
            "INSERT INTO contract_price_headers
                 (id, customer_id, name, priority, effective_date, expiration_date,
                  status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&header.id.0)
        .bind(&header.customer_id)
        .bind(&header.name)
        .bind(header.priority)
        .bind(header.effective_date.to_string())
        .bind(header.expiration_date.map(|date| date.to_string()))
        .bind(header.status.as_str())
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        insert_items(&mut tx, &header.id, &header.items).await?;
        tx.commit().await?;

        tracing::info!(contract = %header.id.0, customer = %header.customer_id, "price book created");
        Ok(header)
    }

    /// Replace the header fields and the full item set. Inactive price books
    /// are read-only.
    pub async fn update(
        &self,
        contract_id: &ContractId,
        cmd: PriceBookCommand,
    ) -> Result<ContractPriceHeader, ServiceError> {
        validate_command(&cmd)?;

        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;
        let existing = load_header(&mut tx, contract_id).await?;
        if existing.status != ContractStatus::Active {
            return Err(CoreError::state_conflict(format!(
                "price book {} is inactive and cannot be updated",
                contract_id.0
            ))
            .into());
        }

        sqlx::query(
            "UPDATE contract_price_headers SET
                 customer_id = ?, name = ?, priority = ?, effective_date = ?,
                 expiration_date = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&cmd.customer_id)
        .bind(&cmd.name)
        .bind(cmd.priority)
        .bind(cmd.effective_date.to_string())
        .bind(cmd.expiration_date.map(|date| date.to_string()))
        .bind(Utc::now().to_rfc3339())
        .bind(&contract_id.0)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM contract_price_items WHERE header_id = ?")
            .bind(&contract_id.0)
            .execute(&mut *tx)
            .await?;
        insert_items(&mut tx, contract_id, &cmd.items).await?;
        tx.commit().await?;

        Ok(ContractPriceHeader {
            id: contract_id.clone(),
            customer_id: cmd.customer_id,
            name: cmd.name,
            priority: cmd.priority,
            effective_date: cmd.effective_date,
            expiration_date: cmd.expiration_date,
            status: ContractStatus::Active,
            items: cmd.items,
        })
    }

    pub async fn deactivate(&self, contract_id: &ContractId) -> Result<(), ServiceError> {
        let result = sqlx::query(
            "UPDATE contract_price_headers SET status = ?, updated_at = ? WHERE id = ?",
        )
        .bind(ContractStatus::Inactive.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(&contract_id.0)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() != 1 {
            return Err(
                CoreError::not_found(format!("price book {} does not exist", contract_id.0)).into()
            );
        }
        Ok(())
    }

    pub async fn get(&self, contract_id: &ContractId) -> Result<ContractPriceHeader, ServiceError> {
        let mut conn = self.pool.acquire().await?;
        load_header(&mut conn, contract_id).await
    }

    pub async fn active_headers_for(
        &self,
        customer_id: &str,
    ) -> Result<Vec<ContractPriceHeader>, ServiceError> {
        let mut conn = self.pool.acquire().await?;
        load_active_headers(&mut conn, customer_id).await
    }

    pub async fn suggest(
        &self,
        customer_id: &str,
        as_of: NaiveDate,
        expense_type: ExpenseType,
    ) -> Result<Option<PriceSuggestion>, ServiceError> {
        let headers = self.active_headers_for(customer_id).await?;
        Ok(pricing::suggest(&headers, as_of, expense_type))
    }
}

fn validate_command(cmd: &PriceBookCommand) -> Result<(), CoreError> {
    if cmd.customer_id.trim().is_empty() {
        return Err(CoreError::validation("customer id must not be blank"));
    }
    if cmd.name.trim().is_empty() {
        return Err(CoreError::validation("price book name must not be blank"));
    }
    if cmd.items.is_empty() {
        return Err(CoreError::validation("a price book needs at least one item"));
    }
    for item in &cmd.items {
        if item.unit_price.is_sign_negative() {
            return Err(CoreError::validation(format!(
                "price for {} must not be negative",
                item.expense_type.as_str()
            )));
        }
    }
    let mut seen: Vec<ExpenseType> = Vec::new();
    for item in &cmd.items {
        if seen.contains(&item.expense_type) {
            return Err(CoreError::validation(format!(
                "duplicate price line for {}",
                item.expense_type.as_str()
            )));
        }
        seen.push(item.expense_type);
    }
    if let Some(expiry) = cmd.expiration_date {
        if expiry < cmd.effective_date {
            return Err(CoreError::validation("expiration date precedes effective date"));
        }
    }
    Ok(())
}

async fn insert_items(
    conn: &mut SqliteConnection,
    header_id: &ContractId,
    items: &[ContractPriceItem],
) -> Result<(), ServiceError> {
    for item in items {
        sqlx::query(
            "INSERT INTO contract_price_items (header_id, expense_type, unit_price, currency)
             VALUES (?, ?, ?, ?)",
        )
        .bind(&header_id.0)
        .bind(item.expense_type.as_str())
        .bind(item.unit_price.to_string())
        .bind(item.currency.as_str())
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn load_header(
    conn: &mut SqliteConnection,
    contract_id: &ContractId,
) -> Result<ContractPriceHeader, ServiceError> {
    let row = sqlx::query("SELECT * FROM contract_price_headers WHERE id = ?")
        .bind(&contract_id.0)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| {
            CoreError::not_found(format!("price book {} does not exist", contract_id.0))
        })?;
    let mut header = rows::contract_header_from_row(&row)?;
    header.items = load_header_items(conn, contract_id).await?;
    Ok(header)
}

async fn load_header_items(
    conn: &mut SqliteConnection,
    contract_id: &ContractId,
) -> Result<Vec<ContractPriceItem>, ServiceError> {
    let item_rows = sqlx::query(
        "SELECT expense_type, CAST(unit_price AS TEXT) AS unit_price, currency
         FROM contract_price_items
         WHERE header_id = ?",
    )
    .bind(&contract_id.0)
    .fetch_all(conn)
    .await?;

    let mut items = Vec::with_capacity(item_rows.len());
    for row in &item_rows {
        items.push(contract_item_from_row(row)?);
    }
    Ok(items)
}

fn contract_item_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<ContractPriceItem, ServiceError> {
    Ok(ContractPriceItem {
        expense_type: ExpenseType::parse(&row.get::<String, _>("expense_type"))?,
        unit_price: rows::parse_decimal("unit_price", &row.get::<String, _>("unit_price"))?,
        currency: Currency::parse(&row.get::<String, _>("currency"))?,
    })
}

/// Active headers for a customer with their items, for the resolver.
pub(crate) async fn load_active_headers(
    conn: &mut SqliteConnection,
    customer_id: &str,
) -> Result<Vec<ContractPriceHeader>, ServiceError> {
    let header_rows = sqlx::query(
        "SELECT * FROM contract_price_headers
         WHERE customer_id = ? AND status = ?
         ORDER BY priority DESC, effective_date",
    )
    .bind(customer_id)
    .bind(ContractStatus::Active.as_str())
    .fetch_all(&mut *conn)
    .await?;

    let mut headers = Vec::with_capacity(header_rows.len());
    for row in &header_rows {
        let mut header = rows::contract_header_from_row(row)?;
        header.items = load_header_items(conn, &header.id).await?;
        headers.push(header);
    }
    Ok(headers)
}
