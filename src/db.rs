//! # Ledger Store
//!
//! SQLite persistence for transactions and their line items, scoped by tenant.
//!
//! Public operations never return errors: failures are logged and reported as
//! neutral values (`false`, empty list, `None`) so a storage problem never
//! takes the bot down.

use chrono::{DateTime, Local, NaiveDateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::errors::PersistenceError;
use crate::fallback::parse_date_token;
use crate::transaction_model::{
    InputMethod, LineItem, Transaction, DEFAULT_CATEGORY, DEFAULT_ESTABLISHMENT,
};

const MAX_CONNECTIONS: u32 = 5;
const BUSY_TIMEOUT_SECS: u64 = 5;
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Total spent in one category
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryTotal {
    pub category: String,
    pub total: f64,
}

/// Total spent in one `YYYY-MM` month
#[derive(Debug, Clone, PartialEq)]
pub struct MonthTotal {
    pub month: String,
    pub total: f64,
}

/// Per-tenant aggregates
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LedgerSummary {
    /// Ordered by descending total
    pub by_category: Vec<CategoryTotal>,
    /// Ordered by descending month
    pub by_month: Vec<MonthTotal>,
}

impl LedgerSummary {
    /// Grand total across all categories
    pub fn total(&self) -> f64 {
        self.by_category.iter().map(|c| c.total).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_category.is_empty() && self.by_month.is_empty()
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: i64,
    chat_id: String,
    establishment_name: Option<String>,
    transaction_date: Option<String>,
    total_amount: Option<f64>,
    category: Option<String>,
    items_json: Option<String>,
    raw_text: Option<String>,
    input_method: Option<String>,
    processed_at: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct ItemRow {
    description: Option<String>,
    quantity: Option<f64>,
    unit_price: Option<f64>,
    total_price: Option<f64>,
    category: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct CategoryRow {
    category: String,
    total: f64,
}

#[derive(Debug, sqlx::FromRow)]
struct MonthRow {
    month: String,
    total: f64,
}

/// Handle to the ledger database. Cheap to clone.
#[derive(Debug, Clone)]
pub struct LedgerStore {
    pool: SqlitePool,
}

impl LedgerStore {
    /// Open (creating if needed) the database at `path` and bring its schema up to date
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(BUSY_TIMEOUT_SECS));

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        info!(path = %path.display(), "Ledger database ready");
        Ok(store)
    }

    /// Underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close every pooled connection
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn init_schema(&self) -> Result<(), PersistenceError> {
        debug!("Initializing ledger schema");

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS transactions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                chat_id TEXT NOT NULL,
                establishment_name TEXT,
                transaction_date TEXT,
                total_amount REAL,
                category TEXT,
                items_json TEXT,
                raw_text TEXT,
                processed_at TEXT DEFAULT CURRENT_TIMESTAMP,
                status TEXT DEFAULT 'processed',
                input_method TEXT DEFAULT 'image'
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS transaction_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                transaction_id INTEGER,
                description TEXT,
                quantity REAL,
                unit_price REAL,
                total_price REAL,
                category TEXT,
                FOREIGN KEY (transaction_id) REFERENCES transactions (id)
            )",
        )
        .execute(&self.pool)
        .await?;

        // Databases created by older releases lack these columns
        self.ensure_column("transactions", "status", "TEXT DEFAULT 'processed'")
            .await?;
        self.ensure_column("transactions", "input_method", "TEXT DEFAULT 'image'")
            .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_transactions_chat
             ON transactions (chat_id, processed_at)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_items_transaction
             ON transaction_items (transaction_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Add `column` to `table` unless it already exists
    async fn ensure_column(
        &self,
        table: &str,
        column: &str,
        declaration: &str,
    ) -> Result<(), PersistenceError> {
        let columns: Vec<String> = sqlx::query_scalar("SELECT name FROM pragma_table_info(?)")
            .bind(table)
            .fetch_all(&self.pool)
            .await?;

        if !columns.iter().any(|name| name == column) {
            sqlx::query(&format!("ALTER TABLE {table} ADD COLUMN {column} {declaration}"))
                .execute(&self.pool)
                .await?;
            info!(table, column, "Added missing column");
        }
        Ok(())
    }

    /// Persist a transaction and its items atomically.
    ///
    /// On success the transaction's `id` and `processed_at` are filled in.
    /// Returns `false` (and leaves no partial rows) on any failure.
    pub async fn save(&self, transaction: &mut Transaction) -> bool {
        let processed_at = Utc::now();
        match self.insert(transaction, processed_at).await {
            Ok(id) => {
                transaction.id = Some(id);
                transaction.processed_at = Some(processed_at);
                info!(
                    user_id = %transaction.tenant_id,
                    transaction_id = id,
                    items = transaction.items.len(),
                    "Transaction saved"
                );
                true
            }
            Err(e) => {
                error!(user_id = %transaction.tenant_id, error = %e, "Failed to save transaction");
                false
            }
        }
    }

    async fn insert(
        &self,
        transaction: &Transaction,
        processed_at: DateTime<Utc>,
    ) -> Result<i64, PersistenceError> {
        let items_json = transaction.items_json()?;
        let mut tx = self.pool.begin().await?;

        let id = sqlx::query(
            "INSERT INTO transactions
             (chat_id, establishment_name, transaction_date, total_amount, category,
              items_json, raw_text, processed_at, status, input_method)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'processed', ?)",
        )
        .bind(&transaction.tenant_id)
        .bind(&transaction.establishment)
        .bind(transaction.date_iso())
        .bind(transaction.total_amount)
        .bind(&transaction.category)
        .bind(items_json)
        .bind(&transaction.raw_text)
        .bind(processed_at.format(TIMESTAMP_FORMAT).to_string())
        .bind(transaction.input_method.as_str())
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        for item in &transaction.items {
            sqlx::query(
                "INSERT INTO transaction_items
                 (transaction_id, description, quantity, unit_price, total_price, category)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(id)
            .bind(&item.description)
            .bind(item.quantity)
            .bind(item.unit_price)
            .bind(item.total_price)
            .bind(&item.category)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(id)
    }

    /// Most recent transactions of a tenant, newest first. Empty on failure.
    pub async fn list_recent(&self, tenant_id: &str, limit: u32) -> Vec<Transaction> {
        match self.fetch_recent(tenant_id, limit).await {
            Ok(transactions) => transactions,
            Err(e) => {
                error!(user_id = %tenant_id, error = %e, "Failed to list transactions");
                Vec::new()
            }
        }
    }

    async fn fetch_recent(
        &self,
        tenant_id: &str,
        limit: u32,
    ) -> Result<Vec<Transaction>, PersistenceError> {
        let rows: Vec<TransactionRow> = sqlx::query_as(
            "SELECT id, chat_id, establishment_name,
                    CAST(transaction_date AS TEXT) AS transaction_date,
                    CAST(total_amount AS REAL) AS total_amount,
                    category, items_json, raw_text, input_method,
                    CAST(processed_at AS TEXT) AS processed_at
             FROM transactions
             WHERE chat_id = ?
             ORDER BY processed_at DESC, id DESC
             LIMIT ?",
        )
        .bind(tenant_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        let mut transactions = Vec::with_capacity(rows.len());
        for row in rows {
            let items: Vec<ItemRow> = sqlx::query_as(
                "SELECT description,
                        CAST(quantity AS REAL) AS quantity,
                        CAST(unit_price AS REAL) AS unit_price,
                        CAST(total_price AS REAL) AS total_price,
                        category
                 FROM transaction_items
                 WHERE transaction_id = ?
                 ORDER BY id",
            )
            .bind(row.id)
            .fetch_all(&self.pool)
            .await?;
            transactions.push(row_to_transaction(row, items));
        }
        Ok(transactions)
    }

    /// Totals per category and per month for a tenant. `None` on failure.
    pub async fn summarize(&self, tenant_id: &str) -> Option<LedgerSummary> {
        match self.fetch_summary(tenant_id).await {
            Ok(summary) => Some(summary),
            Err(e) => {
                error!(user_id = %tenant_id, error = %e, "Failed to summarize ledger");
                None
            }
        }
    }

    async fn fetch_summary(&self, tenant_id: &str) -> Result<LedgerSummary, PersistenceError> {
        let by_category: Vec<CategoryRow> = sqlx::query_as(
            "SELECT COALESCE(category, ?) AS category,
                    CAST(COALESCE(SUM(total_amount), 0) AS REAL) AS total
             FROM transactions
             WHERE chat_id = ?
             GROUP BY 1
             ORDER BY total DESC, category",
        )
        .bind(DEFAULT_CATEGORY)
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        let by_month: Vec<MonthRow> = sqlx::query_as(
            "SELECT strftime('%Y-%m', transaction_date) AS month,
                    CAST(COALESCE(SUM(total_amount), 0) AS REAL) AS total
             FROM transactions
             WHERE chat_id = ? AND strftime('%Y-%m', transaction_date) IS NOT NULL
             GROUP BY 1
             ORDER BY month DESC",
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(LedgerSummary {
            by_category: by_category
                .into_iter()
                .map(|row| CategoryTotal {
                    category: row.category,
                    total: row.total,
                })
                .collect(),
            by_month: by_month
                .into_iter()
                .map(|row| MonthTotal {
                    month: row.month,
                    total: row.total,
                })
                .collect(),
        })
    }

    /// Delete a tenant's data, or every tenant's when `tenant_id` is `None`.
    ///
    /// Idempotent. A full wipe also compacts the file.
    pub async fn clear(&self, tenant_id: Option<&str>) -> bool {
        match self.delete(tenant_id).await {
            Ok(removed) => {
                match tenant_id {
                    Some(tenant_id) => {
                        info!(user_id = %tenant_id, removed, "Tenant ledger cleared")
                    }
                    None => {
                        info!(removed, "Entire ledger cleared");
                        if let Err(e) = sqlx::query("VACUUM").execute(&self.pool).await {
                            warn!(error = %e, "VACUUM after full clear failed");
                        }
                    }
                }
                true
            }
            Err(e) => {
                error!(user_id = ?tenant_id, error = %e, "Failed to clear ledger");
                false
            }
        }
    }

    async fn delete(&self, tenant_id: Option<&str>) -> Result<u64, PersistenceError> {
        let mut tx = self.pool.begin().await?;

        let removed = match tenant_id {
            Some(tenant_id) => {
                sqlx::query(
                    "DELETE FROM transaction_items
                     WHERE transaction_id IN (SELECT id FROM transactions WHERE chat_id = ?)",
                )
                .bind(tenant_id)
                .execute(&mut *tx)
                .await?;
                sqlx::query("DELETE FROM transactions WHERE chat_id = ?")
                    .bind(tenant_id)
                    .execute(&mut *tx)
                    .await?
                    .rows_affected()
            }
            None => {
                sqlx::query("DELETE FROM transaction_items")
                    .execute(&mut *tx)
                    .await?;
                sqlx::query("DELETE FROM transactions")
                    .execute(&mut *tx)
                    .await?
                    .rows_affected()
            }
        };

        tx.commit().await?;
        Ok(removed)
    }
}

fn row_to_transaction(row: TransactionRow, item_rows: Vec<ItemRow>) -> Transaction {
    let processed_at = row.processed_at.as_deref().and_then(parse_timestamp);
    let fallback_date = processed_at
        .map(|at| at.date_naive())
        .unwrap_or_else(|| Local::now().date_naive());

    let input_method = row
        .input_method
        .as_deref()
        .and_then(|method| method.parse().ok())
        .unwrap_or(InputMethod::Image);

    let items = if item_rows.is_empty() {
        // Rows written before per-item storage only carry the JSON blob
        row.items_json
            .as_deref()
            .and_then(|blob| serde_json::from_str::<Vec<LineItem>>(blob).ok())
            .unwrap_or_default()
    } else {
        item_rows.into_iter().map(row_to_item).collect()
    };

    Transaction {
        id: Some(row.id),
        tenant_id: row.chat_id,
        establishment: row
            .establishment_name
            .unwrap_or_else(|| DEFAULT_ESTABLISHMENT.to_string()),
        date: row
            .transaction_date
            .as_deref()
            .and_then(parse_date_token)
            .unwrap_or(fallback_date),
        total_amount: row.total_amount.unwrap_or(0.0),
        category: row.category.unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
        raw_text: row.raw_text.unwrap_or_default(),
        input_method,
        items,
        processed_at,
    }
}

fn row_to_item(row: ItemRow) -> LineItem {
    let quantity = row.quantity.filter(|q| *q > 0.0).unwrap_or(1.0);
    let unit_price = row.unit_price.unwrap_or(0.0);
    LineItem {
        description: row.description.unwrap_or_default(),
        quantity,
        unit_price,
        total_price: row.total_price.unwrap_or(unit_price * quantity),
        category: row.category.unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
    }
}

/// Stored timestamps are UTC, with or without fractional seconds
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
        .or_else(|| {
            DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|at| at.with_timezone(&Utc))
        })
}
