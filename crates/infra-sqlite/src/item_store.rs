// SQLite ItemStore Implementation

use async_trait::async_trait;
use crawlq_core::domain::{Item, ItemState};
use crawlq_core::error::{AppError, Result};
use crawlq_core::port::{FieldPatch, ItemFilter, ItemStore};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

// Helper to convert sqlx::Error to AppError with structured information
fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => {
            if let Some(code) = db_err.code() {
                let code_str = code.as_ref();

                // SQLite error codes: https://www.sqlite.org/rescode.html
                match code_str {
                    "2067" | "1555" => AppError::Database(format!(
                        "Unique constraint violation: {} ({})",
                        db_err.message(),
                        code_str
                    )),
                    "5" => AppError::Database(format!(
                        "Database locked (SQLITE_BUSY): {}",
                        db_err.message()
                    )),
                    "13" => AppError::Database(format!("Database full: {}", db_err.message())),
                    _ => AppError::Database(format!(
                        "Database error [{}]: {}",
                        code_str,
                        db_err.message()
                    )),
                }
            } else {
                AppError::Database(format!("Database error: {}", db_err.message()))
            }
        }
        sqlx::Error::RowNotFound => AppError::Database("Row not found".to_string()),
        sqlx::Error::ColumnNotFound(col) => {
            AppError::Database(format!("Column not found: {}", col))
        }
        _ => AppError::Database(err.to_string()),
    }
}

/// A primary-key conflict on insert. Under concurrent producers this is the
/// expected enqueue race, not a fault.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err
            .code()
            .map(|code| matches!(code.as_ref(), "2067" | "1555"))
            .unwrap_or(false),
        _ => false,
    }
}

pub struct SqliteItemStore {
    pool: SqlitePool,
}

impl SqliteItemStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Single UPDATE with dynamic SET clauses, optionally guarded on the
    /// current state. The guard rides in the WHERE clause, so the whole
    /// compare-and-set is one atomic statement.
    async fn update_row(
        &self,
        configuration: &str,
        identifier: &str,
        expected: Option<ItemState>,
        patch: FieldPatch,
    ) -> Result<u64> {
        if patch.is_empty() {
            return Err(AppError::Internal("empty field patch".to_string()));
        }
        let data = match &patch.data {
            Some(value) => Some(serde_json::to_string(value)?),
            None => None,
        };

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE queue_items SET ");
        {
            let mut set = builder.separated(", ");
            if let Some(state) = patch.state {
                set.push("state = ");
                set.push_bind_unseparated(state.to_string());
            }
            if let Some(message) = patch.message {
                set.push("message = ");
                set.push_bind_unseparated(message);
            }
            if let Some(hash) = patch.hash {
                set.push("hash = ");
                set.push_bind_unseparated(hash);
            }
            if let Some(timestamp) = patch.timestamp {
                set.push("timestamp = ");
                set.push_bind_unseparated(timestamp);
            }
            if let Some(data) = data {
                set.push("data = ");
                set.push_bind_unseparated(data);
            }
        }
        builder
            .push(" WHERE configuration = ")
            .push_bind(configuration.to_string())
            .push(" AND identifier = ")
            .push_bind(identifier.to_string());
        if let Some(expected) = expected {
            builder
                .push(" AND state = ")
                .push_bind(expected.to_string());
        }

        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }
}

fn push_filter(builder: &mut QueryBuilder<'_, Sqlite>, filter: &ItemFilter) {
    match filter {
        ItemFilter::All => {}
        ItemFilter::State(state) => {
            builder.push(" WHERE state = ").push_bind(state.to_string());
        }
        ItemFilter::Finished => {
            builder
                .push(" WHERE state IN (")
                .push_bind(ItemState::Success.to_string())
                .push(", ")
                .push_bind(ItemState::Error.to_string())
                .push(")");
        }
        ItemFilter::InProgressWithToken(token) => {
            builder
                .push(" WHERE hash = ")
                .push_bind(token.clone())
                .push(" AND state = ")
                .push_bind(ItemState::InProgress.to_string());
        }
    }
}

#[async_trait]
impl ItemStore for SqliteItemStore {
    async fn upsert_reset(&self, item: &Item, now: i64) -> Result<u64> {
        // Update-first: an existing row is reset to PENDING in place,
        // whatever state it was in.
        let reset = FieldPatch {
            state: Some(ItemState::Pending),
            message: Some(String::new()),
            hash: Some(String::new()),
            timestamp: Some(now),
            data: Some(item.data.clone()),
        };
        let changed = self
            .unconditional_update(&item.configuration, &item.identifier, reset)
            .await?;
        if changed > 0 {
            return Ok(changed);
        }

        let data = serde_json::to_string(&item.data)?;
        let result = sqlx::query(
            r#"
            INSERT INTO queue_items (configuration, identifier, timestamp, state, message, data, hash)
            VALUES (?, ?, ?, ?, '', ?, '')
            "#,
        )
        .bind(&item.configuration)
        .bind(&item.identifier)
        .bind(now)
        .bind(ItemState::Pending.to_string())
        .bind(&data)
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) => Ok(done.rows_affected()),
            // Lost the insert race against a concurrent producer
            Err(err) if is_unique_violation(&err) => Ok(0),
            Err(err) => Err(map_sqlx_error(err)),
        }
    }

    async fn conditional_update(
        &self,
        configuration: &str,
        identifier: &str,
        expected: ItemState,
        patch: FieldPatch,
    ) -> Result<u64> {
        self.update_row(configuration, identifier, Some(expected), patch)
            .await
    }

    async fn unconditional_update(
        &self,
        configuration: &str,
        identifier: &str,
        patch: FieldPatch,
    ) -> Result<u64> {
        self.update_row(configuration, identifier, None, patch).await
    }

    async fn select_where(&self, filter: ItemFilter, limit: Option<u32>) -> Result<Vec<Item>> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT configuration, identifier, timestamp, state, message, data, hash FROM queue_items",
        );
        push_filter(&mut builder, &filter);
        builder.push(" ORDER BY timestamp ASC, configuration ASC, identifier ASC");
        if let Some(limit) = limit {
            builder.push(" LIMIT ").push_bind(i64::from(limit));
        }

        let rows: Vec<ItemRow> = builder
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        rows.into_iter().map(|row| row.into_item()).collect()
    }

    async fn count_where(&self, filter: ItemFilter) -> Result<i64> {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT COUNT(*) FROM queue_items");
        push_filter(&mut builder, &filter);

        let count: i64 = builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(count)
    }
}

/// SQLite row representation
#[derive(Debug, sqlx::FromRow)]
struct ItemRow {
    configuration: String,
    identifier: String,
    timestamp: i64,
    state: String,
    message: String,
    data: String,
    hash: String,
}

impl ItemRow {
    /// The one place the JSON payload is deserialized. Unknown states and
    /// malformed payloads are distinguishable failures, not silent defaults.
    fn into_item(self) -> Result<Item> {
        let state: ItemState = self.state.parse().map_err(AppError::Domain)?;
        let data: serde_json::Value = serde_json::from_str(&self.data)?;

        Ok(Item {
            configuration: self.configuration,
            identifier: self.identifier,
            state,
            message: self.message,
            data,
            hash: self.hash,
            timestamp: self.timestamp,
        })
    }
}
