use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use super::{validate_table_name, PriceStore};
use crate::error::StoreError;
use crate::model::price_point::PricePoint;

/// SQLite-backed price log. The connection is shared behind a mutex; every
/// statement runs to completion on the blocking pool while the lock is held.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    table: String,
}

impl SqliteStore {
    /// Open (or create) the database file. The table itself is not created;
    /// see [`PriceStore::provision`].
    pub fn open(path: &Path, table: &str) -> Result<Self, StoreError> {
        validate_table_name(table)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Task(format!("create {}: {}", parent.display(), e)))?;
            }
        }
        let conn = Connection::open(path)?;
        Ok(Self::from_connection(conn, table))
    }

    pub fn open_in_memory(table: &str) -> Result<Self, StoreError> {
        validate_table_name(table)?;
        Ok(Self::from_connection(Connection::open_in_memory()?, table))
    }

    fn from_connection(conn: Connection, table: &str) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            table: table.to_string(),
        }
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T, StoreError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| StoreError::Task("sqlite connection lock poisoned".to_string()))?;
        f(&conn).map_err(|e| self.map_error(e))
    }

    async fn run<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&SqliteStore) -> Result<T, StoreError> + Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }

    fn map_error(&self, err: rusqlite::Error) -> StoreError {
        let missing = match &err {
            rusqlite::Error::SqliteFailure(_, Some(msg)) => msg.contains("no such table"),
            _ => false,
        };
        if missing {
            StoreError::NotInitialized {
                table: self.table.clone(),
            }
        } else {
            StoreError::Sqlite(err)
        }
    }

    fn append_blocking(&self, point: &PricePoint) -> Result<(), StoreError> {
        let sql = format!(
            "INSERT INTO {} (id, symbol, price, timestamp, is_simulated) VALUES (?1, ?2, ?3, ?4, ?5)",
            self.table
        );
        self.with_conn(|conn| {
            conn.execute(
                &sql,
                params![
                    uuid::Uuid::new_v4().to_string(),
                    point.symbol,
                    point.price,
                    point.timestamp_iso(),
                    point.is_simulated,
                ],
            )
        })?;
        Ok(())
    }

    fn history_blocking(&self, symbol: &str, limit: usize) -> Result<Vec<PricePoint>, StoreError> {
        let sql = format!(
            r#"
            SELECT symbol, price, timestamp, is_simulated
            FROM {}
            WHERE symbol = ?1
            ORDER BY timestamp DESC, rowid DESC
            LIMIT ?2
            "#,
            self.table
        );
        let rows: Vec<(String, f64, String, bool)> = self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![symbol, limit as i64], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })?;
            let collected: rusqlite::Result<Vec<_>> = rows.collect();
            collected
        })?;

        let mut points = Vec::with_capacity(rows.len());
        for (symbol, price, ts, is_simulated) in rows {
            let timestamp = DateTime::parse_from_rfc3339(&ts)
                .map_err(|e| StoreError::Corrupt(format!("timestamp `{}`: {}", ts, e)))?
                .with_timezone(&Utc);
            points.push(PricePoint {
                symbol,
                price,
                timestamp,
                is_simulated,
            });
        }
        points.reverse();
        Ok(points)
    }
}

impl PriceStore for SqliteStore {
    async fn provision(&self) -> Result<(), StoreError> {
        let ddl = self.schema();
        self.run(move |store| store.with_conn(|conn| conn.execute_batch(&ddl)))
            .await?;
        tracing::info!(table = %self.table, "SQLite price table provisioned");
        Ok(())
    }

    async fn append(&self, point: &PricePoint) -> Result<(), StoreError> {
        let point = point.clone();
        self.run(move |store| store.append_blocking(&point)).await
    }

    async fn history(&self, symbol: &str, limit: usize) -> Result<Vec<PricePoint>, StoreError> {
        let symbol = symbol.to_string();
        self.run(move |store| store.history_blocking(&symbol, limit))
            .await
    }

    fn schema(&self) -> String {
        format!(
            r#"
CREATE TABLE IF NOT EXISTS {table} (
    id TEXT PRIMARY KEY NOT NULL,
    symbol TEXT NOT NULL,
    price REAL NOT NULL,
    timestamp TEXT NOT NULL,
    is_simulated INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_{table}_symbol_timestamp ON {table}(symbol, timestamp DESC);
"#,
            table = self.table
        )
    }
}
