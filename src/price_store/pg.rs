use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use postgres::error::SqlState;
use postgres::{Client, NoTls};

use super::{validate_table_name, PriceStore};
use crate::error::StoreError;
use crate::model::price_point::PricePoint;

/// Postgres-backed price log using the blocking client. Every call is moved
/// onto the blocking thread pool so the runtime never stalls on I/O.
#[derive(Clone)]
pub struct PostgresStore {
    client: Arc<Mutex<Client>>,
    table: String,
}

impl PostgresStore {
    /// Must be called outside the async runtime (or via `spawn_blocking`).
    pub fn connect(database_url: &str, table: &str) -> Result<Self, StoreError> {
        validate_table_name(table)?;
        let client = Client::connect(database_url, NoTls)?;
        Ok(Self {
            client: Arc::new(Mutex::new(client)),
            table: table.to_string(),
        })
    }

    pub async fn connect_async(database_url: &str, table: &str) -> Result<Self, StoreError> {
        let url = database_url.to_string();
        let table = table.to_string();
        tokio::task::spawn_blocking(move || Self::connect(&url, &table))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }

    async fn run<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Client, &str) -> Result<T, postgres::Error> + Send + 'static,
    {
        let client = Arc::clone(&self.client);
        let table = self.table.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = client
                .lock()
                .map_err(|_| StoreError::Task("postgres client lock poisoned".to_string()))?;
            f(&mut guard, &table).map_err(|e| map_error(e, &table))
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

fn map_error(err: postgres::Error, table: &str) -> StoreError {
    if err.code() == Some(&SqlState::UNDEFINED_TABLE) {
        StoreError::NotInitialized {
            table: table.to_string(),
        }
    } else {
        StoreError::Postgres(err)
    }
}

impl PriceStore for PostgresStore {
    async fn provision(&self) -> Result<(), StoreError> {
        let ddl = self.schema();
        self.run(move |client, _| client.batch_execute(&ddl)).await?;
        tracing::info!(table = %self.table, "Postgres price table provisioned");
        Ok(())
    }

    async fn append(&self, point: &PricePoint) -> Result<(), StoreError> {
        let point = point.clone();
        self.run(move |client, table| {
            let sql = format!(
                "INSERT INTO {} (symbol, price, timestamp, is_simulated) VALUES ($1, $2, $3, $4)",
                table
            );
            client
                .execute(
                    sql.as_str(),
                    &[
                        &point.symbol,
                        &point.price,
                        &point.timestamp,
                        &point.is_simulated,
                    ],
                )
                .map(|_| ())
        })
        .await
    }

    async fn history(&self, symbol: &str, limit: usize) -> Result<Vec<PricePoint>, StoreError> {
        let symbol = symbol.to_string();
        let limit = limit as i64;
        let mut points = self
            .run(move |client, table| {
                let sql = format!(
                    "SELECT symbol, price, timestamp, is_simulated FROM {} \
                     WHERE symbol = $1 ORDER BY timestamp DESC LIMIT $2",
                    table
                );
                let rows = client.query(sql.as_str(), &[&symbol, &limit])?;
                let mut out = Vec::with_capacity(rows.len());
                for row in rows {
                    let timestamp: DateTime<Utc> = row.try_get(2)?;
                    out.push(PricePoint {
                        symbol: row.try_get(0)?,
                        price: row.try_get(1)?,
                        timestamp,
                        is_simulated: row.try_get(3)?,
                    });
                }
                Ok(out)
            })
            .await?;
        points.reverse();
        Ok(points)
    }

    fn schema(&self) -> String {
        format!(
            r#"
CREATE TABLE IF NOT EXISTS {table} (
    id uuid DEFAULT gen_random_uuid() PRIMARY KEY,
    symbol text NOT NULL,
    price double precision NOT NULL,
    timestamp timestamptz NOT NULL DEFAULT now(),
    is_simulated boolean NOT NULL DEFAULT false
);

CREATE INDEX IF NOT EXISTS idx_{table}_symbol_timestamp ON {table}(symbol, timestamp DESC);
"#,
            table = self.table
        )
    }
}
