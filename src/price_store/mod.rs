use std::future::Future;

use crate::error::StoreError;
use crate::model::price_point::PricePoint;

pub mod memory;
pub mod pg;
pub mod sqlite;

pub use self::memory::MemoryStore;
pub use self::pg::PostgresStore;
pub use self::sqlite::SqliteStore;

pub const DEFAULT_TABLE: &str = "crypto_prices";

/// Append-only log of accepted prices, keyed by symbol.
///
/// A missing destination table must surface as
/// [`StoreError::NotInitialized`]; callers stop ticking on that and keep
/// going on anything else.
pub trait PriceStore: Send + Sync {
    /// Create the destination table and index if they do not exist.
    fn provision(&self) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn append(&self, point: &PricePoint) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Most recent `limit` points for `symbol`, oldest first.
    fn history(
        &self,
        symbol: &str,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<PricePoint>, StoreError>> + Send;

    /// DDL that `provision` runs, for operators provisioning by hand.
    fn schema(&self) -> String;
}

/// Table names are interpolated into SQL, so only plain identifiers pass.
pub fn validate_table_name(table: &str) -> Result<(), StoreError> {
    let mut chars = table.chars();
    let head_ok = chars
        .next()
        .map(|c| c.is_ascii_lowercase() || c == '_')
        .unwrap_or(false);
    let tail_ok = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if head_ok && tail_ok && table.len() <= 63 {
        Ok(())
    } else {
        Err(StoreError::InvalidTable(table.to_string()))
    }
}

/// Runtime-selected store backend.
#[derive(Clone)]
pub enum StoreBackend {
    Sqlite(SqliteStore),
    Postgres(PostgresStore),
    Memory(MemoryStore),
}

impl StoreBackend {
    pub fn label(&self) -> &'static str {
        match self {
            StoreBackend::Sqlite(_) => "sqlite",
            StoreBackend::Postgres(_) => "postgres",
            StoreBackend::Memory(_) => "memory",
        }
    }
}

impl PriceStore for StoreBackend {
    async fn provision(&self) -> Result<(), StoreError> {
        match self {
            StoreBackend::Sqlite(s) => s.provision().await,
            StoreBackend::Postgres(s) => s.provision().await,
            StoreBackend::Memory(s) => s.provision().await,
        }
    }

    async fn append(&self, point: &PricePoint) -> Result<(), StoreError> {
        match self {
            StoreBackend::Sqlite(s) => s.append(point).await,
            StoreBackend::Postgres(s) => s.append(point).await,
            StoreBackend::Memory(s) => s.append(point).await,
        }
    }

    async fn history(&self, symbol: &str, limit: usize) -> Result<Vec<PricePoint>, StoreError> {
        match self {
            StoreBackend::Sqlite(s) => s.history(symbol, limit).await,
            StoreBackend::Postgres(s) => s.history(symbol, limit).await,
            StoreBackend::Memory(s) => s.history(symbol, limit).await,
        }
    }

    fn schema(&self) -> String {
        match self {
            StoreBackend::Sqlite(s) => s.schema(),
            StoreBackend::Postgres(s) => s.schema(),
            StoreBackend::Memory(s) => s.schema(),
        }
    }
}
