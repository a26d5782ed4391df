use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use super::PriceStore;
use crate::error::StoreError;
use crate::model::price_point::PricePoint;

/// Process-local price log. Starts provisioned unless created with
/// [`MemoryStore::unprovisioned`], in which case it behaves like a database
/// whose table is missing until `provision` runs.
#[derive(Clone, Default)]
pub struct MemoryStore {
    rows: Arc<Mutex<HashMap<String, Vec<PricePoint>>>>,
    missing: Arc<AtomicBool>,
    table: String,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            table: super::DEFAULT_TABLE.to_string(),
            ..Self::default()
        }
    }

    pub fn unprovisioned() -> Self {
        let store = Self::new();
        store.missing.store(true, Ordering::SeqCst);
        store
    }

    /// Simulates the table being dropped underneath a running feed.
    pub fn drop_table(&self) {
        self.missing.store(true, Ordering::SeqCst);
        if let Ok(mut rows) = self.rows.lock() {
            rows.clear();
        }
    }

    pub fn len(&self, symbol: &str) -> usize {
        self.rows
            .lock()
            .map(|rows| rows.get(symbol).map(Vec::len).unwrap_or(0))
            .unwrap_or(0)
    }

    fn check_provisioned(&self) -> Result<(), StoreError> {
        if self.missing.load(Ordering::SeqCst) {
            Err(StoreError::NotInitialized {
                table: self.table.clone(),
            })
        } else {
            Ok(())
        }
    }

    fn lock_rows(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, Vec<PricePoint>>>, StoreError> {
        self.rows
            .lock()
            .map_err(|_| StoreError::Task("memory store lock poisoned".to_string()))
    }
}

impl PriceStore for MemoryStore {
    async fn provision(&self) -> Result<(), StoreError> {
        self.missing.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn append(&self, point: &PricePoint) -> Result<(), StoreError> {
        self.check_provisioned()?;
        self.lock_rows()?
            .entry(point.symbol.clone())
            .or_default()
            .push(point.clone());
        Ok(())
    }

    async fn history(&self, symbol: &str, limit: usize) -> Result<Vec<PricePoint>, StoreError> {
        self.check_provisioned()?;
        let rows = self.lock_rows()?;
        let points = rows.get(symbol).map(Vec::as_slice).unwrap_or(&[]);
        let mut sorted = points.to_vec();
        sorted.sort_by_key(|p| p.timestamp);
        let start = sorted.len().saturating_sub(limit);
        Ok(sorted.split_off(start))
    }

    fn schema(&self) -> String {
        format!("-- in-memory store `{}`: no DDL required\n", self.table)
    }
}
