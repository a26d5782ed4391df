use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// One accepted price for an asset. Produced exactly once per tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub symbol: String,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
    pub is_simulated: bool,
}

impl PricePoint {
    pub fn new(symbol: &str, price: f64, timestamp: DateTime<Utc>, is_simulated: bool) -> Self {
        Self {
            symbol: symbol.to_string(),
            price,
            timestamp,
            is_simulated,
        }
    }

    /// RFC 3339 with millisecond precision and a `Z` suffix. Fixed width, so
    /// lexical order matches chronological order.
    pub fn timestamp_iso(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}
