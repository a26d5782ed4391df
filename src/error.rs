use serde::Serialize;
use thiserror::Error;

use crate::model::regime::{Regime, RegimeEvent};

/// Failures talking to the Binance REST API.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("binance API error (code {code}): {msg}")]
    BinanceApi { code: i64, msg: String },

    #[error("binance request failed with HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("ticker price for {symbol} is not usable: {price}")]
    UnusablePrice { symbol: String, price: f64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimulationError {
    #[error("cannot apply {event:?} while {from}")]
    InvalidTransition { from: Regime, event: RegimeEvent },

    #[error("target price must be finite and > 0, got {0}")]
    InvalidTarget(f64),

    #[error("duration must be finite and > 0 seconds, got {0}")]
    InvalidDuration(f64),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TickError {
    #[error("invalid tick input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Simulation(#[from] SimulationError),
}

/// Coarse classification of a persistence failure. Only `NotInitialized`
/// changes what the caller does (stop ticking).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreErrorKind {
    NotInitialized,
    Transient,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("table `{table}` does not exist; run `price-excursion init-db`")]
    NotInitialized { table: String },

    #[error("invalid table name `{0}`")]
    InvalidTable(String),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("postgres error: {0}")]
    Postgres(#[from] postgres::Error),

    #[error("store task failed: {0}")]
    Task(String),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn kind(&self) -> StoreErrorKind {
        match self {
            StoreError::NotInitialized { .. } => StoreErrorKind::NotInitialized,
            _ => StoreErrorKind::Transient,
        }
    }

    pub fn is_not_initialized(&self) -> bool {
        self.kind() == StoreErrorKind::NotInitialized
    }
}

#[derive(Error, Debug)]
pub enum CommandError {
    #[error(transparent)]
    Simulation(#[from] SimulationError),

    #[error("unknown symbol `{0}`")]
    UnknownSymbol(String),

    #[error("feed is halted: {0}")]
    Halted(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("feed driver is not running")]
    DriverUnavailable,
}
