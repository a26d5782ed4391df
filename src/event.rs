use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};

use crate::error::CommandError;
use crate::model::price_point::PricePoint;
use crate::model::regime::Regime;
use crate::model::simulation::SimulationState;

#[derive(Debug, Clone, PartialEq)]
pub enum FeedCommand {
    StartExcursion { target_price: f64, duration_secs: f64 },
    StopExcursion,
    SelectSymbol(String),
    /// Re-check the store after the operator provisioned it.
    Resume,
}

#[derive(Debug)]
pub struct FeedRequest {
    pub command: FeedCommand,
    pub reply: oneshot::Sender<Result<FeedSnapshot, CommandError>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedSnapshot {
    pub symbol: String,
    pub coin_name: String,
    pub price: f64,
    pub status: Regime,
    pub feed_label: &'static str,
    pub simulation: SimulationState,
    pub target_change_pct: f64,
    pub halted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub halt_reason: Option<String>,
    /// DDL to run when halted on a missing table.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_hint: Option<String>,
    pub ticks: u64,
    pub transient_store_failures: u64,
    pub last_tick_at: Option<DateTime<Utc>>,
    pub last_point_simulated: bool,
    #[serde(skip)]
    pub window: Vec<PricePoint>,
}

/// Client side of a running feed driver.
#[derive(Clone)]
pub struct FeedHandle {
    requests: mpsc::Sender<FeedRequest>,
    snapshot: watch::Receiver<FeedSnapshot>,
}

impl FeedHandle {
    pub fn new(requests: mpsc::Sender<FeedRequest>, snapshot: watch::Receiver<FeedSnapshot>) -> Self {
        Self { requests, snapshot }
    }

    pub fn snapshot(&self) -> FeedSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<FeedSnapshot> {
        self.snapshot.clone()
    }

    pub async fn send(&self, command: FeedCommand) -> Result<FeedSnapshot, CommandError> {
        let (reply, rx) = oneshot::channel();
        self.requests
            .send(FeedRequest { command, reply })
            .await
            .map_err(|_| CommandError::DriverUnavailable)?;
        rx.await.map_err(|_| CommandError::DriverUnavailable)?
    }

    pub async fn start_excursion(
        &self,
        target_price: f64,
        duration_secs: f64,
    ) -> Result<FeedSnapshot, CommandError> {
        self.send(FeedCommand::StartExcursion {
            target_price,
            duration_secs,
        })
        .await
    }

    pub async fn stop_excursion(&self) -> Result<FeedSnapshot, CommandError> {
        self.send(FeedCommand::StopExcursion).await
    }

    pub async fn select_symbol(&self, symbol: &str) -> Result<FeedSnapshot, CommandError> {
        self.send(FeedCommand::SelectSymbol(symbol.to_string())).await
    }

    pub async fn resume(&self) -> Result<FeedSnapshot, CommandError> {
        self.send(FeedCommand::Resume).await
    }
}
