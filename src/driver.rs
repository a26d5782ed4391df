//! Timer loop that owns one asset's feed: it calls the tick processor once
//! per interval, applies operator commands between ticks, and publishes a
//! snapshot after every change.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

use crate::error::{CommandError, StoreError};
use crate::event::{FeedCommand, FeedHandle, FeedRequest, FeedSnapshot};
use crate::model::coin::find_coin;
use crate::model::simulation::SimulationState;
use crate::price_source::PriceSource;
use crate::price_store::PriceStore;
use crate::price_window::PriceWindow;
use crate::tick_processor::{TickOutcome, TickProcessor};
use crate::trajectory::NoiseSource;

#[derive(Debug, Clone, Copy)]
pub struct DriverSettings {
    pub window_len: usize,
    pub history_load_limit: usize,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            window_len: 200,
            history_load_limit: 100,
        }
    }
}

pub struct FeedDriver<S, P, N> {
    processor: TickProcessor<S, P, N>,
    settings: DriverSettings,
    symbol: String,
    current_price: f64,
    state: SimulationState,
    window: PriceWindow,
    halt_reason: Option<String>,
    ticks: u64,
    transient_store_failures: u64,
    last_tick_at: Option<DateTime<Utc>>,
    last_point_simulated: bool,
}

impl<S, P, N> FeedDriver<S, P, N>
where
    S: PriceSource + 'static,
    P: PriceStore + 'static,
    N: NoiseSource + Send + Sync + 'static,
{
    pub fn new(
        processor: TickProcessor<S, P, N>,
        symbol: &str,
        settings: DriverSettings,
    ) -> Result<Self, CommandError> {
        let coin = find_coin(symbol).ok_or_else(|| CommandError::UnknownSymbol(symbol.to_string()))?;
        Ok(Self {
            processor,
            settings,
            symbol: coin.symbol.to_string(),
            current_price: 0.0,
            state: SimulationState::idle(),
            window: PriceWindow::new(settings.window_len),
            halt_reason: None,
            ticks: 0,
            transient_store_failures: 0,
            last_tick_at: None,
            last_point_simulated: false,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn current_price(&self) -> f64 {
        self.current_price
    }

    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    pub fn window(&self) -> &PriceWindow {
        &self.window
    }

    pub fn is_halted(&self) -> bool {
        self.halt_reason.is_some()
    }

    /// Reload the window from the store and seed the current price from the
    /// newest stored point. A missing table halts the feed.
    pub async fn load_history(&mut self) -> Result<usize, StoreError> {
        match self
            .processor
            .store()
            .history(&self.symbol, self.settings.history_load_limit)
            .await
        {
            Ok(points) => {
                let loaded = points.len();
                self.current_price = points.last().map(|p| p.price).unwrap_or(0.0);
                self.window.reset(points);
                self.halt_reason = None;
                tracing::info!(symbol = %self.symbol, loaded, price = self.current_price, "History loaded");
                Ok(loaded)
            }
            Err(e) => {
                if e.is_not_initialized() {
                    self.halt(e.to_string());
                } else {
                    tracing::warn!(symbol = %self.symbol, error = %e, "Failed to load history");
                }
                Err(e)
            }
        }
    }

    fn halt(&mut self, reason: String) {
        tracing::error!(symbol = %self.symbol, reason = %reason, "Feed halted; price store needs provisioning");
        self.halt_reason = Some(reason);
    }

    fn ensure_running(&self) -> Result<(), CommandError> {
        match &self.halt_reason {
            Some(reason) => Err(CommandError::Halted(reason.clone())),
            None => Ok(()),
        }
    }

    pub fn start_excursion_at(
        &mut self,
        target_price: f64,
        duration_secs: f64,
        now: DateTime<Utc>,
    ) -> Result<(), CommandError> {
        self.ensure_running()?;
        self.state = self
            .state
            .start_excursion(self.current_price, target_price, duration_secs, now)?;
        tracing::info!(
            symbol = %self.symbol,
            start_price = self.current_price,
            target_price,
            duration_secs,
            "Excursion started"
        );
        Ok(())
    }

    /// Takes effect on the next tick.
    pub fn stop_excursion(&mut self) -> Result<(), CommandError> {
        self.ensure_running()?;
        self.state = self.state.stop_excursion()?;
        tracing::info!(symbol = %self.symbol, price = self.current_price, "Excursion stopped");
        Ok(())
    }

    /// Switch assets: the simulation resets to idle and the new asset's
    /// history is loaded.
    pub async fn select_symbol(&mut self, symbol: &str) -> Result<(), CommandError> {
        let coin = find_coin(symbol).ok_or_else(|| CommandError::UnknownSymbol(symbol.to_string()))?;
        self.symbol = coin.symbol.to_string();
        self.state = SimulationState::idle();
        self.current_price = 0.0;
        self.window.reset(Vec::new());
        tracing::info!(symbol = %self.symbol, "Symbol selected");
        // A missing table halts inside load_history; other failures leave an
        // empty window and the feed keeps ticking.
        let _ = self.load_history().await;
        Ok(())
    }

    pub async fn resume(&mut self) -> Result<(), CommandError> {
        match self.load_history().await {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_initialized() => Err(CommandError::Halted(e.to_string())),
            Err(e) => Err(CommandError::Store(e)),
        }
    }

    pub async fn apply(
        &mut self,
        command: FeedCommand,
        now: DateTime<Utc>,
    ) -> Result<FeedSnapshot, CommandError> {
        match command {
            FeedCommand::StartExcursion {
                target_price,
                duration_secs,
            } => self.start_excursion_at(target_price, duration_secs, now)?,
            FeedCommand::StopExcursion => self.stop_excursion()?,
            FeedCommand::SelectSymbol(symbol) => self.select_symbol(&symbol).await?,
            FeedCommand::Resume => self.resume().await?,
        }
        Ok(self.snapshot())
    }

    /// One tick as of `now`. Returns `None` while halted or when the tick was
    /// rejected.
    pub async fn tick_at(&mut self, now: DateTime<Utc>) -> Option<TickOutcome> {
        if self.is_halted() {
            return None;
        }
        let outcome = match self
            .processor
            .process_at(&self.symbol, self.current_price, &self.state, now)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(symbol = %self.symbol, error = %e, "Tick rejected");
                return None;
            }
        };

        self.ticks += 1;
        self.last_tick_at = Some(now);
        if outcome.store_not_initialized() {
            // The point was not recorded; hold the feed where it is.
            self.halt(format!(
                "price table missing while writing {}",
                self.symbol
            ));
            return Some(outcome);
        }
        if outcome.store_error.is_some() {
            self.transient_store_failures += 1;
        }

        self.current_price = outcome.next_price;
        self.state = self.state.with_status(outcome.next_status);
        self.last_point_simulated = outcome.is_simulated;
        self.window.push(outcome.point.clone());
        Some(outcome)
    }

    pub fn snapshot(&self) -> FeedSnapshot {
        let coin_name = find_coin(&self.symbol)
            .map(|c| c.name.to_string())
            .unwrap_or_default();
        FeedSnapshot {
            symbol: self.symbol.clone(),
            coin_name,
            price: self.current_price,
            status: self.state.status,
            feed_label: self.state.status.feed_label(),
            simulation: self.state,
            target_change_pct: self.state.target_change_pct(self.current_price),
            halted: self.is_halted(),
            halt_reason: self.halt_reason.clone(),
            schema_hint: self
                .halt_reason
                .as_ref()
                .map(|_| self.processor.store().schema()),
            ticks: self.ticks,
            transient_store_failures: self.transient_store_failures,
            last_tick_at: self.last_tick_at,
            last_point_simulated: self.last_point_simulated,
            window: self.window.tail(self.window.capacity()),
        }
    }

    /// Spawn the driver loop on the current runtime.
    pub fn spawn(
        self,
        tick_interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> (FeedHandle, tokio::task::JoinHandle<()>) {
        let (req_tx, req_rx) = mpsc::channel(32);
        let (snapshot_tx, snapshot_rx) = watch::channel(self.snapshot());
        let handle = FeedHandle::new(req_tx, snapshot_rx);
        let join = tokio::spawn(self.run(tick_interval, req_rx, snapshot_tx, shutdown));
        (handle, join)
    }

    /// Ticks never overlap: each tick is awaited before the loop selects again,
    /// and overdue ticks are skipped rather than queued.
    pub async fn run(
        mut self,
        tick_interval: Duration,
        mut requests: mpsc::Receiver<FeedRequest>,
        snapshot_tx: watch::Sender<FeedSnapshot>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let _ = self.load_history().await;
        snapshot_tx.send_replace(self.snapshot());

        let mut ticker = tokio::time::interval(tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            symbol = %self.symbol,
            interval_ms = tick_interval.as_millis() as u64,
            "Feed driver started"
        );

        loop {
            let halted = self.is_halted();
            tokio::select! {
                _ = ticker.tick(), if !halted => {
                    let _ = self.tick_at(Utc::now()).await;
                    snapshot_tx.send_replace(self.snapshot());
                }
                req = requests.recv() => {
                    let Some(req) = req else { break };
                    let result = self.apply(req.command, Utc::now()).await;
                    if let Err(e) = &result {
                        tracing::warn!(symbol = %self.symbol, error = %e, "Feed command rejected");
                    }
                    let _ = req.reply.send(result);
                    snapshot_tx.send_replace(self.snapshot());
                }
                _ = shutdown.changed() => break,
            }
        }
        tracing::info!(symbol = %self.symbol, "Feed driver stopped");
    }
}
