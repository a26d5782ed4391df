use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{SimulationError, TickError};
use crate::model::regime::{Regime, RegimeEvent};

/// Regime plus the parameters of the excursion that is (or was last) running.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SimulationState {
    pub status: Regime,
    /// Price when the excursion began.
    pub start_price: f64,
    pub target_price: f64,
    /// Epoch millis, set only when entering `Active`.
    pub start_time_ms: i64,
    pub duration_secs: f64,
}

impl SimulationState {
    pub fn idle() -> Self {
        Self::default()
    }

    /// `Idle -> Active`. The excursion starts from `current_price` at `now`.
    pub fn start_excursion(
        &self,
        current_price: f64,
        target_price: f64,
        duration_secs: f64,
        now: DateTime<Utc>,
    ) -> Result<Self, SimulationError> {
        if !target_price.is_finite() || target_price <= 0.0 {
            return Err(SimulationError::InvalidTarget(target_price));
        }
        if !duration_secs.is_finite() || duration_secs <= 0.0 {
            return Err(SimulationError::InvalidDuration(duration_secs));
        }
        let status = self.status.transition(RegimeEvent::Start)?;
        Ok(Self {
            status,
            start_price: current_price,
            target_price,
            start_time_ms: now.timestamp_millis(),
            duration_secs,
        })
    }

    /// `Active -> Recovering` without waiting for the duration to run out.
    pub fn stop_excursion(&self) -> Result<Self, SimulationError> {
        let status = self.status.transition(RegimeEvent::Stop)?;
        Ok(Self { status, ..*self })
    }

    /// Copy with the regime a tick decided on. Excursion parameters are kept
    /// so a snapshot still shows what was last run.
    pub fn with_status(&self, status: Regime) -> Self {
        Self { status, ..*self }
    }

    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> f64 {
        (now.timestamp_millis() - self.start_time_ms) as f64 / 1000.0
    }

    pub fn time_left_secs(&self, now: DateTime<Utc>) -> f64 {
        self.duration_secs - self.elapsed_secs(now)
    }

    /// Percentage move from `current_price` to the target, 0 when undefined.
    pub fn target_change_pct(&self, current_price: f64) -> f64 {
        target_change_pct(current_price, self.target_price)
    }

    pub fn validate(&self) -> Result<(), TickError> {
        if self.status != Regime::Active {
            return Ok(());
        }
        if !self.duration_secs.is_finite() || self.duration_secs <= 0.0 {
            return Err(SimulationError::InvalidDuration(self.duration_secs).into());
        }
        if !self.target_price.is_finite() || self.target_price <= 0.0 {
            return Err(SimulationError::InvalidTarget(self.target_price).into());
        }
        Ok(())
    }
}

pub fn target_change_pct(current_price: f64, target_price: f64) -> f64 {
    if current_price <= 0.0 || !current_price.is_finite() || !target_price.is_finite() {
        return 0.0;
    }
    (target_price - current_price) / current_price * 100.0
}
