//! Per-tick price decision.
//!
//! Given the last accepted price and the current [`SimulationState`], decide
//! the next price and regime, then append the resulting [`PricePoint`] to the
//! store. State is passed in and returned; nothing is retained between ticks
//! apart from the noise generator.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use serde::Serialize;

use crate::error::{StoreErrorKind, TickError};
use crate::model::price_point::PricePoint;
use crate::model::regime::{Regime, RegimeEvent};
use crate::model::simulation::SimulationState;
use crate::price_source::PriceSource;
use crate::price_store::PriceStore;
use crate::trajectory::{NoiseSource, TrajectoryParams};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickOutcome {
    pub next_price: f64,
    pub is_simulated: bool,
    pub next_status: Regime,
    /// Set when the point could not be persisted. The price is still valid.
    pub store_error: Option<StoreErrorKind>,
    /// The point this tick produced (and attempted to persist).
    pub point: PricePoint,
}

impl TickOutcome {
    pub fn store_not_initialized(&self) -> bool {
        self.store_error == Some(StoreErrorKind::NotInitialized)
    }
}

struct Decision {
    price: f64,
    is_simulated: bool,
    status: Regime,
}

pub struct TickProcessor<S, P, N = StdRng> {
    source: S,
    store: P,
    noise: N,
    params: TrajectoryParams,
}

impl<S, P, N> TickProcessor<S, P, N>
where
    S: PriceSource,
    P: PriceStore,
    N: NoiseSource + Send,
{
    pub fn new(source: S, store: P, noise: N, params: TrajectoryParams) -> Self {
        Self {
            source,
            store,
            noise,
            params,
        }
    }

    pub fn params(&self) -> &TrajectoryParams {
        &self.params
    }

    pub fn store(&self) -> &P {
        &self.store
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub async fn process(
        &mut self,
        symbol: &str,
        current_price: f64,
        state: &SimulationState,
    ) -> Result<TickOutcome, TickError> {
        self.process_at(symbol, current_price, state, Utc::now()).await
    }

    /// Run one tick as of `now`.
    pub async fn process_at(
        &mut self,
        symbol: &str,
        current_price: f64,
        state: &SimulationState,
        now: DateTime<Utc>,
    ) -> Result<TickOutcome, TickError> {
        if !current_price.is_finite() || current_price < 0.0 {
            return Err(TickError::InvalidInput(format!(
                "current price must be finite and >= 0, got {}",
                current_price
            )));
        }
        state.validate()?;

        let decision = match state.status {
            Regime::Active => self.active_tick(current_price, state, now)?,
            Regime::Recovering => self.recovering_tick(symbol, current_price).await?,
            Regime::Idle => self.idle_tick(symbol, current_price).await,
        };

        if decision.status != state.status {
            tracing::info!(
                symbol,
                from = %state.status,
                to = %decision.status,
                price = decision.price,
                "Regime transition"
            );
        }
        tracing::debug!(
            symbol,
            price = decision.price,
            status = %decision.status,
            simulated = decision.is_simulated,
            "Tick processed"
        );

        let point = PricePoint::new(symbol, decision.price, now, decision.is_simulated);
        let store_error = match self.store.append(&point).await {
            Ok(()) => None,
            Err(e) if e.is_not_initialized() => {
                tracing::debug!(symbol, error = %e, "Price store not provisioned");
                Some(e.kind())
            }
            Err(e) => {
                tracing::error!(symbol, error = %e, "Failed to persist price point");
                Some(e.kind())
            }
        };

        Ok(TickOutcome {
            next_price: decision.price,
            is_simulated: decision.is_simulated,
            next_status: decision.status,
            store_error,
            point,
        })
    }

    fn active_tick(
        &mut self,
        current_price: f64,
        state: &SimulationState,
        now: DateTime<Utc>,
    ) -> Result<Decision, TickError> {
        let time_left = state.time_left_secs(now);
        if time_left <= 0.0 {
            // Snap to the target; no noise on the tick that ends the excursion.
            return Ok(Decision {
                price: state.target_price,
                is_simulated: true,
                status: state.status.transition(RegimeEvent::DurationElapsed)?,
            });
        }
        let price = self.params.excursion_step(
            current_price,
            state.target_price,
            time_left,
            &mut self.noise,
        );
        Ok(Decision {
            price,
            is_simulated: true,
            status: Regime::Active,
        })
    }

    async fn recovering_tick(
        &mut self,
        symbol: &str,
        current_price: f64,
    ) -> Result<Decision, TickError> {
        let Some(real) = self.fetch_real(symbol).await else {
            // No progress this tick; try again on the next one.
            return Ok(Decision {
                price: self.held_price(current_price),
                is_simulated: true,
                status: Regime::Recovering,
            });
        };

        let stepped = self
            .params
            .recovery_step(current_price, real, &mut self.noise)
            .max(self.params.price_floor);
        if self.params.has_converged(stepped, real) {
            return Ok(Decision {
                price: real,
                is_simulated: true,
                status: Regime::Recovering.transition(RegimeEvent::Converged)?,
            });
        }
        Ok(Decision {
            price: stepped,
            is_simulated: true,
            status: Regime::Recovering,
        })
    }

    async fn idle_tick(&mut self, symbol: &str, current_price: f64) -> Decision {
        let price = match self.fetch_real(symbol).await {
            Some(real) => real,
            None => self.held_price(current_price),
        };
        Decision {
            price,
            is_simulated: false,
            status: Regime::Idle,
        }
    }

    async fn fetch_real(&self, symbol: &str) -> Option<f64> {
        self.source
            .fetch_real_price(symbol)
            .await
            .filter(|p| p.is_finite() && *p > 0.0)
    }

    /// Price to report when the real source is down: the last value, or the
    /// placeholder when nothing has been observed yet.
    fn held_price(&self, current_price: f64) -> f64 {
        if current_price > 0.0 {
            current_price
        } else {
            self.params.placeholder_price
        }
    }
}
