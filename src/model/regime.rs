use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SimulationError;

/// Behavioral mode of the price generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Regime {
    /// Tracking the real feed.
    #[default]
    Idle,
    /// Excursion in progress, heading to a target.
    Active,
    /// Blending a synthetic price back to the real price.
    Recovering,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegimeEvent {
    /// Operator started an excursion.
    Start,
    /// Operator stopped an excursion early.
    Stop,
    /// Excursion duration exhausted.
    DurationElapsed,
    /// Synthetic price reconverged with the real price.
    Converged,
}

impl Regime {
    pub fn as_str(&self) -> &'static str {
        match self {
            Regime::Idle => "IDLE",
            Regime::Active => "ACTIVE",
            Regime::Recovering => "RECOVERING",
        }
    }

    /// Full transition table. Anything not listed is rejected.
    pub fn transition(self, event: RegimeEvent) -> Result<Regime, SimulationError> {
        match (self, event) {
            (Regime::Idle, RegimeEvent::Start) => Ok(Regime::Active),
            (Regime::Active, RegimeEvent::Stop) => Ok(Regime::Recovering),
            (Regime::Active, RegimeEvent::DurationElapsed) => Ok(Regime::Recovering),
            (Regime::Recovering, RegimeEvent::Converged) => Ok(Regime::Idle),
            (from, event) => Err(SimulationError::InvalidTransition { from, event }),
        }
    }

    /// True whenever prices are not taken verbatim from the real feed.
    pub fn is_simulating(&self) -> bool {
        !matches!(self, Regime::Idle)
    }

    pub fn feed_label(&self) -> &'static str {
        if self.is_simulating() {
            "Simulation Mode"
        } else {
            "Live Binance Feed"
        }
    }
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
