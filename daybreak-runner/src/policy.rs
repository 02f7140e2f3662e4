//! Leverage policies and the day overlay.
//!
//! A policy is a pure function from a prediction to a leverage multiplier.
//! Zero or negative means "do not trade"; a non-finite value is a policy bug
//! and fails that policy's run.

use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, LeveragePolicyConfig};
use crate::prediction::PredictionRecord;

pub trait LeveragePolicy: Send + Sync {
    fn name(&self) -> &str;
    fn leverage(&self, prediction: &PredictionRecord) -> f64;
}

/// Which days a policy run is allowed to trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayOverlay {
    /// Trade days where the refinement model agrees (or is silent).
    Base,
    /// Trade only the risk days the base overlay skips.
    AntiDirection,
}

impl DayOverlay {
    pub fn admits(self, risk_day: bool) -> bool {
        match self {
            DayOverlay::Base => !risk_day,
            DayOverlay::AntiDirection => risk_day,
        }
    }
}

impl std::fmt::Display for DayOverlay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DayOverlay::Base => write!(f, "base"),
            DayOverlay::AntiDirection => write!(f, "anti"),
        }
    }
}

// ─── Implementations ─────────────────────────────────────────────────

/// Same leverage every day.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedLeverage {
    name: String,
    leverage: f64,
}

impl FixedLeverage {
    pub fn new(name: impl Into<String>, leverage: f64) -> Self {
        Self {
            name: name.into(),
            leverage,
        }
    }
}

impl LeveragePolicy for FixedLeverage {
    fn name(&self) -> &str {
        &self.name
    }

    fn leverage(&self, _prediction: &PredictionRecord) -> f64 {
        self.leverage
    }
}

/// One leverage for strong signals, another for weak ones.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalScaled {
    name: String,
    strong: f64,
    weak: f64,
}

impl SignalScaled {
    pub fn new(name: impl Into<String>, strong: f64, weak: f64) -> Self {
        Self {
            name: name.into(),
            strong,
            weak,
        }
    }
}

impl LeveragePolicy for SignalScaled {
    fn name(&self) -> &str {
        &self.name
    }

    fn leverage(&self, prediction: &PredictionRecord) -> f64 {
        if prediction.strong_signal {
            self.strong
        } else {
            self.weak
        }
    }
}

/// Linear in the model's confidence between `min_confidence` and 1.
///
/// Below `min_confidence` the day is not traded.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfidenceScaled {
    name: String,
    min_confidence: f64,
    min_leverage: f64,
    max_leverage: f64,
}

impl ConfidenceScaled {
    pub fn new(
        name: impl Into<String>,
        min_confidence: f64,
        min_leverage: f64,
        max_leverage: f64,
    ) -> Self {
        Self {
            name: name.into(),
            min_confidence,
            min_leverage,
            max_leverage,
        }
    }
}

impl LeveragePolicy for ConfidenceScaled {
    fn name(&self) -> &str {
        &self.name
    }

    fn leverage(&self, prediction: &PredictionRecord) -> f64 {
        let confidence = prediction.confidence();
        if confidence < self.min_confidence {
            return 0.0;
        }
        let span = 1.0 - self.min_confidence;
        let t = if span > 0.0 {
            ((confidence - self.min_confidence) / span).min(1.0)
        } else {
            1.0
        };
        self.min_leverage + t * (self.max_leverage - self.min_leverage)
    }
}

/// Build a policy from its config entry.
pub fn build_policy(config: &LeveragePolicyConfig) -> Result<Box<dyn LeveragePolicy>, ConfigError> {
    config.validate()?;
    let name = config.label();
    let policy: Box<dyn LeveragePolicy> = match *config {
        LeveragePolicyConfig::Fixed { leverage, .. } => Box::new(FixedLeverage::new(name, leverage)),
        LeveragePolicyConfig::SignalScaled { strong, weak, .. } => {
            Box::new(SignalScaled::new(name, strong, weak))
        }
        LeveragePolicyConfig::ConfidenceScaled {
            min_confidence,
            min_leverage,
            max_leverage,
            ..
        } => Box::new(ConfidenceScaled::new(
            name,
            min_confidence,
            min_leverage,
            max_leverage,
        )),
    };
    Ok(policy)
}
