//! Serializable run configuration.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use daybreak_core::evaluation::{DelayParams, EvalError, ExitTables, StopLoss};
use daybreak_core::ledger::{BucketSpec, MarginMode};
use daybreak_core::time::TrainUntilExitDayKeyUtc;

use crate::policy::DayOverlay;

/// Content hash of a configuration.
pub type Fingerprint = String;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("config serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("total_capital must be finite and positive, got {0}")]
    InvalidCapital(f64),
    #[error("commission_rate must be finite and in [0, 1), got {0}")]
    InvalidCommission(f64),
    #[error("position_fraction must be finite and in (0, 1], got {0}")]
    InvalidPositionFraction(f64),
    #[error("at least one bucket is required")]
    NoBuckets,
    #[error("duplicate bucket '{0}'")]
    DuplicateBucket(String),
    #[error("bucket '{bucket}' allocation must be in (0, 1], got {value}")]
    InvalidAllocation { bucket: String, value: f64 },
    #[error("bucket allocations sum to {0}, more than 1")]
    AllocationOverflow(f64),
    #[error("exit tables contain a non-positive or non-finite entry")]
    InvalidTables,
    #[error("invalid delayed-entry parameters: {0}")]
    InvalidDelay(#[from] EvalError),
    #[error("policy '{name}': {reason}")]
    InvalidPolicy { name: String, reason: String },
    #[error("'{0}' must list at least one value")]
    EmptyAxis(&'static str),
}

/// Entry source feeding a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Enter at the window open.
    Daily,
    /// Wait for a discounted fill within the delay budget.
    Delayed,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Daily => "daily",
            SourceKind::Delayed => "delayed",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One capital bucket: a share of total capital fed by one entry source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BucketConfig {
    pub name: String,
    /// Share of `total_capital`, in (0, 1].
    pub allocation: f64,
    pub source: SourceKind,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DelayedConfig {
    #[serde(default = "default_delay_factor")]
    pub delay_factor: f64,
    #[serde(default = "default_max_delay_minutes")]
    pub max_delay_minutes: i64,
}

impl Default for DelayedConfig {
    fn default() -> Self {
        Self {
            delay_factor: default_delay_factor(),
            max_delay_minutes: default_max_delay_minutes(),
        }
    }
}

/// Leverage policy configuration (serializable enum).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeveragePolicyConfig {
    /// Same leverage every traded day.
    Fixed {
        #[serde(default)]
        name: Option<String>,
        leverage: f64,
    },

    /// Strong vs weak signal leverage.
    SignalScaled {
        #[serde(default)]
        name: Option<String>,
        strong: f64,
        weak: f64,
    },

    /// Linear in model confidence above a threshold.
    ConfidenceScaled {
        #[serde(default)]
        name: Option<String>,
        min_confidence: f64,
        min_leverage: f64,
        max_leverage: f64,
    },
}

impl LeveragePolicyConfig {
    /// Explicit name, or one derived from the parameters.
    pub fn label(&self) -> String {
        match self {
            LeveragePolicyConfig::Fixed { name, leverage } => name
                .clone()
                .unwrap_or_else(|| format!("fixed_{leverage}x")),
            LeveragePolicyConfig::SignalScaled { name, strong, weak } => name
                .clone()
                .unwrap_or_else(|| format!("signal_{strong}x_{weak}x")),
            LeveragePolicyConfig::ConfidenceScaled {
                name,
                min_confidence,
                min_leverage,
                max_leverage,
            } => name.clone().unwrap_or_else(|| {
                format!("confidence_{min_confidence}_{min_leverage}x_{max_leverage}x")
            }),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidPolicy {
            name: self.label(),
            reason: reason.to_string(),
        };
        let leverage_ok = |v: f64| v.is_finite() && v >= 0.0;
        match *self {
            LeveragePolicyConfig::Fixed { leverage, .. } => {
                if !leverage_ok(leverage) {
                    return Err(invalid("leverage must be finite and non-negative"));
                }
            }
            LeveragePolicyConfig::SignalScaled { strong, weak, .. } => {
                if !leverage_ok(strong) || !leverage_ok(weak) {
                    return Err(invalid("leverages must be finite and non-negative"));
                }
            }
            LeveragePolicyConfig::ConfidenceScaled {
                min_confidence,
                min_leverage,
                max_leverage,
                ..
            } => {
                if !(0.0..1.0).contains(&min_confidence) {
                    return Err(invalid("min_confidence must be in [0, 1)"));
                }
                if !leverage_ok(min_leverage) || !leverage_ok(max_leverage) {
                    return Err(invalid("leverages must be finite and non-negative"));
                }
                if min_leverage > max_leverage {
                    return Err(invalid("min_leverage exceeds max_leverage"));
                }
            }
        }
        Ok(())
    }
}

/// Complete, reproducible description of a policy sweep.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunConfig {
    #[serde(default = "default_total_capital")]
    pub total_capital: f64,

    /// Per side; a round trip pays it twice.
    #[serde(default = "default_commission_rate")]
    pub commission_rate: f64,

    /// Share of bucket equity committed per trade.
    #[serde(default = "default_position_fraction")]
    pub position_fraction: f64,

    #[serde(default = "default_buckets")]
    pub buckets: Vec<BucketConfig>,

    #[serde(default)]
    pub exit_tables: ExitTables,

    #[serde(default)]
    pub delayed: DelayedConfig,

    #[serde(default = "default_policies")]
    pub policies: Vec<LeveragePolicyConfig>,

    #[serde(default = "default_margin_modes")]
    pub margin_modes: Vec<MarginMode>,

    #[serde(default = "default_stop_loss_modes")]
    pub stop_loss_modes: Vec<StopLoss>,

    #[serde(default = "default_overlays")]
    pub overlays: Vec<DayOverlay>,

    /// When set, only out-of-sample entries are simulated.
    #[serde(default)]
    pub train_until: Option<TrainUntilExitDayKeyUtc>,

    /// Run policy combinations on the rayon pool.
    #[serde(default = "default_parallel")]
    pub parallel: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            total_capital: default_total_capital(),
            commission_rate: default_commission_rate(),
            position_fraction: default_position_fraction(),
            buckets: default_buckets(),
            exit_tables: ExitTables::default(),
            delayed: DelayedConfig::default(),
            policies: default_policies(),
            margin_modes: default_margin_modes(),
            stop_loss_modes: default_stop_loss_modes(),
            overlays: default_overlays(),
            train_until: None,
            parallel: default_parallel(),
        }
    }
}

impl RunConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: RunConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.total_capital.is_finite() || self.total_capital <= 0.0 {
            return Err(ConfigError::InvalidCapital(self.total_capital));
        }
        if !self.commission_rate.is_finite() || !(0.0..1.0).contains(&self.commission_rate) {
            return Err(ConfigError::InvalidCommission(self.commission_rate));
        }
        if !self.position_fraction.is_finite()
            || self.position_fraction <= 0.0
            || self.position_fraction > 1.0
        {
            return Err(ConfigError::InvalidPositionFraction(self.position_fraction));
        }

        if self.buckets.is_empty() {
            return Err(ConfigError::NoBuckets);
        }
        let mut names = HashSet::new();
        for bucket in &self.buckets {
            if !names.insert(bucket.name.as_str()) {
                return Err(ConfigError::DuplicateBucket(bucket.name.clone()));
            }
            if !bucket.allocation.is_finite() || bucket.allocation <= 0.0 || bucket.allocation > 1.0
            {
                return Err(ConfigError::InvalidAllocation {
                    bucket: bucket.name.clone(),
                    value: bucket.allocation,
                });
            }
        }
        let total: f64 = self.buckets.iter().map(|b| b.allocation).sum();
        if total > 1.0 + 1e-9 {
            return Err(ConfigError::AllocationOverflow(total));
        }

        if !self.exit_tables.is_valid() {
            return Err(ConfigError::InvalidTables);
        }
        self.delay_params()?;

        if self.policies.is_empty() {
            return Err(ConfigError::EmptyAxis("policies"));
        }
        for policy in &self.policies {
            policy.validate()?;
        }
        if self.margin_modes.is_empty() {
            return Err(ConfigError::EmptyAxis("margin_modes"));
        }
        if self.stop_loss_modes.is_empty() {
            return Err(ConfigError::EmptyAxis("stop_loss_modes"));
        }
        if self.overlays.is_empty() {
            return Err(ConfigError::EmptyAxis("overlays"));
        }
        Ok(())
    }

    pub fn delay_params(&self) -> Result<DelayParams, ConfigError> {
        Ok(DelayParams::new(
            self.delayed.delay_factor,
            chrono::Duration::minutes(self.delayed.max_delay_minutes),
        )?)
    }

    /// Ledger bucket specs with base capital = allocation × total capital.
    pub fn bucket_specs(&self) -> Vec<BucketSpec> {
        self.buckets
            .iter()
            .map(|b| BucketSpec::new(b.name.clone(), b.allocation * self.total_capital))
            .collect()
    }

    /// Deterministic BLAKE3 hash of the canonical JSON form.
    ///
    /// Two runs with identical configs share a fingerprint. `parallel` is left
    /// out of the hash: it changes how the run is scheduled, not its results.
    pub fn fingerprint(&self) -> Result<Fingerprint, ConfigError> {
        let mut value = serde_json::to_value(self)?;
        if let serde_json::Value::Object(fields) = &mut value {
            fields.remove("parallel");
        }
        let json = serde_json::to_string(&value)?;
        let hash = blake3::hash(json.as_bytes());
        Ok(hash.to_hex().to_string())
    }
}

fn default_total_capital() -> f64 {
    10_000.0
}

fn default_commission_rate() -> f64 {
    0.0005
}

fn default_position_fraction() -> f64 {
    1.0
}

fn default_buckets() -> Vec<BucketConfig> {
    vec![
        BucketConfig {
            name: "daily".into(),
            allocation: 0.7,
            source: SourceKind::Daily,
        },
        BucketConfig {
            name: "delayed".into(),
            allocation: 0.3,
            source: SourceKind::Delayed,
        },
    ]
}

fn default_delay_factor() -> f64 {
    0.5
}

fn default_max_delay_minutes() -> i64 {
    240
}

fn default_policies() -> Vec<LeveragePolicyConfig> {
    vec![LeveragePolicyConfig::Fixed {
        name: None,
        leverage: 1.0,
    }]
}

fn default_margin_modes() -> Vec<MarginMode> {
    vec![MarginMode::Cross, MarginMode::Isolated]
}

fn default_stop_loss_modes() -> Vec<StopLoss> {
    vec![StopLoss::Enabled, StopLoss::Disabled]
}

fn default_overlays() -> Vec<DayOverlay> {
    vec![DayOverlay::Base, DayOverlay::AntiDirection]
}

fn default_parallel() -> bool {
    true
}
