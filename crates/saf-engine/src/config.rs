//! Engine configuration
//!
//! A flat set of named numeric parameters injected at construction. Every
//! field has a documented default; [`EngineConfig::validate`] rejects
//! combinations the control loop cannot work with.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use saf_core::ConfigError;

use crate::measure::{MeasureKind, MeasureRule};

/// Largest accepted number of content layers per prefix
pub const MAX_LAYER_LIMIT: usize = 64;

/// Largest accepted variance history per layer
pub const MAX_HISTORY_WINDOW: usize = 1024;

/// Forwarding engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Period between probability table updates
    /// Default: 500ms
    pub update_interval: Duration,

    /// Threshold adaptation rate (lambda)
    /// Default: 0.35
    pub lambda: f64,

    /// Lower bound of the per-layer reliability threshold
    /// Default: 0.75
    pub threshold_min: f64,

    /// Upper bound of the per-layer reliability threshold (also its start value)
    /// Default: 0.999
    pub threshold_max: f64,

    /// Number of satisfied-count samples kept for the variance estimate
    /// Default: 6
    pub history_window: usize,

    /// Number of content layers per prefix
    /// Default: 1 (layering inactive)
    pub max_layers: usize,

    /// Leading name components forming the content prefix
    /// Default: 1
    pub prefix_components: usize,

    /// Exponent applied to FIB costs when seeding probabilities (gamma)
    /// Default: 5.0
    pub cost_exponent: f64,

    /// Weight of the newest confidence sample in its moving average
    /// Default: 0.2
    pub ema_weight: f64,

    /// Probing budgets below this are not spent
    /// Default: 0.001
    pub min_probe: f64,

    /// Treat repeated requests from a known in-face as retransmissions
    /// Default: false
    pub rtx_detection: bool,

    /// Seed for the sampling RNG; `None` seeds from the OS
    pub rng_seed: Option<u64>,

    /// Measure used when no rule matches
    pub default_measure: MeasureKind,

    /// Per-prefix measure overrides
    pub measures: Vec<MeasureRule>,

    /// Egress limiter settings
    pub limiter: LimiterConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            update_interval: Duration::from_millis(500),
            lambda: 0.35,
            threshold_min: 0.75,
            threshold_max: 0.999,
            history_window: 6,
            max_layers: 1,
            prefix_components: 1,
            cost_exponent: 5.0,
            ema_weight: 0.2,
            min_probe: 0.001,
            rtx_detection: false,
            rng_seed: None,
            default_measure: MeasureKind::Ratio,
            measures: Vec::new(),
            limiter: LimiterConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Check that the configuration is usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.threshold_min > self.threshold_max {
            return Err(ConfigError::InvertedThresholds {
                min: self.threshold_min,
                max: self.threshold_max,
            });
        }
        check_unit("threshold_min", self.threshold_min)?;
        check_unit("threshold_max", self.threshold_max)?;
        check_unit("lambda", self.lambda)?;
        check_unit("ema_weight", self.ema_weight)?;
        if self.history_window == 0 || self.history_window > MAX_HISTORY_WINDOW {
            return Err(ConfigError::OutOfRange {
                name: "history_window",
                value: self.history_window as f64,
            });
        }
        if self.max_layers == 0 || self.max_layers > MAX_LAYER_LIMIT {
            return Err(ConfigError::OutOfRange {
                name: "max_layers",
                value: self.max_layers as f64,
            });
        }
        if self.update_interval.is_zero() {
            return Err(ConfigError::OutOfRange {
                name: "update_interval",
                value: 0.0,
            });
        }
        if self.cost_exponent.is_nan() || self.cost_exponent < 0.0 {
            return Err(ConfigError::OutOfRange {
                name: "cost_exponent",
                value: self.cost_exponent,
            });
        }
        if self.min_probe.is_nan() || self.min_probe < 0.0 {
            return Err(ConfigError::OutOfRange {
                name: "min_probe",
                value: self.min_probe,
            });
        }
        self.limiter.validate()
    }

    /// Apply one named parameter
    ///
    /// Accepts the classic upper-case parameter names so a flat key/value
    /// parameter set can be applied as-is. Call [`validate`](Self::validate)
    /// once all parameters are set.
    pub fn set_parameter(&mut self, name: &str, value: f64) -> Result<(), ConfigError> {
        match name {
            "LAMBDA" => self.lambda = value,
            "UPDATE_INTERVAL" | "UPDATE_INTERVALL" => {
                self.update_interval = seconds("update_interval", value)?;
            }
            "MAX_DELAY_MS" => self.set_max_delay(seconds("max_delay", value / 1000.0)?),
            "MAX_LAYERS" => self.max_layers = bounded_count("max_layers", value, MAX_LAYER_LIMIT)?,
            "RELIABILITY_THRESHOLD_MIN" => self.threshold_min = value,
            "RELIABILITY_THRESHOLD_MAX" => self.threshold_max = value,
            "HISTORY_SIZE" => {
                self.history_window = bounded_count("history_window", value, MAX_HISTORY_WINDOW)?
            }
            "PREFIX_COMPONENT" => self.prefix_components = count("prefix_components", value)?,
            "RTX_DETECTION" => self.rtx_detection = value > 0.0,
            "COST_EXPONENT" => self.cost_exponent = value,
            "NACK_RETURN_TOKEN" => self.limiter.nack_credit = value,
            _ => return Err(ConfigError::UnknownParameter(name.to_string())),
        }
        Ok(())
    }

    /// Rebound every delay measure, the default and per-prefix ones
    fn set_max_delay(&mut self, max_delay: Duration) {
        let kinds = std::iter::once(&mut self.default_measure)
            .chain(self.measures.iter_mut().map(|rule| &mut rule.kind));
        for kind in kinds {
            if let MeasureKind::Delay { max_delay: bound } = kind {
                *bound = max_delay;
            }
        }
    }

    /// Build a validated configuration from named parameters over the defaults
    pub fn from_parameters<'a, I>(params: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        let mut config = Self::default();
        for (name, value) in params {
            config.set_parameter(name, value)?;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Per-face egress limiter settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimiterConfig {
    /// Period between token refills
    /// Default: 10ms
    pub fill_interval: Duration,

    /// Bucket capacity in fill intervals worth of tokens
    /// Default: 5.0
    pub burst_ticks: f64,

    /// Smallest bucket capacity
    /// Default: 2.0
    pub min_capacity: f64,

    /// Assumed size of a response packet in bytes
    /// Default: 4196
    pub data_packet_size: u32,

    /// Assumed size of a request packet in bytes
    /// Default: 100
    pub interest_packet_size: u32,

    /// Tokens credited back when a NACK returns
    /// Default: 0.5
    pub nack_credit: f64,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            fill_interval: Duration::from_millis(10),
            burst_ticks: 5.0,
            min_capacity: 2.0,
            data_packet_size: 4196,
            interest_packet_size: 100,
            nack_credit: 0.5,
        }
    }
}

impl LimiterConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fill_interval.is_zero() {
            return Err(ConfigError::OutOfRange {
                name: "fill_interval",
                value: 0.0,
            });
        }
        if self.min_capacity.is_nan() || self.min_capacity <= 0.0 {
            return Err(ConfigError::NonPositiveCapacity(self.min_capacity));
        }
        if self.burst_ticks.is_nan() || self.burst_ticks <= 0.0 {
            return Err(ConfigError::OutOfRange {
                name: "burst_ticks",
                value: self.burst_ticks,
            });
        }
        if self.packet_bytes() == 0.0 {
            return Err(ConfigError::OutOfRange {
                name: "packet_size",
                value: 0.0,
            });
        }
        if self.nack_credit.is_nan() || self.nack_credit < 0.0 {
            return Err(ConfigError::OutOfRange {
                name: "nack_credit",
                value: self.nack_credit,
            });
        }
        Ok(())
    }

    /// Bytes exchanged per admitted request (request plus response)
    fn packet_bytes(&self) -> f64 {
        f64::from(self.data_packet_size) + f64::from(self.interest_packet_size)
    }

    /// Tokens generated per fill interval for a link of `bits_per_sec`
    pub fn generation_rate(&self, bits_per_sec: u64) -> f64 {
        let packets_per_sec = bits_per_sec as f64 / 8.0 / self.packet_bytes();
        packets_per_sec * self.fill_interval.as_secs_f64()
    }

    /// Capacity of a new prefix bucket for the given generation rate
    pub fn bucket_capacity(&self, generation_rate: f64) -> f64 {
        (generation_rate * self.burst_ticks).max(self.min_capacity)
    }
}

fn check_unit(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange { name, value })
    }
}

fn count(name: &'static str, value: f64) -> Result<usize, ConfigError> {
    bounded_count(name, value, u32::MAX as usize)
}

fn bounded_count(name: &'static str, value: f64, max: usize) -> Result<usize, ConfigError> {
    if value >= 0.0 && value.fract() == 0.0 && value <= max as f64 {
        Ok(value as usize)
    } else {
        Err(ConfigError::OutOfRange { name, value })
    }
}

/// Positive, representable duration in seconds
fn seconds(name: &'static str, value: f64) -> Result<Duration, ConfigError> {
    if value <= 0.0 {
        return Err(ConfigError::OutOfRange { name, value });
    }
    Duration::try_from_secs_f64(value).map_err(|_| ConfigError::OutOfRange { name, value })
}
