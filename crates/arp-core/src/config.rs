//! Layered pipeline configuration
//!
//! Resolution order, later layers winning:
//! 1. Built-in defaults
//! 2. TOML file (`--config`, `ARP_CONFIG`, or `<state-dir>/arp.toml`)
//! 3. Environment overrides (`MONITOR_INTERVAL`, threshold variables, `ARP_*`)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File name looked up inside the state directory
pub const CONFIG_FILE_NAME: &str = "arp.toml";

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {var}: '{value}'")]
    InvalidEnv { var: &'static str, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration for every pipeline component
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub store: StoreConfig,
    pub prediction: PredictionConfig,
    pub monitor: MonitorConfig,
    pub strategy: StrategyConfig,
    pub emergency: EmergencyConfig,
    pub workflow: WorkflowConfig,
}

/// KnowledgeStore locking parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Age after which a lease (or abandoned session) may be reclaimed
    pub lock_timeout_secs: u64,
    /// How long an acquirer waits before giving up
    pub acquire_timeout_ms: u64,
    /// Poll interval while waiting for a lease
    pub retry_interval_ms: u64,
}

impl StoreConfig {
    #[inline]
    #[must_use]
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }

    #[inline]
    #[must_use]
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    #[inline]
    #[must_use]
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            lock_timeout_secs: 300,
            acquire_timeout_ms: 10_000,
            retry_interval_ms: 25,
        }
    }
}

/// Risk scoring knobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionConfig {
    /// Line count above which a target is considered large
    pub line_threshold: usize,
    /// Weight applied to the prior failure rate of a target
    pub history_weight: f64,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            line_threshold: 500,
            history_weight: 0.2,
        }
    }
}

/// Monitor interval and breach thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub interval_secs: u64,
    pub complexity_threshold: f64,
    /// Percentage points of coverage loss
    pub coverage_drop_threshold: f64,
    /// Percent increase over baseline
    pub build_time_increase_threshold: f64,
    /// Percent
    pub error_rate_threshold: f64,
    /// Days
    pub dependency_age_threshold: f64,
}

impl MonitorConfig {
    #[inline]
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            complexity_threshold: 15.0,
            coverage_drop_threshold: 5.0,
            build_time_increase_threshold: 20.0,
            error_rate_threshold: 10.0,
            dependency_age_threshold: 90.0,
        }
    }
}

/// Strategy selection and experimentation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    /// Samples a strategy needs in a context before its score counts
    pub min_samples: u64,
    /// Execution history entries retained
    pub history_cap: usize,
    /// Default experiment sample size per bucket
    pub default_sample_size: u32,
    /// Variant must reach `base_score * promotion_margin` to win
    pub promotion_margin: f64,
    /// Fixed seed for mutation selection; random when unset
    pub evolution_seed: Option<u64>,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            min_samples: 3,
            history_cap: 1000,
            default_sample_size: 20,
            promotion_margin: 1.05,
            evolution_seed: None,
        }
    }
}

/// Escalation ladder timing and the optional inference backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmergencyConfig {
    /// Timeouts for levels 1 through 4; level 5 waits for an operator
    pub level_timeouts_secs: [u64; 4],
    /// Base URL of an Ollama-compatible server
    pub inference_url: Option<String>,
    pub inference_model: String,
    pub inference_timeout_secs: u64,
}

impl EmergencyConfig {
    /// Timeout of `level` (1-based); `None` for level 5 and out-of-range levels
    #[must_use]
    pub fn level_timeout(&self, level: u8) -> Option<Duration> {
        let idx = usize::from(level).checked_sub(1)?;
        self.level_timeouts_secs
            .get(idx)
            .map(|secs| Duration::from_secs(*secs))
    }
}

impl Default for EmergencyConfig {
    fn default() -> Self {
        Self {
            level_timeouts_secs: [120, 300, 600, 900],
            inference_url: None,
            inference_model: "llama3".to_string(),
            inference_timeout_secs: 30,
        }
    }
}

/// Coordinator behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Extra execution attempts after a failed one while an emergency is open
    pub max_retries: u32,
    /// Upper bound on a single external operation
    pub operation_timeout_secs: u64,
}

impl WorkflowConfig {
    #[inline]
    #[must_use]
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_retries: 1,
            operation_timeout_secs: 1800,
        }
    }
}

impl PipelineConfig {
    /// Defaults only
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the full layering against the process environment
    ///
    /// `explicit` wins over `ARP_CONFIG`, which wins over `<state_dir>/arp.toml`.
    /// Only an explicitly named file is required to exist.
    ///
    /// # Errors
    /// Returns error if a named file is unreadable, TOML is malformed, an
    /// environment override does not parse, or the result fails validation
    pub fn load(explicit: Option<&Path>, state_dir: &Path) -> Result<Self, ConfigError> {
        let env_path = std::env::var_os("ARP_CONFIG").map(PathBuf::from);
        let mut config = match explicit.map(Path::to_path_buf).or(env_path) {
            Some(path) => Self::from_file(&path)?,
            None => {
                let fallback = state_dir.join(CONFIG_FILE_NAME);
                if fallback.is_file() {
                    Self::from_file(&fallback)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML file on top of defaults
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply environment overrides through `lookup`
    ///
    /// # Errors
    /// Returns error naming the first variable whose value does not parse
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        override_with(&lookup, "MONITOR_INTERVAL", &mut self.monitor.interval_secs)?;
        override_with(
            &lookup,
            "COMPLEXITY_THRESHOLD",
            &mut self.monitor.complexity_threshold,
        )?;
        override_with(
            &lookup,
            "COVERAGE_DROP_THRESHOLD",
            &mut self.monitor.coverage_drop_threshold,
        )?;
        override_with(
            &lookup,
            "BUILD_TIME_INCREASE_THRESHOLD",
            &mut self.monitor.build_time_increase_threshold,
        )?;
        override_with(
            &lookup,
            "ERROR_RATE_THRESHOLD",
            &mut self.monitor.error_rate_threshold,
        )?;
        override_with(
            &lookup,
            "DEPENDENCY_AGE_THRESHOLD",
            &mut self.monitor.dependency_age_threshold,
        )?;
        override_with(&lookup, "ARP_LOCK_TIMEOUT", &mut self.store.lock_timeout_secs)?;
        override_with(
            &lookup,
            "ARP_MIN_STRATEGY_SAMPLES",
            &mut self.strategy.min_samples,
        )?;

        if let Some(raw) = lookup("ARP_EVOLUTION_SEED") {
            let seed = raw.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                var: "ARP_EVOLUTION_SEED",
                value: raw.clone(),
            })?;
            self.strategy.evolution_seed = Some(seed);
        }
        if let Some(url) = lookup("ARP_INFERENCE_URL") {
            let url = url.trim().to_string();
            self.emergency.inference_url = (!url.is_empty()).then_some(url);
        }
        Ok(())
    }

    /// Reject values no component can work with
    ///
    /// # Errors
    /// Returns `ConfigError::Invalid` describing the first bad field
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.monitor.interval_secs == 0 {
            return Err(ConfigError::Invalid("monitor.interval_secs must be > 0".into()));
        }
        let thresholds = [
            ("complexity_threshold", self.monitor.complexity_threshold),
            ("coverage_drop_threshold", self.monitor.coverage_drop_threshold),
            (
                "build_time_increase_threshold",
                self.monitor.build_time_increase_threshold,
            ),
            ("error_rate_threshold", self.monitor.error_rate_threshold),
            ("dependency_age_threshold", self.monitor.dependency_age_threshold),
        ];
        for (name, value) in thresholds {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "monitor.{name} must be a non-negative number"
                )));
            }
        }
        if self.store.lock_timeout_secs == 0 || self.store.acquire_timeout_ms == 0 {
            return Err(ConfigError::Invalid("store timeouts must be > 0".into()));
        }
        if self.strategy.min_samples == 0 {
            return Err(ConfigError::Invalid("strategy.min_samples must be >= 1".into()));
        }
        if self.strategy.default_sample_size == 0 {
            return Err(ConfigError::Invalid(
                "strategy.default_sample_size must be >= 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.prediction.history_weight) {
            return Err(ConfigError::Invalid(
                "prediction.history_weight must be within [0, 1]".into(),
            ));
        }
        Ok(())
    }
}

fn override_with<T, F>(lookup: &F, var: &'static str, slot: &mut T) -> Result<(), ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(var) {
        *slot = raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidEnv { var, value: raw.clone() })?;
    }
    Ok(())
}
