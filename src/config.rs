use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::gate::auth::DEFAULT_PIN_LENGTH;
use crate::gate::schedule::validate_window;
use crate::gate::gate::MAX_EMERGENCY_OVERRIDE;
use crate::gate::{GateSettings, LockoutPolicy, TimeLockSchedule, TimeLockWindow};
use crate::session::ClassifierSettings;
use crate::session::classifier::{
    DEFAULT_FLOOR, DEFAULT_OFF_TOPIC_KEYWORDS, DEFAULT_ON_TOPIC_KEYWORDS, DEFAULT_WINDOW,
};
use crate::session::redirection::DEFAULT_CONFIDENCE_THRESHOLD;

/// Allowed PIN lengths
const PIN_LENGTH_RANGE: std::ops::RangeInclusive<usize> = 4..=12;

const MAX_LOCKOUT_SECONDS: u64 = 24 * 60 * 60;
const MAX_RETENTION_SECONDS: u64 = 7 * 24 * 60 * 60;

/// Main gate configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct GateConfig {
    /// PIN format and credential store access
    #[serde(default)]
    pub pin: PinConfig,

    /// Failed attempt lockout
    #[serde(default)]
    pub lockout: LockoutConfig,

    /// Windows during which the parent console cannot be opened
    #[serde(default)]
    pub time_locks: Vec<TimeLockWindow>,

    /// Parent session and conversation tracking
    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub redirection: RedirectionConfig,

    /// File locations; defaults live in the platform data directory
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct PinConfig {
    /// Number of digits in the PIN
    #[serde(default = "default_pin_length")]
    pub length: usize,

    /// Maximum wait for the credential store (milliseconds)
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
}

impl Default for PinConfig {
    fn default() -> Self {
        Self {
            length: default_pin_length(),
            store_timeout_ms: default_store_timeout_ms(),
        }
    }
}

fn default_pin_length() -> usize {
    DEFAULT_PIN_LENGTH
}

fn default_store_timeout_ms() -> u64 {
    2000
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LockoutConfig {
    /// Consecutive wrong PINs before entry is locked
    #[serde(default = "default_max_failures")]
    pub max_failures: u32,

    /// Lockout length (seconds)
    #[serde(default = "default_lockout_seconds")]
    pub lockout_seconds: u64,

    /// How long a wrong PIN keeps counting (seconds); at least `lockout_seconds`
    #[serde(default = "default_retention_seconds")]
    pub retention_seconds: u64,
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            max_failures: default_max_failures(),
            lockout_seconds: default_lockout_seconds(),
            retention_seconds: default_retention_seconds(),
        }
    }
}

fn default_max_failures() -> u32 {
    3
}

fn default_lockout_seconds() -> u64 {
    300
}

fn default_retention_seconds() -> u64 {
    900
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct SessionConfig {
    /// Parent console inactivity before returning to child mode (seconds)
    #[serde(default = "default_idle_timeout_seconds")]
    pub idle_timeout_seconds: u64,

    /// Default length of an emergency override (seconds)
    #[serde(default = "default_emergency_override_seconds")]
    pub emergency_override_seconds: u64,

    /// Conversation turns the classifier looks at
    #[serde(default = "default_classifier_window")]
    pub classifier_window: usize,

    #[serde(default = "default_off_topic_keywords")]
    pub off_topic_keywords: Vec<String>,

    #[serde(default = "default_on_topic_keywords")]
    pub on_topic_keywords: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_seconds: default_idle_timeout_seconds(),
            emergency_override_seconds: default_emergency_override_seconds(),
            classifier_window: default_classifier_window(),
            off_topic_keywords: default_off_topic_keywords(),
            on_topic_keywords: default_on_topic_keywords(),
        }
    }
}

fn default_idle_timeout_seconds() -> u64 {
    30 * 60
}

fn default_emergency_override_seconds() -> u64 {
    15 * 60
}

fn default_classifier_window() -> usize {
    DEFAULT_WINDOW
}

fn default_off_topic_keywords() -> Vec<String> {
    DEFAULT_OFF_TOPIC_KEYWORDS.iter().map(|k| k.to_string()).collect()
}

fn default_on_topic_keywords() -> Vec<String> {
    DEFAULT_ON_TOPIC_KEYWORDS.iter().map(|k| k.to_string()).collect()
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RedirectionConfig {
    /// Classifier confidence a suggestion must exceed
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
}

impl Default for RedirectionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
        }
    }
}

fn default_confidence_threshold() -> f64 {
    DEFAULT_CONFIDENCE_THRESHOLD
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct StorageConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_file: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_file: Option<PathBuf>,
}

impl StorageConfig {
    /// Gate state file, falling back to the platform data directory
    pub fn state_path(&self) -> Result<PathBuf> {
        match &self.state_file {
            Some(path) => Ok(path.clone()),
            None => Ok(crate::platform::get_data_dir()?.join("gate-state.json")),
        }
    }

    /// Credential file, falling back to the platform data directory
    pub fn credential_path(&self) -> Result<PathBuf> {
        match &self.credential_file {
            Some(path) => Ok(path.clone()),
            None => Ok(crate::platform::get_data_dir()?.join("credential.json")),
        }
    }
}

impl GateConfig {
    pub fn lockout_policy(&self) -> LockoutPolicy {
        LockoutPolicy {
            max_failures: self.lockout.max_failures,
            lockout_duration: Duration::from_secs(self.lockout.lockout_seconds),
            retention: Duration::from_secs(self.lockout.retention_seconds),
        }
    }

    pub fn schedule(&self) -> TimeLockSchedule {
        TimeLockSchedule::new(self.time_locks.clone())
    }

    pub fn gate_settings(&self) -> GateSettings {
        GateSettings {
            pin_length: self.pin.length,
            store_timeout: Duration::from_millis(self.pin.store_timeout_ms),
            lockout: self.lockout_policy(),
            schedule: self.schedule(),
            idle_timeout: Duration::from_secs(self.session.idle_timeout_seconds),
            emergency_duration: Duration::from_secs(self.session.emergency_override_seconds),
        }
    }

    pub fn classifier_settings(&self) -> ClassifierSettings {
        ClassifierSettings {
            window: self.session.classifier_window,
            floor: DEFAULT_FLOOR,
            off_topic_keywords: self.session.off_topic_keywords.clone(),
            on_topic_keywords: self.session.on_topic_keywords.clone(),
        }
    }
}

/// Load configuration from YAML file
pub fn load_config(path: &Path) -> Result<GateConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: GateConfig = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse YAML config file: {}", path.display()))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load configuration, or defaults when the file does not exist
pub fn load_config_or_default(path: &Path) -> Result<GateConfig> {
    if !path.exists() {
        tracing::debug!("No config at {}, using defaults", path.display());
        return Ok(GateConfig::default());
    }
    load_config(path)
}

/// Save configuration to YAML file
pub fn save_config(path: &Path, config: &GateConfig) -> Result<()> {
    validate_config(config)?;

    if let Some(parent) = path.parent() {
        crate::platform::ensure_directory_exists(parent)
            .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
    }

    let content = serde_yaml::to_string(config).context("Failed to serialize config to YAML")?;

    crate::platform::atomic_write(path, content.as_bytes())
        .with_context(|| format!("Failed to write config file: {}", path.display()))?;

    Ok(())
}

/// Validate configuration
pub fn validate_config(config: &GateConfig) -> Result<()> {
    if !PIN_LENGTH_RANGE.contains(&config.pin.length) {
        anyhow::bail!(
            "PIN length must be between {} and {}, got {}",
            PIN_LENGTH_RANGE.start(),
            PIN_LENGTH_RANGE.end(),
            config.pin.length
        );
    }

    if config.pin.store_timeout_ms == 0 {
        anyhow::bail!("Credential store timeout must be greater than zero");
    }

    if config.lockout.max_failures == 0 {
        anyhow::bail!("Lockout threshold must be at least 1");
    }

    if config.lockout.lockout_seconds > MAX_LOCKOUT_SECONDS {
        anyhow::bail!(
            "Lockout duration must be at most {}s, got {}s",
            MAX_LOCKOUT_SECONDS,
            config.lockout.lockout_seconds
        );
    }

    if config.lockout.retention_seconds > MAX_RETENTION_SECONDS {
        anyhow::bail!(
            "Attempt retention must be at most {}s, got {}s",
            MAX_RETENTION_SECONDS,
            config.lockout.retention_seconds
        );
    }

    if config.lockout.retention_seconds < config.lockout.lockout_seconds {
        anyhow::bail!(
            "Attempt retention ({}s) must be at least the lockout duration ({}s)",
            config.lockout.retention_seconds,
            config.lockout.lockout_seconds
        );
    }

    for (i, window) in config.time_locks.iter().enumerate() {
        validate_window(window).with_context(|| format!("Invalid time lock #{}", i + 1))?;
    }

    if config.session.idle_timeout_seconds == 0 {
        anyhow::bail!("Idle timeout must be greater than zero");
    }

    if config.session.emergency_override_seconds > MAX_EMERGENCY_OVERRIDE.as_secs() {
        anyhow::bail!(
            "Emergency override must be at most {}s, got {}s",
            MAX_EMERGENCY_OVERRIDE.as_secs(),
            config.session.emergency_override_seconds
        );
    }

    if config.session.classifier_window == 0 {
        anyhow::bail!("Classifier window must hold at least one turn");
    }

    let threshold = config.redirection.confidence_threshold;
    if !(0.0..=1.0).contains(&threshold) {
        anyhow::bail!(
            "Redirection confidence threshold must be between 0 and 1, got {}",
            threshold
        );
    }

    Ok(())
}

/// Example configuration file content
pub const EXAMPLE_CONFIG: &str = include_str!("../example-gate-config.yaml");
