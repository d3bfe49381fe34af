//! Configuration for the Step Sensor Agent.

use crate::core::{ControllerConfig, DEFAULT_STEP_LENGTH_METERS};
use crate::permission::RUNTIME_GRANT_MIN_API_LEVEL;
use crate::sensor::{SamplingRate, DEFAULT_RATE_LADDER};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Distance covered by one step
    pub step_length_meters: f64,

    /// Sensor registration settings
    pub sensor: SensorConfig,

    /// Permission platform settings
    pub permission: PermissionConfig,

    /// Delay between simulated steps
    #[serde(with = "duration_serde")]
    pub simulation_interval: Duration,

    /// Path for storing session statistics
    pub data_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("step-sensor-agent");

        Self {
            step_length_meters: DEFAULT_STEP_LENGTH_METERS,
            sensor: SensorConfig::default(),
            permission: PermissionConfig::default(),
            simulation_interval: Duration::from_millis(500),
            data_path: data_dir,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.validate()?;
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(&config_path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("step-sensor-agent")
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }

    /// Path of the persisted session statistics.
    pub fn stats_path(&self) -> PathBuf {
        self.data_path.join("session_stats.json")
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.step_length_meters.is_finite() || self.step_length_meters <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "step_length_meters must be positive, got {}",
                self.step_length_meters
            )));
        }
        let rates = self.sensor.rate_ladder.len();
        if rates == 0 || rates > DEFAULT_RATE_LADDER.len() {
            return Err(ConfigError::Invalid(format!(
                "sensor.rate_ladder must hold 1 to {} rates, got {rates}",
                DEFAULT_RATE_LADDER.len()
            )));
        }
        Ok(())
    }

    /// Settings for the tracking controller.
    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            rate_ladder: self.sensor.rate_ladder.clone(),
            step_length_meters: self.step_length_meters,
        }
    }
}

/// Sensor registration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// Sampling rates tried in order until one registration succeeds
    pub rate_ladder: Vec<SamplingRate>,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            rate_ladder: DEFAULT_RATE_LADDER.to_vec(),
        }
    }
}

/// Permission platform settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionConfig {
    /// API level reported by the simulated platform
    pub platform_api_level: u32,
}

impl Default for PermissionConfig {
    fn default() -> Self {
        Self {
            platform_api_level: RUNTIME_GRANT_MIN_API_LEVEL,
        }
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
            ConfigError::Invalid(e) => write!(f, "Invalid configuration: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration as milliseconds.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.step_length_meters, 0.7);
        assert_eq!(config.sensor.rate_ladder, DEFAULT_RATE_LADDER.to_vec());
        assert_eq!(config.permission.platform_api_level, 29);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"step_length_meters": 0.8, "simulation_interval": 250}"#)
                .unwrap();
        assert_eq!(config.step_length_meters, 0.8);
        assert_eq!(config.simulation_interval, Duration::from_millis(250));
        assert_eq!(config.sensor.rate_ladder.len(), 4);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config {
            step_length_meters: -1.0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.step_length_meters = 0.7;
        config.sensor.rate_ladder.clear();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rate_ladder_from_json() {
        let config: Config =
            serde_json::from_str(r#"{"sensor": {"rate_ladder": ["ui", "normal"]}}"#).unwrap();
        assert_eq!(
            config.controller_config().rate_ladder,
            vec![SamplingRate::Ui, SamplingRate::Normal]
        );
    }
}
