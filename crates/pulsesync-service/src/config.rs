//! Daemon configuration file.
//!
//! The file is JSON or YAML, chosen by extension. Scheduler options sit at the
//! top level next to the daemon's own settings; every field is optional.
//!
//! ```yaml
//! bulb_address: 192.168.1.100
//! target_latency_ms: 250
//! max_queue_size: 100
//! pulse_duration_default_ms: 50
//! labels:
//!   bd: { rgb: [255, 0, 0], brightness: 100, pulse_duration_ms: 80 }
//!   default: { rgb: [255, 255, 255], brightness: 50 }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;

use pulsesync_errors::ConfigError;
use pulsesync_scheduler::{ActuationSpec, ActuationTable, DEFAULT_LABEL, SchedulerConfig};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Supported on-disk formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
}

impl ConfigFormat {
    /// Pick the format from the file extension.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("json") => Ok(Self::Json),
            Some("yaml" | "yml") => Ok(Self::Yaml),
            other => Err(ConfigError::invalid_format(
                "config",
                format!(
                    "unsupported extension {:?} for {}, expected .json, .yaml or .yml",
                    other.unwrap_or(""),
                    path.display()
                ),
            )),
        }
    }
}

/// How a simulated `turn_on` fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulatedFailure {
    #[default]
    Timeout,
    Unavailable,
    CommandFailed,
}

/// Simulated bulb behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Time each bulb command takes to complete.
    pub command_latency_ms: u64,

    /// Fail every Nth `turn_on` (0 never fails).
    pub fail_every: u64,

    pub failure: SimulatedFailure,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            command_latency_ms: 5,
            fail_every: 0,
            failure: SimulatedFailure::Timeout,
        }
    }
}

/// Synthetic trigger source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    pub bpm: u32,
    /// Space-separated labels, one per beat.
    pub pattern: String,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            bpm: 120,
            pattern: "bd hh sn hh".to_string(),
        }
    }
}

/// Daemon configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Network address of the bulb.
    pub bulb_address: String,

    /// Pulse length for label entries without their own.
    pub pulse_duration_default_ms: u64,

    /// Seconds between periodic stats log lines (0 disables).
    pub stats_interval_secs: u64,

    /// Label → actuation table; must contain `default`.
    pub labels: BTreeMap<String, ActuationSpec>,

    pub simulation: SimulationConfig,

    /// Feed a synthetic drum pattern when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub demo: Option<DemoConfig>,

    #[serde(flatten)]
    pub scheduler: SchedulerConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bulb_address: "192.168.1.100".to_string(),
            pulse_duration_default_ms: 50,
            stats_interval_secs: 10,
            labels: ActuationTable::reference().to_map(),
            simulation: SimulationConfig::default(),
            demo: None,
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Load and validate a configuration file.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let format = ConfigFormat::from_path(path)?;
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|err| ConfigError::Io {
                path: path.display().to_string(),
                message: err.to_string(),
            })?;

        let config = Self::parse(&content, format).map_err(|err| match err {
            ConfigError::Parse { message, .. } => ConfigError::Parse {
                path: path.display().to_string(),
                message,
            },
            other => other,
        })?;
        config.validate()?;

        debug!(path = %path.display(), ?format, "Loaded config");
        Ok(config)
    }

    /// Parse configuration text without validating it.
    pub fn parse(content: &str, format: ConfigFormat) -> Result<Self, ConfigError> {
        let parsed = match format {
            ConfigFormat::Json => serde_json::from_str(content).map_err(|err| err.to_string()),
            ConfigFormat::Yaml => serde_yaml::from_str(content).map_err(|err| err.to_string()),
        };
        parsed.map_err(|message| ConfigError::Parse {
            path: "<inline>".to_string(),
            message,
        })
    }

    /// Write the configuration, creating parent directories.
    pub async fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_error = |err: std::io::Error| ConfigError::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        };

        let content = match ConfigFormat::from_path(path)? {
            ConfigFormat::Json => {
                serde_json::to_string_pretty(self).map_err(|err| err.to_string())
            }
            ConfigFormat::Yaml => serde_yaml::to_string(self).map_err(|err| err.to_string()),
        }
        .map_err(|message| ConfigError::Parse {
            path: path.display().to_string(),
            message,
        })?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
        }
        tokio::fs::write(path, content).await.map_err(io_error)?;
        debug!(path = %path.display(), "Saved config");
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bulb_address.trim().is_empty() {
            return Err(ConfigError::required("bulb_address"));
        }
        if self.pulse_duration_default_ms == 0 {
            return Err(ConfigError::out_of_range(
                "pulse_duration_default_ms",
                self.pulse_duration_default_ms,
                1,
                u64::MAX,
            ));
        }
        if let Some(demo) = &self.demo {
            if !(1..=600).contains(&demo.bpm) {
                return Err(ConfigError::out_of_range("demo.bpm", demo.bpm, 1, 600));
            }
            if demo.pattern.split_whitespace().next().is_none() {
                return Err(ConfigError::required("demo.pattern"));
            }
        }
        self.scheduler.validate()?;
        self.actuation_table().map(|_| ())
    }

    pub fn pulse_duration_default(&self) -> Duration {
        Duration::from_millis(self.pulse_duration_default_ms)
    }

    /// Build the label table, enforcing the `default` entry.
    pub fn actuation_table(&self) -> Result<ActuationTable, ConfigError> {
        if !self.labels.contains_key(DEFAULT_LABEL) {
            return Err(ConfigError::MissingDefaultLabel);
        }
        let entries: HashMap<String, ActuationSpec> = self
            .labels
            .iter()
            .map(|(label, spec)| (label.clone(), *spec))
            .collect();
        ActuationTable::new(entries, self.pulse_duration_default())
    }
}
