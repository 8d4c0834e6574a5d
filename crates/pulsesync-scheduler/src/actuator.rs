//! Actuator port and label-to-parameters mapping.
//!
//! The actuator is the slow physical device (a networked smart bulb in the
//! reference deployment). The core treats each command as an opaque
//! asynchronous operation that either succeeds or fails; connection handling
//! and retries belong to the implementation.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use pulsesync_errors::{ActuatorResult, ConfigError};
use serde::{Deserialize, Serialize};

/// Label whose entry is used for any unknown label.
pub const DEFAULT_LABEL: &str = "default";

/// Pulse length used when an entry does not specify one.
pub const DEFAULT_PULSE_DURATION: Duration = Duration::from_millis(50);

/// Colour of a pulse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[u8; 3]", into = "[u8; 3]")]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl From<[u8; 3]> for Rgb {
    fn from([r, g, b]: [u8; 3]) -> Self {
        Self { r, g, b }
    }
}

impl From<Rgb> for [u8; 3] {
    fn from(rgb: Rgb) -> Self {
        [rgb.r, rgb.g, rgb.b]
    }
}

/// Parameters passed to [`Actuator::turn_on`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PulseParameters {
    pub rgb: Rgb,
    pub brightness: u8,
}

/// Configured actuation for one label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActuationSpec {
    pub rgb: Rgb,
    pub brightness: u8,
    /// Hold time in milliseconds; the table default applies when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pulse_duration_ms: Option<u64>,
}

impl ActuationSpec {
    pub const fn new(rgb: Rgb, brightness: u8, pulse_duration_ms: u64) -> Self {
        Self {
            rgb,
            brightness,
            pulse_duration_ms: Some(pulse_duration_ms),
        }
    }

    pub fn parameters(&self) -> PulseParameters {
        PulseParameters {
            rgb: self.rgb,
            brightness: self.brightness,
        }
    }

    pub fn pulse_duration(&self, fallback: Duration) -> Duration {
        self.pulse_duration_ms
            .map_or(fallback, Duration::from_millis)
    }
}

/// Actuation resolved for a single event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedActuation {
    pub parameters: PulseParameters,
    pub pulse_duration: Duration,
    /// The label was unknown and the default entry was used
    pub used_default: bool,
}

/// Label → actuation mapping with a mandatory default entry.
///
/// # Example
///
/// ```
/// use pulsesync_scheduler::ActuationTable;
///
/// let table = ActuationTable::reference();
/// assert_eq!(table.resolve("bd").parameters.brightness, 100);
/// assert!(table.resolve("tom").used_default);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActuationTable {
    entries: HashMap<String, ActuationSpec>,
    default: ActuationSpec,
    default_pulse: Duration,
}

impl Default for ActuationTable {
    fn default() -> Self {
        Self::reference()
    }
}

impl ActuationTable {
    /// Build a table, validating that a `default` entry exists.
    pub fn new(
        entries: HashMap<String, ActuationSpec>,
        default_pulse: Duration,
    ) -> Result<Self, ConfigError> {
        let default = entries
            .get(DEFAULT_LABEL)
            .copied()
            .ok_or(ConfigError::MissingDefaultLabel)?;
        if let Some((label, _)) = entries.iter().find(|(label, _)| label.trim().is_empty()) {
            return Err(ConfigError::invalid_format(
                "labels",
                format!("empty label {label:?}"),
            ));
        }
        Ok(Self {
            entries,
            default,
            default_pulse,
        })
    }

    /// Drum-kit mapping used by the reference deployment.
    pub fn reference() -> Self {
        let entries: HashMap<String, ActuationSpec> = [
            ("bd", ActuationSpec::new(Rgb::new(255, 0, 0), 100, 80)),
            ("cp", ActuationSpec::new(Rgb::new(0, 255, 0), 80, 60)),
            ("hh", ActuationSpec::new(Rgb::new(0, 0, 255), 60, 40)),
            ("sn", ActuationSpec::new(Rgb::new(255, 255, 0), 90, 70)),
            (DEFAULT_LABEL, ActuationSpec::new(Rgb::WHITE, 50, 50)),
        ]
        .into_iter()
        .map(|(label, spec)| (label.to_string(), spec))
        .collect();

        Self {
            default: ActuationSpec::new(Rgb::WHITE, 50, 50),
            entries,
            default_pulse: DEFAULT_PULSE_DURATION,
        }
    }

    /// Parameters and hold time for `label`, falling back to the default entry.
    pub fn resolve(&self, label: &str) -> ResolvedActuation {
        let (spec, used_default) = match self.entries.get(label) {
            Some(spec) => (spec, false),
            None => (&self.default, true),
        };
        ResolvedActuation {
            parameters: spec.parameters(),
            pulse_duration: spec.pulse_duration(self.default_pulse),
            used_default,
        }
    }

    pub fn get(&self, label: &str) -> Option<&ActuationSpec> {
        self.entries.get(label)
    }

    pub fn default_pulse(&self) -> Duration {
        self.default_pulse
    }

    /// Configured labels in sorted order.
    pub fn labels(&self) -> Vec<&str> {
        let mut labels: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        labels.sort_unstable();
        labels
    }

    /// Entries in sorted order, suitable for serialization.
    pub fn to_map(&self) -> BTreeMap<String, ActuationSpec> {
        self.entries
            .iter()
            .map(|(label, spec)| (label.clone(), *spec))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The physical effect device.
///
/// Implementations are driven by a single dispatcher task, one command at a
/// time. Any error is terminal for the event being actuated only.
#[async_trait]
pub trait Actuator: Send + Sync {
    /// Switch the device on with the given parameters.
    async fn turn_on(&mut self, parameters: &PulseParameters) -> ActuatorResult;

    /// Keep the effect visible for `duration`.
    async fn hold(&mut self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    /// Switch the device off.
    async fn turn_off(&mut self) -> ActuatorResult;

    /// Human-readable device name for logs.
    fn name(&self) -> &str {
        "actuator"
    }
}

#[async_trait]
impl<A: Actuator + ?Sized> Actuator for Box<A> {
    async fn turn_on(&mut self, parameters: &PulseParameters) -> ActuatorResult {
        (**self).turn_on(parameters).await
    }

    async fn hold(&mut self, duration: Duration) {
        (**self).hold(duration).await;
    }

    async fn turn_off(&mut self) -> ActuatorResult {
        (**self).turn_off().await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Run one full pulse: on, hold, off.
///
/// The device is always sent `turn_off`, even when `turn_on` failed, so every
/// exit path leaves it off. The first error is returned.
pub(crate) async fn pulse<A: Actuator + ?Sized>(
    actuator: &mut A,
    resolved: &ResolvedActuation,
) -> ActuatorResult {
    let on = actuator.turn_on(&resolved.parameters).await;
    if on.is_ok() {
        actuator.hold(resolved.pulse_duration).await;
    }
    let off = actuator.turn_off().await;
    on.and(off)
}
