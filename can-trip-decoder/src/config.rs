//! Decoder configuration types
//!
//! Message-class ids have no usable defaults: every bus layout assigns its own,
//! so they are required inputs. Everything else has a sensible default.

use crate::types::{DecoderError, Result, SpeedUnit, MPH_TO_KPH};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Frame ids of the three recognized message classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageIds {
    /// Vehicle speed message
    pub speed: u32,
    /// Combustion engine status message (rpm / ignition)
    pub standard_engine: u32,
    /// EV powertrain status message (ready flag)
    pub ev_engine: u32,
}

impl MessageIds {
    pub fn new(speed: u32, standard_engine: u32, ev_engine: u32) -> Self {
        Self {
            speed,
            standard_engine,
            ev_engine,
        }
    }

    /// Reject ids that would make classification ambiguous
    pub fn validate(&self) -> Result<()> {
        let ids = [
            ("speed", self.speed),
            ("standard_engine", self.standard_engine),
            ("ev_engine", self.ev_engine),
        ];
        for (i, (name_a, id_a)) in ids.iter().enumerate() {
            for (name_b, id_b) in &ids[i + 1..] {
                if id_a == id_b {
                    return Err(DecoderError::InvalidConfig(format!(
                        "message classes '{}' and '{}' share id 0x{:X}",
                        name_a, name_b, id_a
                    )));
                }
            }
        }
        Ok(())
    }
}

/// What to do with a line that fails to decode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Record the line error and keep parsing
    #[default]
    Skip,
    /// Abort the parse on the first bad line
    FailFast,
}

/// Configuration for a parse session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecoderConfig {
    /// Ids used to classify frames
    pub message_ids: MessageIds,

    /// Number of header lines at the top of the log (default: 3)
    #[serde(default = "default_header_lines")]
    pub header_lines: usize,

    /// Skip-or-abort policy for bad lines
    #[serde(default)]
    pub error_policy: ErrorPolicy,

    /// Engine state assumed before the first engine event (default: off)
    #[serde(default)]
    pub initial_engine_on: bool,

    /// Kph per mph (default: 1.609)
    #[serde(default = "default_mph_to_kph")]
    pub mph_to_kph: f64,

    /// Convert recorded speeds to this unit (None = keep the decoded unit)
    #[serde(default)]
    pub output_unit: Option<SpeedUnit>,

    /// Optional: only dispatch frames from these channels
    #[serde(default)]
    pub channel_filter: Option<Vec<u8>>,
}

fn default_header_lines() -> usize {
    3
}

fn default_mph_to_kph() -> f64 {
    MPH_TO_KPH
}

impl DecoderConfig {
    /// Create a configuration with default settings for the given ids
    pub fn new(message_ids: MessageIds) -> Self {
        Self {
            message_ids,
            header_lines: default_header_lines(),
            error_policy: ErrorPolicy::default(),
            initial_engine_on: false,
            mph_to_kph: default_mph_to_kph(),
            output_unit: None,
            channel_filter: None,
        }
    }

    /// Builder method: set the number of header lines
    pub fn with_header_lines(mut self, lines: usize) -> Self {
        self.header_lines = lines;
        self
    }

    /// Builder method: set the error policy
    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }

    /// Builder method: set the engine state assumed at parse start
    pub fn with_initial_engine_on(mut self, on: bool) -> Self {
        self.initial_engine_on = on;
        self
    }

    /// Builder method: convert recorded speeds to a fixed unit
    pub fn with_output_unit(mut self, unit: SpeedUnit) -> Self {
        self.output_unit = Some(unit);
        self
    }

    /// Builder method: set channel filter
    pub fn with_channel_filter(mut self, channels: Vec<u8>) -> Self {
        self.channel_filter = Some(channels);
        self
    }

    /// Validate the configuration before any parsing starts
    pub fn validate(&self) -> Result<()> {
        self.message_ids.validate()?;
        if !(self.mph_to_kph.is_finite() && self.mph_to_kph > 0.0) {
            return Err(DecoderError::InvalidConfig(format!(
                "mph_to_kph must be a positive number, got {}",
                self.mph_to_kph
            )));
        }
        Ok(())
    }
}

/// Timing parameters of a replay session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayConfig {
    /// Consumer polling interval in milliseconds (default: 1000)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Tail of each wait that is busy-spun instead of slept, in microseconds
    #[serde(default = "default_spin_margin_us")]
    pub spin_margin_us: u64,

    /// Unit of the replayed speeds (default: mph)
    #[serde(default = "default_source_unit")]
    pub source_unit: SpeedUnit,

    /// Kph per mph used for the derived acceleration (default: 1.609)
    #[serde(default = "default_mph_to_kph")]
    pub mph_to_kph: f64,
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_spin_margin_us() -> u64 {
    2000
}

fn default_source_unit() -> SpeedUnit {
    SpeedUnit::Mph
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            spin_margin_us: default_spin_margin_us(),
            source_unit: default_source_unit(),
            mph_to_kph: default_mph_to_kph(),
        }
    }
}

impl ReplayConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the consumer polling interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Builder method: set the unit of the replayed speeds
    pub fn with_source_unit(mut self, unit: SpeedUnit) -> Self {
        self.source_unit = unit;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn spin_margin(&self) -> Duration {
        Duration::from_micros(self.spin_margin_us)
    }
}

/// Bounded retry for measurement start acknowledgement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Number of start requests before giving up (default: 5)
    #[serde(default = "default_attempts")]
    pub attempts: u32,

    /// Pause after each request in milliseconds (default: 1000)
    #[serde(default = "default_spacing_ms")]
    pub spacing_ms: u64,
}

fn default_attempts() -> u32 {
    5
}

fn default_spacing_ms() -> u64 {
    1000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            spacing_ms: default_spacing_ms(),
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, spacing: Duration) -> Self {
        Self {
            attempts,
            spacing_ms: spacing.as_millis() as u64,
        }
    }

    pub fn spacing(&self) -> Duration {
        Duration::from_millis(self.spacing_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoder_config_builder() {
        let config = DecoderConfig::new(MessageIds::new(0x1A0, 0x130, 0x3C0))
            .with_header_lines(2)
            .with_error_policy(ErrorPolicy::FailFast)
            .with_initial_engine_on(true)
            .with_output_unit(SpeedUnit::Kph)
            .with_channel_filter(vec![1]);

        assert_eq!(config.header_lines, 2);
        assert_eq!(config.error_policy, ErrorPolicy::FailFast);
        assert!(config.initial_engine_on);
        assert_eq!(config.output_unit, Some(SpeedUnit::Kph));
        assert_eq!(config.channel_filter, Some(vec![1]));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let config = DecoderConfig::new(MessageIds::new(0x000, 0x000, 0x000));
        let err = config.validate().unwrap_err();
        assert!(matches!(err, DecoderError::InvalidConfig(_)));

        let partial = MessageIds::new(0x100, 0x200, 0x100);
        assert!(partial.validate().is_err());
    }

    #[test]
    fn test_invalid_conversion_factor_rejected() {
        let mut config = DecoderConfig::new(MessageIds::new(1, 2, 3));
        config.mph_to_kph = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_deserialization_defaults() {
        let json = r#"{ "message_ids": { "speed": 416, "standard_engine": 304, "ev_engine": 960 } }"#;
        let config: DecoderConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.header_lines, 3);
        assert_eq!(config.error_policy, ErrorPolicy::Skip);
        assert!(!config.initial_engine_on);
        assert_eq!(config.mph_to_kph, MPH_TO_KPH);
        assert!(config.channel_filter.is_none());
    }

    #[test]
    fn test_replay_and_retry_defaults() {
        let replay = ReplayConfig::default();
        assert_eq!(replay.poll_interval(), Duration::from_millis(1000));
        assert_eq!(replay.source_unit, SpeedUnit::Mph);

        let retry = RetryPolicy::default();
        assert_eq!(retry.attempts, 5);
        assert_eq!(retry.spacing(), Duration::from_secs(1));
    }
}
