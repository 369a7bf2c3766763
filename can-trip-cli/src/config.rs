//! Configuration loading and parsing

use anyhow::{Context, Result};
use can_trip_decoder::{
    DecoderConfig, ErrorPolicy, LayoutDecoder, MessageIds, PlaceholderDecoder, ReplayConfig,
    SignalDecoder, SpeedUnit,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main application configuration (loaded from config.toml)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// Message-class ids; may also come from the command line
    pub messages: Option<MessageIds>,
    /// Signal layouts; without them the placeholder decoder is used
    pub signals: Option<LayoutDecoder>,
    #[serde(default)]
    pub parsing: ParsingConfig,
    #[serde(default)]
    pub replay: ReplayConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ParsingConfig {
    #[serde(default = "default_header_lines")]
    pub header_lines: usize,
    #[serde(default)]
    pub error_policy: ErrorPolicy,
    #[serde(default)]
    pub initial_engine_on: bool,
    pub output_unit: Option<SpeedUnit>,
    pub channels: Option<Vec<u8>>,
}

fn default_header_lines() -> usize {
    3
}

impl Default for ParsingConfig {
    fn default() -> Self {
        Self {
            header_lines: default_header_lines(),
            error_policy: ErrorPolicy::Skip,
            initial_engine_on: false,
            output_unit: None,
            channels: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    /// Directory for exported CSV files
    pub dir: Option<PathBuf>,
    /// File name prefix, followed by the trip index
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

fn default_prefix() -> String {
    "trip_".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: None,
            prefix: default_prefix(),
        }
    }
}

impl AppConfig {
    /// Build the decoder configuration; message ids are mandatory
    pub fn decoder_config(&self) -> Result<DecoderConfig> {
        let ids = self.messages.context(
            "message ids are not configured (set [messages] in the config file or pass --speed-id/--engine-id/--ev-id)",
        )?;

        let mut config = DecoderConfig::new(ids)
            .with_header_lines(self.parsing.header_lines)
            .with_error_policy(self.parsing.error_policy)
            .with_initial_engine_on(self.parsing.initial_engine_on);
        config.output_unit = self.parsing.output_unit;
        config.channel_filter = self.parsing.channels.clone();

        config.validate()?;
        Ok(config)
    }

    /// Replay settings matching the unit the trips are recorded in
    ///
    /// When parsing converts speeds to `output_unit`, that unit is the replay
    /// source unit; otherwise `[replay] source_unit` applies.
    pub fn replay_config(&self) -> ReplayConfig {
        match self.parsing.output_unit {
            Some(unit) => self.replay.clone().with_source_unit(unit),
            None => self.replay.clone(),
        }
    }

    /// Signal decoder for the configured layout
    pub fn signal_decoder(&self) -> Box<dyn SignalDecoder> {
        match &self.signals {
            Some(layout) => Box::new(layout.clone()),
            None => {
                log::warn!(
                    "No [signals] layout configured, speeds read as 0 and the engine as always on"
                );
                Box::new(PlaceholderDecoder)
            }
        }
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_deserialization() {
        let toml_content = r#"
            [messages]
            speed = 0x1A0
            standard_engine = 0x130
            ev_engine = 0x3C0

            [signals]
            speed = { start_bit = 0, length = 16, factor = 0.01 }
            ignition = { start_bit = 16, length = 1 }

            [parsing]
            error_policy = "fail_fast"
            output_unit = "kph"
            channels = [1]

            [replay]
            poll_interval_ms = 500

            [output]
            dir = "out"
        "#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();
        let decoder_config = config.decoder_config().unwrap();
        assert_eq!(decoder_config.message_ids.speed, 0x1A0);
        assert_eq!(decoder_config.error_policy, ErrorPolicy::FailFast);
        assert_eq!(decoder_config.output_unit, Some(SpeedUnit::Kph));
        assert_eq!(decoder_config.header_lines, 3);
        assert_eq!(config.replay.poll_interval_ms, 500);
        assert_eq!(config.replay.source_unit, SpeedUnit::Mph);
        assert_eq!(config.output.prefix, "trip_");
        assert!(config.signals.unwrap().ignition.is_some());
    }

    #[test]
    fn test_replay_follows_recorded_unit() {
        let config: AppConfig = toml::from_str("[parsing]\noutput_unit = \"kph\"\n").unwrap();
        assert_eq!(config.replay.source_unit, SpeedUnit::Mph);
        assert_eq!(config.replay_config().source_unit, SpeedUnit::Kph);

        let config: AppConfig = toml::from_str("[replay]\nsource_unit = \"kph\"\n").unwrap();
        assert_eq!(config.replay_config().source_unit, SpeedUnit::Kph);
        assert_eq!(AppConfig::default().replay_config().source_unit, SpeedUnit::Mph);
    }

    #[test]
    fn test_missing_message_ids() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert!(config.decoder_config().is_err());
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[messages]\nspeed = 1\nstandard_engine = 1\nev_engine = 2\n",
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        // duplicate ids are rejected when the decoder config is built
        assert!(config.decoder_config().is_err());
        assert!(load_config(&dir.path().join("missing.toml")).is_err());
    }
}
