//! Core types for the CAN trip decoder library
//!
//! This module defines the frames produced by the line decoder, the trip and
//! sample types produced by segmentation, and the error taxonomy shared by the
//! whole decoding pass.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Result type for decoder operations
pub type Result<T> = std::result::Result<T, DecoderError>;

/// Default linear factor between miles per hour and kilometres per hour
pub const MPH_TO_KPH: f64 = 1.609;

/// Direction of a frame as recorded by the logger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Transmitted by the logging node
    Tx,
    /// Received by the logging node
    Rx,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Tx => write!(f, "Tx"),
            Direction::Rx => write!(f, "Rx"),
        }
    }
}

/// One decoded bus record from an ASC trace line
///
/// Immutable once decoded. The timestamp is the leading float-seconds token
/// truncated (not rounded) to whole milliseconds.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Offset from measurement start in milliseconds
    pub timestamp_ms: i64,
    /// Bus channel number (e.g., 1, 2, 3...)
    pub channel: u8,
    /// Frame identifier
    pub id: u32,
    /// True if the identifier carried the extended-id suffix (`x`)
    pub is_extended: bool,
    /// Tx or Rx
    pub direction: Direction,
    /// Data length code as declared in the line
    pub declared_length: u8,
    /// Payload bytes (exactly `declared_length` of them)
    pub payload: Vec<u8>,
}

impl Frame {
    /// Number of payload bytes
    pub fn dlc(&self) -> usize {
        self.payload.len()
    }
}

/// A record read from a log: either one of the leading header lines or a frame
#[derive(Debug, Clone, PartialEq)]
pub enum LogRecord {
    /// Header line, `index` counts from 0 at the top of the file
    Header { index: usize, text: String },
    /// A decoded data line
    Frame(Frame),
}

/// Speed unit system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeedUnit {
    /// Kilometres per hour (raw bus value 0)
    Kph,
    /// Miles per hour (raw bus value 1)
    Mph,
}

impl SpeedUnit {
    /// Map the raw unit flag found on the bus
    pub fn from_raw(raw: i64) -> Option<Self> {
        match raw {
            0 => Some(SpeedUnit::Kph),
            1 => Some(SpeedUnit::Mph),
            _ => None,
        }
    }

    /// Raw unit flag written back to the bus
    pub fn raw(self) -> i64 {
        match self {
            SpeedUnit::Kph => 0,
            SpeedUnit::Mph => 1,
        }
    }

    /// Convert `value` expressed in `self` into `target` using a linear factor
    /// (`factor` = kph per mph)
    pub fn convert(self, value: f64, target: SpeedUnit, factor: f64) -> f64 {
        match (self, target) {
            (SpeedUnit::Mph, SpeedUnit::Kph) => value * factor,
            (SpeedUnit::Kph, SpeedUnit::Mph) => value / factor,
            _ => value,
        }
    }
}

impl fmt::Display for SpeedUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpeedUnit::Kph => write!(f, "kph"),
            SpeedUnit::Mph => write!(f, "mph"),
        }
    }
}

/// A single replayable speed point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedSample {
    /// Milliseconds since the previous speed event of the same trip
    pub delta_ms: u64,
    /// Decoded speed value
    pub speed: f64,
}

impl SpeedSample {
    pub fn new(delta_ms: u64, speed: f64) -> Self {
        Self { delta_ms, speed }
    }
}

/// Ordered speed samples of one drive cycle (engine on to engine off)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Trip {
    pub samples: Vec<SpeedSample>,
}

impl Trip {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Total replay duration of the trip in milliseconds
    pub fn duration_ms(&self) -> u64 {
        self.samples.iter().map(|s| s.delta_ms).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SpeedSample> {
        self.samples.iter()
    }
}

impl From<Vec<SpeedSample>> for Trip {
    fn from(samples: Vec<SpeedSample>) -> Self {
        Self { samples }
    }
}

/// Speed difference between two consecutive consumer readings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccelerationSample {
    /// Speed difference over one polling interval
    pub speed_diff: f64,
    /// Unit the difference is expressed in
    pub unit: SpeedUnit,
}

/// Errors that can occur during decoding
#[derive(Debug, thiserror::Error)]
pub enum DecoderError {
    #[error("Malformed line: {0}")]
    MalformedLine(String),

    #[error("Invalid frame id: {0:?}")]
    InvalidFrameId(String),

    #[error("Frame truncated: declared {declared} bytes but only {available} present")]
    FrameTruncated { declared: usize, available: usize },

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("Missing measurement start timestamp")]
    MissingStartTimestamp,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Log file not found: {0}")]
    FileNotFound(String),

    #[error("Unsupported file format: {0}")]
    UnsupportedFileFormat(String),

    #[error("Line {line_number} rejected: {source} ({raw:?})")]
    LineRejected {
        line_number: usize,
        raw: String,
        #[source]
        source: Box<DecoderError>,
    },

    #[error("Replay thread failed: {0}")]
    ReplayThread(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl DecoderError {
    /// True for errors scoped to a single log line (skip-or-abort is a caller choice)
    pub fn is_line_error(&self) -> bool {
        matches!(
            self,
            DecoderError::MalformedLine(_)
                | DecoderError::InvalidFrameId(_)
                | DecoderError::FrameTruncated { .. }
        )
    }
}
