//! CAN Trip Decoder Library
//!
//! Reconstructs per-trip time/speed series from textual (ASC) vehicle-bus
//! traces, and replays a trip in real time while a concurrent sampler derives
//! acceleration.
//!
//! # Architecture
//!
//! ```text
//! raw lines -> formats::asc (Frame) -> Dispatcher (DecodeContext) -> FrameHandler
//!                                                                  |-> TripSegmenter -> Vec<Trip>
//!                                                                  '-> CsvExporter   -> rows per trip
//! Trip -> ReplaySession (producer + consumer threads over SharedPlaybackCell)
//! ```
//!
//! The library does NOT:
//! - Talk to a live bus
//! - Decode arbitrary signal layouts from a DBC (see [`signals::SignalDecoder`])
//! - Implement the simulator automation client (see [`automation::AutomationClient`])
//!
//! # Example Usage
//!
//! ```no_run
//! use can_trip_decoder::{DecoderConfig, LayoutDecoder, LogParser, MessageIds, SignalLayout};
//! use std::path::Path;
//!
//! let config = DecoderConfig::new(MessageIds::new(0x1A0, 0x130, 0x3C0));
//! let decoder = LayoutDecoder::new()
//!     .with_speed(SignalLayout::new(0, 16).scaled(0.01, 0.0))
//!     .with_ignition(SignalLayout::new(8, 1));
//!
//! let parser = LogParser::new(config, Box::new(decoder)).unwrap();
//! let outcome = parser.parse_trips(Path::new("drive.asc")).unwrap();
//!
//! for (i, trip) in outcome.output.iter().enumerate() {
//!     println!("trip {}: {} samples, {} ms", i, trip.len(), trip.duration_ms());
//! }
//! ```

// Public modules
pub mod automation;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod export;
pub mod formats;
pub mod parser;
pub mod playback;
pub mod replay;
pub mod segmentation;
pub mod signals;
pub mod timing;
pub mod types;

// Re-export main types for convenience
pub use automation::{AutomationClient, AutomationError, BusReplay, BusType, SignalRef};
pub use config::{DecoderConfig, ErrorPolicy, MessageIds, ReplayConfig, RetryPolicy};
pub use context::{DecodeContext, EngineEdge};
pub use dispatcher::{Dispatcher, FrameHandler, MessageClass};
pub use export::{CsvExporter, CsvRow};
pub use parser::{LineError, LogParser, ParseOutcome, ParseReport};
pub use playback::{PlaybackSnapshot, SharedPlaybackCell};
pub use replay::{AccelerationAccumulator, AccelerationLog, ReplayOutcome, ReplaySession};
pub use segmentation::TripSegmenter;
pub use signals::{LayoutDecoder, PlaceholderDecoder, SignalDecoder, SignalLayout};
pub use timing::PreciseDelay;
pub use types::{
    AccelerationSample, DecoderError, Direction, Frame, LogRecord, Result, SpeedSample,
    SpeedUnit, Trip,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
