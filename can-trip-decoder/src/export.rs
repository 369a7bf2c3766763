//! Speed event export
//!
//! [`CsvExporter`] is the second handler over the dispatcher: instead of
//! relative sample deltas it emits absolute wall-clock rows, one list per trip,
//! anchored at the measurement start found in the first header line.

use crate::context::{DecodeContext, EngineEdge};
use crate::dispatcher::{FrameHandler, MessageClass};
use crate::formats::asc::parse_start_timestamp;
use crate::types::{DecoderError, Frame, Result, SpeedUnit, MPH_TO_KPH};
use chrono::{Duration, NaiveDateTime};

/// Timestamp layout of an exported row (millisecond precision)
pub const ROW_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// One exported speed event
#[derive(Debug, Clone, PartialEq)]
pub struct CsvRow {
    pub timestamp: NaiveDateTime,
    pub speed: f64,
}

impl CsvRow {
    pub fn timestamp_string(&self) -> String {
        self.timestamp.format(ROW_TIMESTAMP_FORMAT).to_string()
    }

    /// Fields of the row: `YYYY-MM-DD HH:MM:SS.mmm`, speed
    pub fn to_record(&self) -> [String; 2] {
        [self.timestamp_string(), format!("{:?}", self.speed)]
    }
}

/// Handler that collects absolute-time rows per trip
#[derive(Debug, Clone)]
pub struct CsvExporter {
    start: Option<NaiveDateTime>,
    trips: Vec<Vec<CsvRow>>,
    output_unit: Option<SpeedUnit>,
    mph_to_kph: f64,
}

impl CsvExporter {
    pub fn new() -> Self {
        Self {
            start: None,
            trips: vec![Vec::new()],
            output_unit: None,
            mph_to_kph: MPH_TO_KPH,
        }
    }

    /// Export every speed in `unit` using the given kph-per-mph factor
    pub fn with_unit(mut self, unit: Option<SpeedUnit>, mph_to_kph: f64) -> Self {
        self.output_unit = unit;
        self.mph_to_kph = mph_to_kph;
        self
    }

    /// Measurement start parsed from the header, if seen yet
    pub fn start(&self) -> Option<NaiveDateTime> {
        self.start
    }

    pub fn trips(&self) -> &[Vec<CsvRow>] {
        &self.trips
    }

    pub fn into_trips(self) -> Vec<Vec<CsvRow>> {
        self.trips
    }
}

impl Default for CsvExporter {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameHandler for CsvExporter {
    fn on_header(&mut self, index: usize, text: &str) -> Result<()> {
        if index == 0 {
            let start = parse_start_timestamp(text)?;
            log::info!("Measurement started at {}", start);
            self.start = Some(start);
        }
        Ok(())
    }

    fn on_speed_event(&mut self, frame: &Frame, ctx: &mut DecodeContext) -> Result<()> {
        if !ctx.engine_on {
            return Ok(());
        }
        let start = self.start.ok_or(DecoderError::MissingStartTimestamp)?;
        let speed = match self.output_unit {
            Some(unit) => ctx.speed_in(unit, self.mph_to_kph),
            None => ctx.speed,
        };

        let timestamp = Duration::try_milliseconds(frame.timestamp_ms)
            .and_then(|offset| start.checked_add_signed(offset))
            .ok_or_else(|| {
                DecoderError::MalformedLine(format!(
                    "offset of {} ms is outside the representable time range",
                    frame.timestamp_ms
                ))
            })?;

        let row = CsvRow { timestamp, speed };
        self.trips[ctx.current_trip_index()].push(row);
        Ok(())
    }

    fn on_engine_event(
        &mut self,
        _class: MessageClass,
        running: bool,
        _frame: &Frame,
        ctx: &mut DecodeContext,
    ) -> Result<()> {
        if ctx.observe_engine(running) == EngineEdge::Stopped {
            self.trips.push(Vec::new());
        }
        Ok(())
    }
}
