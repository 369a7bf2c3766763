//! Parse sessions
//!
//! A [`LogParser`] ties the line reader, the dispatcher and a handler
//! together for one pass over a log. Line-level decode failures are reported
//! with their line number and raw text; whether they abort the pass depends on
//! the configured [`ErrorPolicy`]. Handlers may reject a frame too (an offset
//! that cannot be placed on the calendar); those rejections follow the same
//! policy. A rejected line leaves the trips accumulated so far as they were.

use crate::config::{DecoderConfig, ErrorPolicy};
use crate::context::DecodeContext;
use crate::dispatcher::{Dispatcher, FrameHandler};
use crate::export::{CsvExporter, CsvRow};
use crate::formats::asc::{open_log, AscReader};
use crate::segmentation::TripSegmenter;
use crate::signals::SignalDecoder;
use crate::types::{DecoderError, LogRecord, Result, Trip};
use std::io::BufRead;
use std::path::Path;

/// A line that failed to decode
#[derive(Debug)]
pub struct LineError {
    /// 1-based line number in the log
    pub line_number: usize,
    /// The line as read
    pub raw: String,
    pub error: DecoderError,
}

/// Counters and skipped lines of one pass
#[derive(Debug, Default)]
pub struct ParseReport {
    pub lines_read: usize,
    pub frames_decoded: usize,
    pub frames_dispatched: usize,
    pub errors: Vec<LineError>,
}

/// Output of a pass together with its report
#[derive(Debug)]
pub struct ParseOutcome<T> {
    pub output: T,
    pub report: ParseReport,
}

/// Entry point for parsing logs with one configuration and bus layout
pub struct LogParser {
    config: DecoderConfig,
    dispatcher: Dispatcher,
}

impl LogParser {
    /// Create a parser; fails if the configuration is ambiguous
    pub fn new(config: DecoderConfig, decoder: Box<dyn SignalDecoder>) -> Result<Self> {
        config.validate()?;
        let dispatcher = Dispatcher::new(config.message_ids, decoder)
            .with_channel_filter(config.channel_filter.clone());
        Ok(Self { config, dispatcher })
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Fresh decode context for a new pass
    pub fn new_context(&self) -> DecodeContext {
        DecodeContext::new(self.config.initial_engine_on)
    }

    /// Run one pass over `reader`, feeding `handler`
    pub fn run<R: BufRead>(
        &self,
        reader: R,
        ctx: &mut DecodeContext,
        handler: &mut dyn FrameHandler,
    ) -> Result<ParseReport> {
        let mut report = ParseReport::default();

        for item in AscReader::new(reader, self.config.header_lines) {
            let (line_number, raw, record) = item?;
            report.lines_read = line_number;

            match record {
                Ok(LogRecord::Header { index, text }) => handler.on_header(index, &text)?,
                Ok(LogRecord::Frame(frame)) => {
                    report.frames_decoded += 1;
                    match self.dispatcher.dispatch(&frame, ctx, handler) {
                        Ok(Some(_)) => report.frames_dispatched += 1,
                        Ok(None) => {}
                        Err(error) if error.is_line_error() => {
                            self.reject_line(&mut report, line_number, raw, error)?
                        }
                        Err(error) => return Err(error),
                    }
                }
                Err(error) => self.reject_line(&mut report, line_number, raw, error)?,
            }
        }

        log::info!(
            "Parsed {} lines: {} frames, {} dispatched, {} skipped",
            report.lines_read,
            report.frames_decoded,
            report.frames_dispatched,
            report.errors.len()
        );
        Ok(report)
    }

    /// Apply the error policy to a line that could not be used
    fn reject_line(
        &self,
        report: &mut ParseReport,
        line_number: usize,
        raw: String,
        error: DecoderError,
    ) -> Result<()> {
        match self.config.error_policy {
            ErrorPolicy::Skip => {
                log::warn!("Skipping line {}: {}", line_number, error);
                report.errors.push(LineError {
                    line_number,
                    raw,
                    error,
                });
                Ok(())
            }
            ErrorPolicy::FailFast => Err(DecoderError::LineRejected {
                line_number,
                raw,
                source: Box::new(error),
            }),
        }
    }

    /// Segment the trips of a log read from `reader`
    pub fn parse_trips_from<R: BufRead>(&self, reader: R) -> Result<ParseOutcome<Vec<Trip>>> {
        let mut ctx = self.new_context();
        let mut segmenter =
            TripSegmenter::new().with_unit(self.config.output_unit, self.config.mph_to_kph);
        let report = self.run(reader, &mut ctx, &mut segmenter)?;
        let trips = ctx.into_trips();
        log::info!(
            "Found {} trip(s), {} engine transition(s)",
            trips.len(),
            segmenter.edges()
        );
        Ok(ParseOutcome {
            output: trips,
            report,
        })
    }

    /// Segment the trips of an `.asc` file
    pub fn parse_trips(&self, path: &Path) -> Result<ParseOutcome<Vec<Trip>>> {
        let reader = open_log(path)?;
        self.parse_trips_from(reader)
    }

    /// Collect absolute-time speed rows per trip from `reader`
    pub fn export_speed_events_from<R: BufRead>(
        &self,
        reader: R,
    ) -> Result<ParseOutcome<Vec<Vec<CsvRow>>>> {
        let mut ctx = self.new_context();
        let mut exporter =
            CsvExporter::new().with_unit(self.config.output_unit, self.config.mph_to_kph);
        let report = self.run(reader, &mut ctx, &mut exporter)?;
        Ok(ParseOutcome {
            output: exporter.into_trips(),
            report,
        })
    }

    /// Collect absolute-time speed rows per trip from an `.asc` file
    pub fn export_speed_events(&self, path: &Path) -> Result<ParseOutcome<Vec<Vec<CsvRow>>>> {
        let reader = open_log(path)?;
        self.export_speed_events_from(reader)
    }
}
