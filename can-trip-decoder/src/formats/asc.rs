//! ASC (Vector ASCII trace) line decoder
//!
//! Data lines look like:
//!
//! ```text
//!    12.940318 1  1A0             Tx   d 6 00 00 00 00 00 00  Length = 205987 BitCount = 106 ID = 416
//! ```
//!
//! i.e. `timestamp channel id direction qualifier dlc <dlc payload bytes> ...`.
//! Everything after the payload is logger metadata and ignored.
//!
//! The first lines of a file are a header. The very first one carries the
//! measurement start time:
//!
//! ```text
//! date Thu Dec 19 01:32:07.156 pm 2019
//! ```

use crate::types::{DecoderError, Direction, Frame, LogRecord, Result};
use chrono::NaiveDateTime;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

/// Minimum token count of a data line (up to and including the dlc)
const MIN_TOKENS: usize = 6;

/// Maximum payload of a classic CAN frame
const MAX_DLC: usize = 8;

/// Offsets must stay below this many milliseconds (exclusive)
const MAX_OFFSET_MS: f64 = i64::MAX as f64;

/// Format of the `date` header line
const START_TIMESTAMP_FORMAT: &str = "date %a %b %d %I:%M:%S%.f %p %Y";

/// Decode one data line into a [`Frame`]
///
/// Pure function: no state, no side effects.
pub fn decode_line(raw: &str) -> Result<Frame> {
    let tokens: Vec<&str> = raw.split_whitespace().collect();
    if tokens.len() < MIN_TOKENS {
        return Err(DecoderError::MalformedLine(format!(
            "expected at least {} tokens, found {}",
            MIN_TOKENS,
            tokens.len()
        )));
    }

    let timestamp_ms = parse_offset_ms(tokens[0])?;

    let channel = tokens[1]
        .parse::<u8>()
        .map_err(|_| DecoderError::MalformedLine(format!("invalid channel {:?}", tokens[1])))?;

    let (id, is_extended) = parse_frame_id(tokens[2])?;

    let direction = match tokens[3] {
        "Tx" => Direction::Tx,
        "Rx" => Direction::Rx,
        other => {
            return Err(DecoderError::MalformedLine(format!(
                "invalid direction {:?}",
                other
            )))
        }
    };

    // tokens[4] is the frame qualifier ('d' for data), not interpreted

    let declared_length = tokens[5]
        .parse::<usize>()
        .map_err(|_| DecoderError::MalformedLine(format!("invalid length {:?}", tokens[5])))?;
    if declared_length > MAX_DLC {
        return Err(DecoderError::MalformedLine(format!(
            "declared length {} exceeds {}",
            declared_length, MAX_DLC
        )));
    }

    let available = tokens.len() - MIN_TOKENS;
    if declared_length > available {
        return Err(DecoderError::FrameTruncated {
            declared: declared_length,
            available,
        });
    }

    let payload = tokens[MIN_TOKENS..MIN_TOKENS + declared_length]
        .iter()
        .map(|byte| {
            u8::from_str_radix(byte, 16).map_err(|_| {
                DecoderError::MalformedLine(format!("invalid payload byte {:?}", byte))
            })
        })
        .collect::<Result<Vec<u8>>>()?;

    Ok(Frame {
        timestamp_ms,
        channel,
        id,
        is_extended,
        direction,
        declared_length: declared_length as u8,
        payload,
    })
}

/// Convert the float-seconds offset token to milliseconds
///
/// Truncates toward zero: `12.9403189` becomes `12940`, never `12941`.
/// Negative offsets and offsets that do not fit in an `i64` are malformed.
pub fn parse_offset_ms(token: &str) -> Result<i64> {
    let secs: f64 = token
        .parse()
        .map_err(|_| DecoderError::MalformedLine(format!("invalid timestamp {:?}", token)))?;
    let ms = secs * 1000.0;
    if !ms.is_finite() || ms < 0.0 || ms >= MAX_OFFSET_MS {
        return Err(DecoderError::MalformedLine(format!(
            "timestamp {:?} out of range",
            token
        )));
    }
    Ok(ms as i64)
}

/// Parse a hexadecimal frame id, accepting the `x` suffix of extended ids
fn parse_frame_id(token: &str) -> Result<(u32, bool)> {
    let (digits, is_extended) = match token.strip_suffix(['x', 'X']) {
        Some(digits) => (digits, true),
        None => (token, false),
    };
    u32::from_str_radix(digits, 16)
        .map(|id| (id, is_extended))
        .map_err(|_| DecoderError::InvalidFrameId(token.to_string()))
}

/// Parse the `date ...` header line into the measurement start time
pub fn parse_start_timestamp(line: &str) -> Result<NaiveDateTime> {
    let line = line.trim();
    NaiveDateTime::parse_from_str(line, START_TIMESTAMP_FORMAT)
        .map_err(|e| DecoderError::InvalidHeader(format!("{:?}: {}", line, e)))
}

/// Open an ASC log file, failing fast on a missing file or wrong extension
pub fn open_log(path: &Path) -> Result<BufReader<File>> {
    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase());

    if extension.as_deref() != Some("asc") {
        return Err(DecoderError::UnsupportedFileFormat(format!(
            "{:?} (expected .asc)",
            path
        )));
    }

    if !path.exists() {
        return Err(DecoderError::FileNotFound(format!("{:?}", path)));
    }

    log::info!("Opening ASC log: {:?}", path);
    let file = File::open(path)?;
    Ok(BufReader::new(file))
}

/// Line-oriented reader over an ASC trace
///
/// Yields `(line_number, record)` pairs, line numbers starting at 1. The first
/// `header_lines` lines come back as [`LogRecord::Header`]; blank data lines
/// are skipped.
pub struct AscReader<R: BufRead> {
    lines: Lines<R>,
    header_lines: usize,
    line_number: usize,
}

impl<R: BufRead> AscReader<R> {
    pub fn new(reader: R, header_lines: usize) -> Self {
        Self {
            lines: reader.lines(),
            header_lines,
            line_number: 0,
        }
    }

    /// Number of lines consumed so far
    pub fn line_number(&self) -> usize {
        self.line_number
    }
}

/// Result of reading one line: the line number, its raw text and the record
pub type ReadLine = (usize, String, Result<LogRecord>);

impl<R: BufRead> Iterator for AscReader<R> {
    type Item = std::result::Result<ReadLine, DecoderError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(DecoderError::IoError(e))),
            };
            self.line_number += 1;
            let index = self.line_number - 1;

            if index < self.header_lines {
                let record = LogRecord::Header {
                    index,
                    text: line.clone(),
                };
                return Some(Ok((self.line_number, line, Ok(record))));
            }

            if line.trim().is_empty() {
                continue;
            }

            let record = decode_line(&line).map(LogRecord::Frame);
            return Some(Ok((self.line_number, line, record)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use std::io::Cursor;

    const SPEED_LINE: &str = "   12.940318 1  1A0             Tx   d 6 00 01 02 0A FF 10  Length = 205987 BitCount = 106 ID = 416";

    #[test]
    fn test_decode_data_line() {
        let frame = decode_line(SPEED_LINE).unwrap();
        assert_eq!(frame.timestamp_ms, 12940);
        assert_eq!(frame.channel, 1);
        assert_eq!(frame.id, 0x1A0);
        assert!(!frame.is_extended);
        assert_eq!(frame.direction, Direction::Tx);
        assert_eq!(frame.declared_length, 6);
        assert_eq!(frame.payload, vec![0x00, 0x01, 0x02, 0x0A, 0xFF, 0x10]);
    }

    #[test]
    fn test_timestamp_truncated_not_rounded() {
        assert_eq!(parse_offset_ms("13.140300").unwrap(), 13140);
        assert_eq!(parse_offset_ms("0.9999").unwrap(), 999);
        assert_eq!(parse_offset_ms("1.0").unwrap(), 1000);
    }

    #[test]
    fn test_timestamp_out_of_range() {
        for token in ["-0.5", "-9.3e15", "9.3e15", "1e300", "inf", "NaN"] {
            assert!(
                matches!(parse_offset_ms(token), Err(DecoderError::MalformedLine(_))),
                "{}",
                token
            );
        }
        assert_eq!(parse_offset_ms("9000000000000.0").unwrap(), 9_000_000_000_000_000);
    }

    #[test]
    fn test_extended_id_suffix() {
        let frame = decode_line("1.000000 2 18FEF100x Rx d 2 AA BB").unwrap();
        assert_eq!(frame.id, 0x18FEF100);
        assert!(frame.is_extended);
        assert_eq!(frame.direction, Direction::Rx);
    }

    #[test]
    fn test_zero_length_frame() {
        let frame = decode_line("1.000000 1 100 Tx d 0").unwrap();
        assert!(frame.payload.is_empty());
        assert_eq!(frame.dlc(), 0);
    }

    #[test]
    fn test_malformed_line_too_few_tokens() {
        let err = decode_line("12.94 1 1A0 Tx d").unwrap_err();
        assert!(matches!(err, DecoderError::MalformedLine(_)));
        assert!(matches!(decode_line(""), Err(DecoderError::MalformedLine(_))));
    }

    #[test]
    fn test_invalid_frame_id() {
        let err = decode_line("12.94 1 XYZ Tx d 1 00").unwrap_err();
        assert!(matches!(err, DecoderError::InvalidFrameId(ref id) if id == "XYZ"));
    }

    #[test]
    fn test_frame_truncated() {
        let err = decode_line("12.94 1 1A0 Tx d 8 00 01 02").unwrap_err();
        match err {
            DecoderError::FrameTruncated { declared, available } => {
                assert_eq!(declared, 8);
                assert_eq!(available, 3);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_bad_direction_and_payload() {
        assert!(matches!(
            decode_line("12.94 1 1A0 Up d 1 00"),
            Err(DecoderError::MalformedLine(_))
        ));
        assert!(matches!(
            decode_line("12.94 1 1A0 Tx d 1 G0"),
            Err(DecoderError::MalformedLine(_))
        ));
        assert!(matches!(
            decode_line("12.94 1 1A0 Tx d 9 00 00 00 00 00 00 00 00 00"),
            Err(DecoderError::MalformedLine(_))
        ));
    }

    #[test]
    fn test_parse_start_timestamp() {
        let ts = parse_start_timestamp("date Thu Dec 19 01:32:07.156 pm 2019\n").unwrap();
        assert_eq!(ts.year(), 2019);
        assert_eq!(ts.month(), 12);
        assert_eq!(ts.day(), 19);
        assert_eq!(ts.hour(), 13);
        assert_eq!(ts.minute(), 32);
        assert_eq!(ts.second(), 7);
        assert_eq!(ts.nanosecond(), 156_000_000);
    }

    #[test]
    fn test_parse_start_timestamp_rejects_garbage() {
        let err = parse_start_timestamp("base hex  timestamps absolute").unwrap_err();
        assert!(matches!(err, DecoderError::InvalidHeader(_)));
    }

    #[test]
    fn test_open_log_fails_fast() {
        assert!(matches!(
            open_log(Path::new("trace.blf")),
            Err(DecoderError::UnsupportedFileFormat(_))
        ));
        assert!(matches!(
            open_log(Path::new("does-not-exist.asc")),
            Err(DecoderError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_reader_separates_header_and_frames() {
        let text = "date Thu Dec 19 01:32:07.156 pm 2019\nbase hex  timestamps absolute\ninternal events logged\n\n1.000000 1 1A0 Tx d 1 05\nbroken\n";
        let records: Vec<_> = AscReader::new(Cursor::new(text), 3)
            .map(|r| r.unwrap())
            .collect();

        assert_eq!(records.len(), 5);
        assert!(matches!(records[0].2, Ok(LogRecord::Header { index: 0, .. })));
        assert!(matches!(records[2].2, Ok(LogRecord::Header { index: 2, .. })));
        assert_eq!(records[3].0, 5);
        assert!(matches!(records[3].2, Ok(LogRecord::Frame(_))));
        assert_eq!(records[4].0, 6);
        assert_eq!(records[4].1, "broken");
        assert!(matches!(records[4].2, Err(DecoderError::MalformedLine(_))));
    }
}
