//! Log file format parsers
//!
//! Only the textual ASC trace format is read. Binary captures must be exported
//! to ASC (or reduced by an external preprocessing step) first.

pub mod asc;

// Re-export parser types
pub use asc::{decode_line, open_log, parse_start_timestamp, AscReader};
