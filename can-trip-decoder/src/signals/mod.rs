//! Pluggable signal extraction
//!
//! The dispatcher knows which message class a frame belongs to but not where
//! the interesting signals sit inside the payload. That knowledge is supplied
//! by a [`SignalDecoder`] for the bus layout at hand.

pub mod layout;

use crate::context::DecodeContext;
use crate::dispatcher::MessageClass;
use crate::types::SpeedUnit;

pub use layout::{ByteOrder, LayoutDecoder, SignalLayout, ValueType};

/// Signals carried by the speed message
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SpeedReading {
    pub speed: f64,
    pub unit: Option<SpeedUnit>,
}

/// Signals carried by the standard engine message
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EngineReading {
    pub rpm: f64,
    pub ignition: bool,
}

/// Signals carried by the EV engine message
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EvReading {
    pub ready: bool,
}

/// Per-class payload decoding for one bus layout
pub trait SignalDecoder: Send + Sync {
    fn decode_speed(&self, payload: &[u8]) -> SpeedReading;

    fn decode_engine(&self, payload: &[u8]) -> EngineReading;

    fn decode_ev_engine(&self, payload: &[u8]) -> EvReading;

    /// Decide whether the engine is running after an engine-class event
    ///
    /// Called with the scratch fields of `ctx` already updated.
    fn engine_status(&self, class: MessageClass, ctx: &DecodeContext) -> bool {
        match class {
            MessageClass::StandardEngine => ctx.ignition || ctx.rpm > 0.0,
            MessageClass::EvEngine => ctx.ev_ready,
            MessageClass::Speed => ctx.engine_on,
        }
    }
}

/// Decoder that extracts nothing
///
/// Every signal reads as zero and the engine is always reported running, so
/// every speed frame lands in a single trip. Useful to dump raw speed-event
/// timing before the real layout is known; never a production layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderDecoder;

impl SignalDecoder for PlaceholderDecoder {
    fn decode_speed(&self, _payload: &[u8]) -> SpeedReading {
        SpeedReading::default()
    }

    fn decode_engine(&self, _payload: &[u8]) -> EngineReading {
        EngineReading::default()
    }

    fn decode_ev_engine(&self, _payload: &[u8]) -> EvReading {
        EvReading::default()
    }

    fn engine_status(&self, _class: MessageClass, _ctx: &DecodeContext) -> bool {
        true
    }
}
