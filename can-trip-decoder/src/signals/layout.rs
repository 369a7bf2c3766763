//! Bit-field signal layouts
//!
//! A [`SignalLayout`] says where a signal sits in a payload and how to turn
//! the raw bits into a physical value. [`LayoutDecoder`] bundles one layout per
//! signal the dispatcher needs.

use super::{EngineReading, EvReading, SignalDecoder, SpeedReading};
use crate::context::DecodeContext;
use crate::dispatcher::MessageClass;
use crate::types::SpeedUnit;
use serde::{Deserialize, Serialize};

/// Byte order for signal extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ByteOrder {
    /// Little-endian (Intel format)
    #[default]
    LittleEndian,
    /// Big-endian (Motorola format)
    BigEndian,
}

/// Value type for signal interpretation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    /// Signed integer
    Signed,
    /// Unsigned integer
    #[default]
    Unsigned,
}

/// Position and scaling of one signal inside a payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalLayout {
    /// Start bit (LSB for Intel, MSB for Motorola)
    pub start_bit: u16,
    /// Length in bits (1..=64)
    pub length: u16,
    #[serde(default)]
    pub byte_order: ByteOrder,
    #[serde(default)]
    pub value_type: ValueType,
    /// Scale factor to convert raw value to physical value
    #[serde(default = "default_factor")]
    pub factor: f64,
    /// Offset to add after scaling
    #[serde(default)]
    pub offset: f64,
}

fn default_factor() -> f64 {
    1.0
}

impl SignalLayout {
    /// Unscaled unsigned little-endian signal
    pub fn new(start_bit: u16, length: u16) -> Self {
        Self {
            start_bit,
            length,
            byte_order: ByteOrder::LittleEndian,
            value_type: ValueType::Unsigned,
            factor: 1.0,
            offset: 0.0,
        }
    }

    pub fn big_endian(mut self) -> Self {
        self.byte_order = ByteOrder::BigEndian;
        self
    }

    pub fn signed(mut self) -> Self {
        self.value_type = ValueType::Signed;
        self
    }

    pub fn scaled(mut self, factor: f64, offset: f64) -> Self {
        self.factor = factor;
        self.offset = offset;
        self
    }

    /// Extract the raw (sign-extended) value, `None` if the payload is too short
    pub fn raw(&self, data: &[u8]) -> Option<i64> {
        let start_bit = self.start_bit as usize;
        let length = self.length as usize;
        if length == 0 || length > 64 {
            return None;
        }

        let required_bytes = (start_bit + length + 7) / 8;
        if required_bytes > data.len() {
            log::trace!(
                "Signal at bit {} ({} bits) needs {} bytes, payload has {}",
                start_bit,
                length,
                required_bytes,
                data.len()
            );
            return None;
        }

        let raw = match self.byte_order {
            ByteOrder::LittleEndian => extract_little_endian(data, start_bit, length),
            ByteOrder::BigEndian => extract_big_endian(data, start_bit, length),
        };

        Some(match self.value_type {
            ValueType::Unsigned => raw as i64,
            ValueType::Signed => sign_extend(raw, length),
        })
    }

    /// Extract the physical value (`offset + factor * raw`)
    pub fn physical(&self, data: &[u8]) -> Option<f64> {
        self.raw(data)
            .map(|raw| self.offset + self.factor * raw as f64)
    }
}

/// Intel order: start bit is the LSB, bits counted LSB to MSB within each byte
fn extract_little_endian(data: &[u8], start_bit: usize, length: usize) -> u64 {
    let mut result: u64 = 0;
    for i in 0..length {
        let bit_pos = start_bit + i;
        let bit = (data[bit_pos / 8] >> (bit_pos % 8)) & 0x01;
        result |= (bit as u64) << i;
    }
    result
}

/// Motorola order: start bit is the MSB, bit 0 is the MSB of byte 0
fn extract_big_endian(data: &[u8], start_bit: usize, length: usize) -> u64 {
    let mut result: u64 = 0;
    for i in 0..length {
        let bit_pos = start_bit + i;
        let bit = (data[bit_pos / 8] >> (7 - bit_pos % 8)) & 0x01;
        result |= (bit as u64) << (length - 1 - i);
    }
    result
}

fn sign_extend(value: u64, bit_length: usize) -> i64 {
    if bit_length >= 64 {
        return value as i64;
    }
    let sign_bit = 1u64 << (bit_length - 1);
    if value & sign_bit != 0 {
        (value | (!0u64 << bit_length)) as i64
    } else {
        value as i64
    }
}

/// Signal decoder driven by configured bit layouts
///
/// Missing layouts read as zero / false, so a layout with only `speed` set
/// never reports the engine running on its own.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LayoutDecoder {
    /// Vehicle speed in the speed message
    pub speed: Option<SignalLayout>,
    /// Unit flag in the speed message (0 = kph, 1 = mph)
    #[serde(default)]
    pub speed_unit: Option<SignalLayout>,
    /// Engine rpm in the standard engine message
    #[serde(default)]
    pub rpm: Option<SignalLayout>,
    /// Ignition flag in the standard engine message
    #[serde(default)]
    pub ignition: Option<SignalLayout>,
    /// Ready flag in the EV engine message
    #[serde(default)]
    pub ev_ready: Option<SignalLayout>,
}

impl LayoutDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_speed(mut self, layout: SignalLayout) -> Self {
        self.speed = Some(layout);
        self
    }

    pub fn with_speed_unit(mut self, layout: SignalLayout) -> Self {
        self.speed_unit = Some(layout);
        self
    }

    pub fn with_rpm(mut self, layout: SignalLayout) -> Self {
        self.rpm = Some(layout);
        self
    }

    pub fn with_ignition(mut self, layout: SignalLayout) -> Self {
        self.ignition = Some(layout);
        self
    }

    pub fn with_ev_ready(mut self, layout: SignalLayout) -> Self {
        self.ev_ready = Some(layout);
        self
    }

    fn flag(layout: &Option<SignalLayout>, payload: &[u8]) -> bool {
        layout
            .as_ref()
            .and_then(|l| l.raw(payload))
            .map_or(false, |raw| raw != 0)
    }
}

impl SignalDecoder for LayoutDecoder {
    fn decode_speed(&self, payload: &[u8]) -> SpeedReading {
        SpeedReading {
            speed: self
                .speed
                .as_ref()
                .and_then(|l| l.physical(payload))
                .unwrap_or(0.0),
            unit: self
                .speed_unit
                .as_ref()
                .and_then(|l| l.raw(payload))
                .and_then(SpeedUnit::from_raw),
        }
    }

    fn decode_engine(&self, payload: &[u8]) -> EngineReading {
        EngineReading {
            rpm: self
                .rpm
                .as_ref()
                .and_then(|l| l.physical(payload))
                .unwrap_or(0.0),
            ignition: Self::flag(&self.ignition, payload),
        }
    }

    fn decode_ev_engine(&self, payload: &[u8]) -> EvReading {
        EvReading {
            ready: Self::flag(&self.ev_ready, payload),
        }
    }

    fn engine_status(&self, class: MessageClass, ctx: &DecodeContext) -> bool {
        match class {
            // An ignition layout is authoritative; rpm only decides without one
            MessageClass::StandardEngine if self.ignition.is_some() => ctx.ignition,
            MessageClass::StandardEngine => ctx.rpm > 0.0,
            MessageClass::EvEngine => ctx.ev_ready,
            MessageClass::Speed => ctx.engine_on,
        }
    }
}
