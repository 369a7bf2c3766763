//! Frame classification and dispatch
//!
//! The dispatcher routes a frame by message class, refreshes the scratch
//! fields of the [`DecodeContext`] through the configured [`SignalDecoder`],
//! then hands the event to a [`FrameHandler`]. The routing skeleton is the
//! same whatever the handler does with the event: trip segmentation and CSV
//! export are two handlers over one dispatcher.

use crate::config::MessageIds;
use crate::context::DecodeContext;
use crate::signals::SignalDecoder;
use crate::types::{Frame, Result};
use std::fmt;

/// Recognized frame categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageClass {
    /// Vehicle speed
    Speed,
    /// Combustion engine status
    StandardEngine,
    /// EV powertrain status
    EvEngine,
}

impl MessageClass {
    pub fn is_engine(self) -> bool {
        matches!(self, MessageClass::StandardEngine | MessageClass::EvEngine)
    }
}

impl fmt::Display for MessageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageClass::Speed => write!(f, "speed"),
            MessageClass::StandardEngine => write!(f, "engine"),
            MessageClass::EvEngine => write!(f, "ev-engine"),
        }
    }
}

/// Business logic applied to classified events
pub trait FrameHandler {
    /// Called for each header line before any frame; default ignores it
    fn on_header(&mut self, _index: usize, _text: &str) -> Result<()> {
        Ok(())
    }

    /// Speed-class frame, `ctx.speed` / `ctx.speed_unit` already refreshed
    fn on_speed_event(&mut self, frame: &Frame, ctx: &mut DecodeContext) -> Result<()>;

    /// Engine-class frame; `running` is the decoded engine status
    fn on_engine_event(
        &mut self,
        class: MessageClass,
        running: bool,
        frame: &Frame,
        ctx: &mut DecodeContext,
    ) -> Result<()>;
}

/// Routes frames to a handler by message class
pub struct Dispatcher {
    ids: MessageIds,
    decoder: Box<dyn SignalDecoder>,
    channel_filter: Option<Vec<u8>>,
}

impl Dispatcher {
    pub fn new(ids: MessageIds, decoder: Box<dyn SignalDecoder>) -> Self {
        Self {
            ids,
            decoder,
            channel_filter: None,
        }
    }

    /// Builder method: only dispatch frames from these channels
    pub fn with_channel_filter(mut self, channels: Option<Vec<u8>>) -> Self {
        self.channel_filter = channels;
        self
    }

    /// Whether frames from `channel` pass the channel filter
    pub fn accepts_channel(&self, channel: u8) -> bool {
        match &self.channel_filter {
            Some(channels) => channels.contains(&channel),
            None => true,
        }
    }

    /// Map a frame id to its message class
    pub fn classify(&self, id: u32) -> Option<MessageClass> {
        if id == self.ids.speed {
            Some(MessageClass::Speed)
        } else if id == self.ids.standard_engine {
            Some(MessageClass::StandardEngine)
        } else if id == self.ids.ev_engine {
            Some(MessageClass::EvEngine)
        } else {
            None
        }
    }

    /// Dispatch one frame
    ///
    /// Returns the class the frame was routed as, or `None` when it was
    /// dropped (unrecognized id or filtered channel). Dropping is not an error.
    pub fn dispatch(
        &self,
        frame: &Frame,
        ctx: &mut DecodeContext,
        handler: &mut dyn FrameHandler,
    ) -> Result<Option<MessageClass>> {
        if !self.accepts_channel(frame.channel) {
            return Ok(None);
        }

        let Some(class) = self.classify(frame.id) else {
            log::trace!("Ignoring frame id 0x{:X}", frame.id);
            return Ok(None);
        };

        ctx.time_ms = frame.timestamp_ms;

        match class {
            MessageClass::Speed => {
                let reading = self.decoder.decode_speed(&frame.payload);
                ctx.speed = reading.speed;
                ctx.speed_unit = reading.unit;
                handler.on_speed_event(frame, ctx)?;
            }
            MessageClass::StandardEngine => {
                let reading = self.decoder.decode_engine(&frame.payload);
                ctx.rpm = reading.rpm;
                ctx.ignition = reading.ignition;
                let running = self.decoder.engine_status(class, ctx);
                handler.on_engine_event(class, running, frame, ctx)?;
            }
            MessageClass::EvEngine => {
                let reading = self.decoder.decode_ev_engine(&frame.payload);
                ctx.ev_ready = reading.ready;
                let running = self.decoder.engine_status(class, ctx);
                handler.on_engine_event(class, running, frame, ctx)?;
            }
        }

        Ok(Some(class))
    }
}
