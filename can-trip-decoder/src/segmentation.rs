//! Trip segmentation
//!
//! Partitions the continuous speed stream into drive cycles bounded by engine
//! on/off edges:
//!
//! ```text
//!   OFF --(engine running)--> ON        samples go to the last trip
//!   ON  --(engine stopped)--> OFF       a new empty trip is opened
//! ```
//!
//! Repeated readings of the same engine state are not transitions. Speed
//! frames seen while the engine is off are dropped.

use crate::context::{DecodeContext, EngineEdge};
use crate::dispatcher::{FrameHandler, MessageClass};
use crate::types::{Frame, Result, SpeedUnit, MPH_TO_KPH};

/// Handler that builds the trip list in the decode context
#[derive(Debug, Clone)]
pub struct TripSegmenter {
    output_unit: Option<SpeedUnit>,
    mph_to_kph: f64,
    edges: usize,
}

impl TripSegmenter {
    pub fn new() -> Self {
        Self {
            output_unit: None,
            mph_to_kph: MPH_TO_KPH,
            edges: 0,
        }
    }

    /// Record every speed in `unit` using the given kph-per-mph factor
    pub fn with_unit(mut self, unit: Option<SpeedUnit>, mph_to_kph: f64) -> Self {
        self.output_unit = unit;
        self.mph_to_kph = mph_to_kph;
        self
    }

    /// Number of engine transitions seen (both directions)
    pub fn edges(&self) -> usize {
        self.edges
    }
}

impl Default for TripSegmenter {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameHandler for TripSegmenter {
    fn on_speed_event(&mut self, frame: &Frame, ctx: &mut DecodeContext) -> Result<()> {
        let speed = match self.output_unit {
            Some(unit) => ctx.speed_in(unit, self.mph_to_kph),
            None => ctx.speed,
        };
        ctx.record_speed(frame.timestamp_ms, speed);
        Ok(())
    }

    fn on_engine_event(
        &mut self,
        class: MessageClass,
        running: bool,
        frame: &Frame,
        ctx: &mut DecodeContext,
    ) -> Result<()> {
        match ctx.observe_engine(running) {
            EngineEdge::Started => {
                self.edges += 1;
                log::debug!(
                    "Engine on at {:.3} s ({})",
                    frame.timestamp_ms as f64 / 1000.0,
                    class
                );
            }
            EngineEdge::Stopped => {
                self.edges += 1;
                log::debug!(
                    "Engine off at {:.3} s ({}), opened trip {}",
                    frame.timestamp_ms as f64 / 1000.0,
                    class,
                    ctx.current_trip_index()
                );
            }
            EngineEdge::Unchanged => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Direction, SpeedSample};

    fn frame(timestamp_ms: i64) -> Frame {
        Frame {
            timestamp_ms,
            channel: 1,
            id: 0,
            is_extended: false,
            direction: Direction::Tx,
            declared_length: 0,
            payload: Vec::new(),
        }
    }

    fn speed(seg: &mut TripSegmenter, ctx: &mut DecodeContext, ts: i64, value: f64) {
        ctx.speed = value;
        seg.on_speed_event(&frame(ts), ctx).unwrap();
    }

    fn engine(seg: &mut TripSegmenter, ctx: &mut DecodeContext, ts: i64, running: bool) {
        seg.on_engine_event(MessageClass::StandardEngine, running, &frame(ts), ctx)
            .unwrap();
    }

    #[test]
    fn test_samples_follow_engine_state() {
        let mut seg = TripSegmenter::new();
        let mut ctx = DecodeContext::new(false);

        speed(&mut seg, &mut ctx, 100, 9.0);
        engine(&mut seg, &mut ctx, 150, true);
        speed(&mut seg, &mut ctx, 200, 1.0);
        speed(&mut seg, &mut ctx, 450, 2.0);

        assert_eq!(
            ctx.trips()[0].samples,
            vec![SpeedSample::new(0, 1.0), SpeedSample::new(250, 2.0)]
        );
        assert_eq!(seg.edges(), 1);
    }

    #[test]
    fn test_off_edge_splits_trips() {
        let mut seg = TripSegmenter::new();
        let mut ctx = DecodeContext::new(true);

        speed(&mut seg, &mut ctx, 1000, 10.0);
        speed(&mut seg, &mut ctx, 1200, 12.0);
        engine(&mut seg, &mut ctx, 1300, false);
        speed(&mut seg, &mut ctx, 1400, 99.0);
        engine(&mut seg, &mut ctx, 2000, true);
        speed(&mut seg, &mut ctx, 2100, 3.0);
        speed(&mut seg, &mut ctx, 2300, 4.0);

        let trips = ctx.into_trips();
        assert_eq!(trips.len(), 2);
        assert_eq!(
            trips[0].samples,
            vec![SpeedSample::new(0, 10.0), SpeedSample::new(200, 12.0)]
        );
        assert_eq!(
            trips[1].samples,
            vec![SpeedSample::new(0, 3.0), SpeedSample::new(200, 4.0)]
        );
    }

    #[test]
    fn test_repeated_states_are_not_edges() {
        let mut seg = TripSegmenter::new();
        let mut ctx = DecodeContext::new(false);

        for ts in 0..5 {
            engine(&mut seg, &mut ctx, ts, false);
        }
        for ts in 5..10 {
            engine(&mut seg, &mut ctx, ts, true);
        }
        engine(&mut seg, &mut ctx, 10, false);
        engine(&mut seg, &mut ctx, 11, false);

        assert_eq!(seg.edges(), 2);
        assert_eq!(ctx.trips().len(), 2);
    }

    #[test]
    fn test_output_unit_conversion() {
        let mut seg = TripSegmenter::new().with_unit(Some(SpeedUnit::Kph), 2.0);
        let mut ctx = DecodeContext::new(true);
        ctx.speed_unit = Some(SpeedUnit::Mph);

        speed(&mut seg, &mut ctx, 0, 10.0);
        assert_eq!(ctx.current_trip().samples[0].speed, 20.0);
    }
}
