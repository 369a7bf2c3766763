//! Running decode state of one parse session
//!
//! A `DecodeContext` is created when a parse starts and consumed when it ends.
//! It is owned by the parsing pass and never shared across threads.

use crate::types::{SpeedSample, SpeedUnit, Trip};

/// Engine state transition observed on an engine-class event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEdge {
    /// OFF -> ON
    Started,
    /// ON -> OFF, a new trip has been opened
    Stopped,
    /// Same state as before, nothing happened
    Unchanged,
}

/// Mutable state updated as frames are dispatched
#[derive(Debug, Clone)]
pub struct DecodeContext {
    /// Current engine state
    pub engine_on: bool,
    /// Timestamp of the previous speed event recorded in the current trip
    pub last_speed_event_ms: Option<i64>,
    trips: Vec<Trip>,
    current_trip_index: usize,

    /// Timestamp of the frame being dispatched
    pub time_ms: i64,
    /// Last decoded speed
    pub speed: f64,
    /// Unit of `speed`, if the layout carries one
    pub speed_unit: Option<SpeedUnit>,
    /// Last decoded engine speed
    pub rpm: f64,
    /// Last decoded ignition state
    pub ignition: bool,
    /// Last decoded EV ready flag
    pub ev_ready: bool,
}

impl DecodeContext {
    /// Create a context with one open (empty) trip
    pub fn new(initial_engine_on: bool) -> Self {
        Self {
            engine_on: initial_engine_on,
            last_speed_event_ms: None,
            trips: vec![Trip::new()],
            current_trip_index: 0,
            time_ms: 0,
            speed: 0.0,
            speed_unit: None,
            rpm: 0.0,
            ignition: false,
            ev_ready: false,
        }
    }

    /// Apply an engine status reading; edge-triggered
    ///
    /// ON -> OFF closes the current trip by opening a new empty one. OFF -> ON
    /// only flips the state: samples keep going into the last trip.
    pub fn observe_engine(&mut self, running: bool) -> EngineEdge {
        match (self.engine_on, running) {
            (true, false) => {
                self.trips.push(Trip::new());
                self.current_trip_index += 1;
                self.engine_on = false;
                self.last_speed_event_ms = None;
                EngineEdge::Stopped
            }
            (false, true) => {
                self.engine_on = true;
                EngineEdge::Started
            }
            _ => EngineEdge::Unchanged,
        }
    }

    /// Append a speed sample to the current trip if the engine is on
    ///
    /// The delta is measured against the previous speed event of the trip;
    /// the first sample of a trip has a delta of 0. Returns the appended
    /// sample, or `None` when the event was dropped.
    pub fn record_speed(&mut self, timestamp_ms: i64, speed: f64) -> Option<SpeedSample> {
        if !self.engine_on {
            return None;
        }

        let delta_ms = match self.last_speed_event_ms {
            Some(last) => match timestamp_ms
                .checked_sub(last)
                .and_then(|delta| u64::try_from(delta).ok())
            {
                Some(delta) => delta,
                None => {
                    log::warn!(
                        "Speed event at {} ms does not follow previous one at {} ms, clamping delta to 0",
                        timestamp_ms,
                        last
                    );
                    0
                }
            },
            None => 0,
        };

        let sample = SpeedSample::new(delta_ms, speed);
        self.trips[self.current_trip_index].samples.push(sample);
        self.last_speed_event_ms = Some(timestamp_ms);
        Some(sample)
    }

    /// Last decoded speed expressed in `target`
    ///
    /// Without a decoded unit the value is returned unchanged.
    pub fn speed_in(&self, target: SpeedUnit, mph_to_kph: f64) -> f64 {
        match self.speed_unit {
            Some(unit) => unit.convert(self.speed, target, mph_to_kph),
            None => self.speed,
        }
    }

    pub fn trips(&self) -> &[Trip] {
        &self.trips
    }

    pub fn current_trip(&self) -> &Trip {
        &self.trips[self.current_trip_index]
    }

    pub fn current_trip_index(&self) -> usize {
        self.current_trip_index
    }

    /// Finish the session and hand out the trips
    pub fn into_trips(self) -> Vec<Trip> {
        self.trips
    }
}

impl Default for DecodeContext {
    fn default() -> Self {
        Self::new(false)
    }
}
