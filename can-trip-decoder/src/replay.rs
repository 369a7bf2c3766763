//! Real-time trip replay with concurrent acceleration sampling
//!
//! Two OS threads share one [`SharedPlaybackCell`]:
//!
//! * the producer walks the trip, waits each sample's `delta_ms` and publishes
//!   its speed, then marks the cell finished;
//! * the consumer wakes at a fixed interval, reads a snapshot, and records the
//!   speed change since its previous reading in both mph and kph.
//!
//! Polling is clock-driven: a stalled producer only means the consumer records
//! zero differences. There is no cancellation; the session ends when the trip
//! is exhausted and the consumer has seen the finished flag.

use crate::config::ReplayConfig;
use crate::playback::{PlaybackSnapshot, SharedPlaybackCell};
use crate::timing::PreciseDelay;
use crate::types::{AccelerationSample, DecoderError, Result, SpeedUnit, Trip};
use std::thread;
use std::time::{Duration, Instant};

/// Sink for derived acceleration samples
pub trait AccelerationAccumulator: Send {
    fn record(&mut self, sample: AccelerationSample);
}

/// Accumulator keeping every difference, one series per unit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccelerationLog {
    pub mph: Vec<f64>,
    pub kph: Vec<f64>,
}

impl AccelerationAccumulator for AccelerationLog {
    fn record(&mut self, sample: AccelerationSample) {
        match sample.unit {
            SpeedUnit::Mph => self.mph.push(sample.speed_diff),
            SpeedUnit::Kph => self.kph.push(sample.speed_diff),
        }
    }
}

/// Replays trip samples into the playback cell
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplayProducer {
    delay: PreciseDelay,
}

impl ReplayProducer {
    pub fn new(delay: PreciseDelay) -> Self {
        Self { delay }
    }

    /// Replay `trip` in real time, then finish the cell
    ///
    /// Waits are scheduled against the session start so per-sample
    /// overshoot does not accumulate. Returns the number of samples replayed.
    pub fn run(&self, trip: &Trip, cell: &SharedPlaybackCell) -> usize {
        let start = Instant::now();
        let mut offset = Duration::ZERO;

        for sample in trip.iter() {
            offset += Duration::from_millis(sample.delta_ms);
            self.delay.sleep_until(start + offset);
            cell.publish(sample.speed);
        }

        cell.finish();
        trip.len()
    }
}

/// Polls the playback cell and derives acceleration
#[derive(Debug, Clone, Copy)]
pub struct SamplingConsumer {
    interval: Duration,
    source_unit: SpeedUnit,
    mph_to_kph: f64,
    delay: PreciseDelay,
}

impl SamplingConsumer {
    pub fn new(config: &ReplayConfig) -> Self {
        Self {
            interval: config.poll_interval(),
            source_unit: config.source_unit,
            mph_to_kph: config.mph_to_kph,
            delay: PreciseDelay::new(config.spin_margin()),
        }
    }

    /// Poll until the producer has finished
    ///
    /// Returns the number of polls and the last snapshot observed.
    pub fn run<A: AccelerationAccumulator>(
        &self,
        cell: &SharedPlaybackCell,
        accumulator: &mut A,
    ) -> (usize, PlaybackSnapshot) {
        let mut last = cell.snapshot();
        let mut previous = 0.0;
        let mut polls = 0;

        while !last.finished {
            self.delay.delay(self.interval);
            last = cell.snapshot();
            polls += 1;

            for unit in [SpeedUnit::Mph, SpeedUnit::Kph] {
                accumulator.record(AccelerationSample {
                    speed_diff: self.in_unit(last.speed, unit) - self.in_unit(previous, unit),
                    unit,
                });
            }
            previous = last.speed;
        }

        (polls, last)
    }

    fn in_unit(&self, speed: f64, unit: SpeedUnit) -> f64 {
        self.source_unit.convert(speed, unit, self.mph_to_kph)
    }
}

/// Result of a completed replay session
#[derive(Debug)]
pub struct ReplayOutcome<A> {
    /// Whatever the accumulator collected
    pub acceleration: A,
    /// Samples published by the producer
    pub samples_replayed: usize,
    /// Consumer iterations
    pub polls: usize,
    /// Snapshot the consumer stopped on
    pub final_snapshot: PlaybackSnapshot,
    /// Wall-clock duration of the session
    pub elapsed: Duration,
}

/// A named producer/consumer pair over one trip
#[derive(Debug, Clone)]
pub struct ReplaySession {
    name: String,
    config: ReplayConfig,
}

impl ReplaySession {
    pub fn new(name: impl Into<String>, config: ReplayConfig) -> Self {
        Self {
            name: name.into(),
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Replay `trip` and sample it concurrently; blocks until both threads end
    pub fn run<A: AccelerationAccumulator>(
        &self,
        trip: &Trip,
        accumulator: A,
    ) -> Result<ReplayOutcome<A>> {
        let cell = SharedPlaybackCell::new();
        let producer = ReplayProducer::new(PreciseDelay::new(self.config.spin_margin()));
        let consumer = SamplingConsumer::new(&self.config);

        log::info!(
            "[{}] Replaying {} samples ({} ms)",
            self.name,
            trip.len(),
            trip.duration_ms()
        );
        let start = Instant::now();

        let scoped = thread::scope(|s| -> Result<_> {
            let cell = &cell;

            let replay = thread::Builder::new()
                .name(format!("{}-replay", self.name))
                .spawn_scoped(s, move || producer.run(trip, cell))?;

            let sample = thread::Builder::new()
                .name(format!("{}-sample", self.name))
                .spawn_scoped(s, move || {
                    let mut accumulator = accumulator;
                    let (polls, last) = consumer.run(cell, &mut accumulator);
                    (accumulator, polls, last)
                })?;

            let replayed = replay
                .join()
                .map_err(|_| DecoderError::ReplayThread("producer panicked".to_string()))?;
            let sampled = sample
                .join()
                .map_err(|_| DecoderError::ReplayThread("consumer panicked".to_string()))?;
            Ok((replayed, sampled))
        });
        let (samples_replayed, (acceleration, polls, final_snapshot)) = scoped?;

        let elapsed = start.elapsed();
        log::info!(
            "[{}] Finished after {:.3} s, {} polls",
            self.name,
            elapsed.as_secs_f64(),
            polls
        );

        Ok(ReplayOutcome {
            acceleration,
            samples_replayed,
            polls,
            final_snapshot,
            elapsed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SpeedSample;

    fn config(poll_ms: u64) -> ReplayConfig {
        ReplayConfig::new()
            .with_poll_interval(Duration::from_millis(poll_ms))
            .with_source_unit(SpeedUnit::Mph)
    }

    #[test]
    fn test_producer_publishes_all_samples_then_finishes() {
        let cell = SharedPlaybackCell::new();
        let trip = Trip::from(vec![
            SpeedSample::new(0, 1.0),
            SpeedSample::new(5, 2.0),
            SpeedSample::new(5, 3.0),
        ]);

        let start = Instant::now();
        let replayed = ReplayProducer::default().run(&trip, &cell);
        assert!(start.elapsed() >= Duration::from_millis(10));
        assert_eq!(replayed, 3);
        assert_eq!(
            cell.snapshot(),
            PlaybackSnapshot {
                speed: 3.0,
                finished: true
            }
        );
    }

    #[test]
    fn test_consumer_stops_on_finished_cell() {
        let cell = SharedPlaybackCell::new();
        cell.publish(4.0);
        cell.finish();

        let mut log = AccelerationLog::default();
        let (polls, last) = SamplingConsumer::new(&config(10)).run(&cell, &mut log);
        assert_eq!(polls, 0);
        assert!(last.finished);
        assert!(log.mph.is_empty());
    }

    #[test]
    fn test_replay_session_derives_acceleration() {
        let trip = Trip::from(vec![SpeedSample::new(0, 10.0), SpeedSample::new(1000, 20.0)]);
        let outcome = ReplaySession::new("test", config(300))
            .run(&trip, AccelerationLog::default())
            .unwrap();

        let mph = &outcome.acceleration.mph;
        assert_eq!(outcome.samples_replayed, 2);
        assert!(outcome.final_snapshot.finished);
        assert_eq!(outcome.final_snapshot.speed, 20.0);
        // first poll at ~300 ms sees the initial 10.0
        assert_eq!(mph[0], 10.0);
        // differences telescope to the final speed
        assert!((mph.iter().sum::<f64>() - 20.0).abs() < 1e-9);
        assert!(mph.iter().filter(|d| **d == 10.0).count() >= 1);
        assert_eq!(outcome.acceleration.kph.len(), mph.len());
        let kph_total: f64 = outcome.acceleration.kph.iter().sum();
        assert!((kph_total - 20.0 * crate::types::MPH_TO_KPH).abs() < 1e-9);
        assert!(outcome.elapsed >= Duration::from_millis(1000));
    }

    #[test]
    fn test_one_second_polling_sees_ten_unit_step() {
        let trip = Trip::from(vec![SpeedSample::new(0, 10.0), SpeedSample::new(1000, 20.0)]);
        let outcome = ReplaySession::new("default-interval", ReplayConfig::default())
            .run(&trip, AccelerationLog::default())
            .unwrap();

        let mph = &outcome.acceleration.mph;
        assert!(!mph.is_empty());
        assert!((mph.iter().sum::<f64>() - 20.0).abs() < 1e-9);
        assert!(mph.iter().any(|d| *d == 10.0 || *d == 20.0));
        assert!(outcome.final_snapshot.finished);
    }

    #[test]
    fn test_empty_trip_finishes_immediately() {
        let outcome = ReplaySession::new("empty", config(10))
            .run(&Trip::new(), AccelerationLog::default())
            .unwrap();
        assert_eq!(outcome.samples_replayed, 0);
        assert!(outcome.final_snapshot.finished);
        assert!(outcome.polls <= 1);
    }
}
