//! Shared playback cell
//!
//! Bridges the replay producer and the sampling consumer. Speed and the
//! finished flag live behind one lock and are always read together, so a
//! reader that sees `finished` also sees the last speed written before it.

use parking_lot::Mutex;

/// Consistent view of the cell
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PlaybackSnapshot {
    /// Most recently replayed speed
    pub speed: f64,
    /// Set once the producer has replayed every sample
    pub finished: bool,
}

/// One producer writes, one consumer reads
#[derive(Debug, Default)]
pub struct SharedPlaybackCell {
    state: Mutex<PlaybackSnapshot>,
}

impl SharedPlaybackCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish the current speed
    pub fn publish(&self, speed: f64) {
        let mut state = self.state.lock();
        if !state.finished {
            state.speed = speed;
        }
    }

    /// Mark playback complete; further publishes are ignored
    pub fn finish(&self) {
        self.state.lock().finished = true;
    }

    /// Read speed and finished flag atomically
    pub fn snapshot(&self) -> PlaybackSnapshot {
        *self.state.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_publish_and_finish() {
        let cell = SharedPlaybackCell::new();
        assert_eq!(cell.snapshot(), PlaybackSnapshot::default());

        cell.publish(12.5);
        assert_eq!(cell.snapshot().speed, 12.5);
        assert!(!cell.snapshot().finished);

        cell.finish();
        assert_eq!(
            cell.snapshot(),
            PlaybackSnapshot {
                speed: 12.5,
                finished: true
            }
        );
    }

    #[test]
    fn test_finished_implies_last_write_visible() {
        for _ in 0..50 {
            let cell = Arc::new(SharedPlaybackCell::new());
            let writer = {
                let cell = Arc::clone(&cell);
                thread::spawn(move || {
                    for i in 0..=1000 {
                        cell.publish(i as f64);
                    }
                    cell.finish();
                })
            };

            loop {
                let snap = cell.snapshot();
                if snap.finished {
                    assert_eq!(snap.speed, 1000.0);
                    break;
                }
            }
            writer.join().unwrap();
        }
    }
}
