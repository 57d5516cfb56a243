//! Converts the Ambient protocol's monotonic `totalrainin` counter into a
//! per-sample incremental value.

use std::collections::HashMap;
use std::sync::Mutex;

/// Tracks the last-seen `totalrainin` per station so each new sample can be
/// converted to the rain that fell since the previous sample.
#[derive(Default)]
pub struct RainTracker {
    previous: Mutex<HashMap<String, f64>>,
}

impl RainTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets to 0 on the first sample for a station, or when the new
    /// value is smaller than the remembered previous value (the counter
    /// rolled over or the device restarted).
    pub fn increment(&self, station: &str, total: f64) -> f64 {
        let mut previous = self.previous.lock().unwrap();
        let last = previous.get(station).copied();
        previous.insert(station.to_owned(), total);

        match last {
            Some(prev) if total >= prev => total - prev,
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sample_for_a_station_has_zero_increment() {
        let tracker = RainTracker::new();
        assert_eq!(tracker.increment("k1", 1.00), 0.0);
    }

    #[test]
    fn monotonic_sequence_matches_the_documented_example() {
        let tracker = RainTracker::new();
        let inputs = [1.00, 1.03, 1.05, 0.00, 0.02];
        let expected = [0.0, 0.03, 0.02, 0.0, 0.02];
        for (input, exp) in inputs.iter().zip(expected.iter()) {
            let got = tracker.increment("k1", *input);
            assert!((got - exp).abs() < 1e-9, "got {got} expected {exp}");
        }
    }

    #[test]
    fn stations_are_tracked_independently() {
        let tracker = RainTracker::new();
        tracker.increment("k1", 5.0);
        assert_eq!(tracker.increment("k2", 0.5), 0.0);
    }
}
