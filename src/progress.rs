//! Progress reporting for long-running searches.
//!
//! Searches push `(elapsed seconds, best score)` samples into a
//! [`ProgressSink`] at a fixed interval, with one final sample flushed when
//! the search stops. File or UI output is left to the sink implementation.

use std::time::{Duration, Instant};

/// Receiver of progress samples.
pub trait ProgressSink: Send {
    fn sample(&mut self, elapsed_secs: f64, best_score: f64);
}

/// Collects samples in memory.
impl ProgressSink for Vec<(f64, f64)> {
    fn sample(&mut self, elapsed_secs: f64, best_score: f64) {
        self.push((elapsed_secs, best_score));
    }
}

/// Interval sampler in front of an optional sink.
pub(crate) struct ProgressTracker<'a> {
    sink: Option<&'a mut dyn ProgressSink>,
    start: Instant,
    interval: Duration,
    last_sample: Option<Instant>,
    latest: Option<f64>,
}

impl<'a> ProgressTracker<'a> {
    pub fn new(sink: Option<&'a mut dyn ProgressSink>, interval: Duration) -> Self {
        Self {
            sink,
            start: Instant::now(),
            interval,
            last_sample: None,
            latest: None,
        }
    }

    /// Records the current best; emits a sample when the interval is due.
    pub fn update(&mut self, best_score: f64) {
        self.latest = Some(best_score);
        let due = match self.last_sample {
            None => true,
            Some(at) => at.elapsed() >= self.interval,
        };
        if due {
            self.emit(best_score);
        }
    }

    /// Flushes one final sample regardless of the interval.
    pub fn finish(&mut self) {
        if let Some(score) = self.latest {
            self.emit(score);
        }
    }

    fn emit(&mut self, score: f64) {
        if let Some(sink) = self.sink.as_deref_mut() {
            sink.sample(self.start.elapsed().as_secs_f64(), score);
            self.last_sample = Some(Instant::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_collects_samples() {
        let mut samples: Vec<(f64, f64)> = Vec::new();
        {
            let mut tracker =
                ProgressTracker::new(Some(&mut samples), Duration::from_secs(3600));
            tracker.update(0.5);
            tracker.update(0.6); // within interval, not emitted
            tracker.finish();
        }
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].1, 0.5);
        assert_eq!(samples[1].1, 0.6, "final flush carries the latest best");
    }

    #[test]
    fn test_no_sink_is_silent() {
        let mut tracker = ProgressTracker::new(None, Duration::from_millis(1));
        tracker.update(1.0);
        tracker.finish();
    }
}
