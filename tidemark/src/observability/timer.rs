use chrono::{DateTime, Utc};
use std::time::Instant;

/// Wall-clock timing for a node or run.
///
/// Records the UTC start time for reports alongside a monotonic clock for
/// the duration.
#[derive(Debug)]
pub struct SpanTimer {
    name: String,
    started_at: DateTime<Utc>,
    start: Instant,
}

impl SpanTimer {
    /// Starts a new timer.
    #[must_use]
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            started_at: Utc::now(),
            start: Instant::now(),
        }
    }

    /// Returns the span name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns when the timer started.
    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Returns the elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Finishes the span, returning the end time and duration.
    #[must_use]
    pub fn finish(self) -> (DateTime<Utc>, f64) {
        (Utc::now(), self.elapsed_ms())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_is_monotonic() {
        let timer = SpanTimer::start("orders_raw");
        assert_eq!(timer.name(), "orders_raw");
        let started = timer.started_at();
        let (ended, duration) = timer.finish();
        assert!(ended >= started);
        assert!(duration >= 0.0);
    }
}
