//! Rolling performance metrics
//!
//! Running aggregates over completed generations. Averages are online
//! means, so memory stays O(1) regardless of request count.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// Aggregate metrics over all recorded generations
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Completed generations recorded
    pub total_requests: u64,
    /// Tokens produced across all generations
    pub total_tokens_generated: u64,
    /// Running mean throughput in tokens per second
    pub avg_tokens_per_second: f64,
    /// Running mean wall-clock generation time in seconds
    pub avg_response_time: f64,
}

/// Records per-generation samples into running aggregates.
///
/// One instance is shared by every session of a service; updates are
/// serialized by the internal lock.
#[derive(Debug, Default)]
pub struct MetricsRecorder {
    inner: Mutex<MetricsSnapshot>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one completed generation into the running aggregates.
    pub fn record(&self, tokens: u64, elapsed_secs: f64) {
        let mut metrics = self.inner.lock().expect("metrics lock poisoned");
        metrics.total_requests += 1;
        metrics.total_tokens_generated += tokens;

        let n = metrics.total_requests as f64;
        let sample_tps = tokens_per_second(tokens, elapsed_secs);
        metrics.avg_tokens_per_second = (metrics.avg_tokens_per_second * (n - 1.0) + sample_tps) / n;
        metrics.avg_response_time = (metrics.avg_response_time * (n - 1.0) + elapsed_secs) / n;
    }

    /// Current aggregates.
    pub fn snapshot(&self) -> MetricsSnapshot {
        *self.inner.lock().expect("metrics lock poisoned")
    }

    /// Zero all counters and averages.
    pub fn reset(&self) {
        *self.inner.lock().expect("metrics lock poisoned") = MetricsSnapshot::default();
    }
}

/// Throughput with a zero-duration guard: a zero-elapsed sample counts as
/// 0 tokens/sec, never infinity or NaN.
pub(crate) fn tokens_per_second(tokens: u64, elapsed_secs: f64) -> f64 {
    if elapsed_secs > 0.0 {
        tokens as f64 / elapsed_secs
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_average_matches_arithmetic_mean() {
        let recorder = MetricsRecorder::new();
        let samples: &[(u64, f64)] = &[(10, 1.0), (30, 2.0), (5, 0.5), (80, 4.0), (0, 1.0)];

        for &(tokens, elapsed) in samples {
            recorder.record(tokens, elapsed);
        }

        let snapshot = recorder.snapshot();
        let n = samples.len() as f64;
        let mean_tps: f64 = samples
            .iter()
            .map(|&(t, e)| tokens_per_second(t, e))
            .sum::<f64>()
            / n;
        let mean_time: f64 = samples.iter().map(|&(_, e)| e).sum::<f64>() / n;

        assert_eq!(snapshot.total_requests, samples.len() as u64);
        assert_eq!(snapshot.total_tokens_generated, 125);
        assert!((snapshot.avg_tokens_per_second - mean_tps).abs() < 1e-9);
        assert!((snapshot.avg_response_time - mean_time).abs() < 1e-9);
    }

    #[test]
    fn test_zero_elapsed_sample_is_zero_not_nan() {
        let recorder = MetricsRecorder::new();
        recorder.record(50, 0.0);

        let snapshot = recorder.snapshot();
        assert_eq!(snapshot.avg_tokens_per_second, 0.0);
        assert!(snapshot.avg_tokens_per_second.is_finite());
        assert_eq!(snapshot.total_tokens_generated, 50);
    }

    #[test]
    fn test_reset() {
        let recorder = MetricsRecorder::new();
        recorder.record(10, 1.0);
        recorder.reset();
        assert_eq!(recorder.snapshot(), MetricsSnapshot::default());
    }
}
