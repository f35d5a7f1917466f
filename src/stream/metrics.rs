//! Per-stream metrics
//!
//! # Metrics
//!
//! - `parley_streams_total`: Counter of streams started, by provider
//! - `parley_streams_active`: Gauge of streams in flight
//! - `parley_stream_chunks`: Histogram of deltas per completed stream
//! - `parley_stream_duration_seconds`: Histogram of stream duration by outcome
//! - `parley_stream_errors_total`: Counter of failed streams by provider and kind
//!
//! No recorder is installed here; without one these calls are no-ops.

use metrics::{decrement_gauge, histogram, increment_counter, increment_gauge};
use std::time::{Duration, Instant};

/// Metrics for one streaming request
#[derive(Debug)]
pub struct StreamMetrics {
    provider: String,
    start: Instant,
    recorded: bool,
}

impl StreamMetrics {
    /// Starts tracking a stream
    ///
    /// # Examples
    ///
    /// ```
    /// use parley::stream::metrics::StreamMetrics;
    ///
    /// let mut metrics = StreamMetrics::new("openai");
    /// metrics.record_completion(12);
    /// assert!(metrics.is_recorded());
    /// ```
    pub fn new(provider: impl Into<String>) -> Self {
        let provider = provider.into();
        increment_counter!("parley_streams_total", "provider" => provider.clone());
        increment_gauge!("parley_streams_active", 1.0, "provider" => provider.clone());

        Self {
            provider,
            start: Instant::now(),
            recorded: false,
        }
    }

    /// Records a completed stream
    pub fn record_completion(&mut self, chunks: usize) {
        if self.recorded {
            return;
        }
        self.recorded = true;

        histogram!("parley_stream_chunks", chunks as f64, "provider" => self.provider.clone());
        histogram!(
            "parley_stream_duration_seconds",
            self.start.elapsed().as_secs_f64(),
            "provider" => self.provider.clone(),
            "status" => "completed"
        );
        decrement_gauge!("parley_streams_active", 1.0, "provider" => self.provider.clone());
    }

    /// Records a failed stream
    pub fn record_error(&mut self, kind: &str) {
        if self.recorded {
            return;
        }
        self.recorded = true;

        increment_counter!(
            "parley_stream_errors_total",
            "provider" => self.provider.clone(),
            "kind" => kind.to_string()
        );
        histogram!(
            "parley_stream_duration_seconds",
            self.start.elapsed().as_secs_f64(),
            "provider" => self.provider.clone(),
            "status" => "failed"
        );
        decrement_gauge!("parley_streams_active", 1.0, "provider" => self.provider.clone());
    }

    /// Whether an outcome has been recorded
    pub fn is_recorded(&self) -> bool {
        self.recorded
    }

    /// Time since the stream started
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for StreamMetrics {
    fn drop(&mut self) {
        // Dropped mid-stream (cancelled turn)
        if !self.recorded {
            decrement_gauge!("parley_streams_active", 1.0, "provider" => self.provider.clone());
        }
    }
}
