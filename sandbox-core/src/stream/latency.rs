//! Round-trip statistics for the exchange loop.
//!
//! Each completed exchange contributes one [`ExchangeSample`]. Rates are
//! measured between the oldest and newest completion still inside the
//! window, so a single exchange yields no rate at all.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// One completed round trip.
#[derive(Debug, Clone, Copy)]
struct ExchangeSample {
    completed_at: Instant,
    /// Request plus response body bytes.
    bytes: u64,
}

/// Windowed exchange rate and smoothed round-trip time.
#[derive(Debug)]
pub struct LatencyTracker {
    window: Duration,
    recent: VecDeque<ExchangeSample>,
    srtt: Option<Duration>,
    last_rtt: Duration,
}

impl LatencyTracker {
    pub fn new() -> Self {
        Self::with_window(Duration::from_secs(1))
    }

    /// Rates consider completions no older than `window` relative to the
    /// newest one.
    pub fn with_window(window: Duration) -> Self {
        Self {
            window,
            recent: VecDeque::new(),
            srtt: None,
            last_rtt: Duration::ZERO,
        }
    }

    /// Record an exchange that finished at `completed_at`.
    pub fn record_at(&mut self, completed_at: Instant, bytes: u64, rtt: Duration) {
        self.recent.push_back(ExchangeSample {
            completed_at,
            bytes,
        });
        while self
            .recent
            .front()
            .is_some_and(|s| completed_at.saturating_duration_since(s.completed_at) > self.window)
        {
            self.recent.pop_front();
        }

        // RFC 6298 smoothing, alpha = 1/8.
        self.srtt = Some(match self.srtt {
            None => rtt,
            Some(srtt) => (srtt * 7 + rtt) / 8,
        });
        self.last_rtt = rtt;
    }

    /// Span between the oldest and newest completion in the window, if
    /// there are at least two and they are apart in time.
    fn span(&self) -> Option<Duration> {
        let first = self.recent.front()?;
        let last = self.recent.back()?;
        let span = last.completed_at.saturating_duration_since(first.completed_at);
        (self.recent.len() > 1 && !span.is_zero()).then_some(span)
    }

    /// Bytes per second moved by the exchanges completed after the oldest
    /// one in the window. `0` until two completions are spread in time.
    pub fn throughput_bps(&self) -> u64 {
        let Some(span) = self.span() else {
            return 0;
        };
        let bytes: u64 = self.recent.iter().skip(1).map(|s| s.bytes).sum();
        (bytes as f64 / span.as_secs_f64()) as u64
    }

    /// Completed exchanges per second over the window.
    pub fn exchanges_per_sec(&self) -> f64 {
        self.span()
            .map(|span| (self.recent.len() - 1) as f64 / span.as_secs_f64())
            .unwrap_or(0.0)
    }

    /// Smoothed round-trip time, `Duration::ZERO` before the first sample.
    pub fn smoothed_rtt(&self) -> Duration {
        self.srtt.unwrap_or_default()
    }

    pub fn last_rtt(&self) -> Duration {
        self.last_rtt
    }
}

impl Default for LatencyTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RTT: Duration = Duration::from_millis(10);

    #[test]
    fn no_rate_before_two_exchanges() {
        let mut t = LatencyTracker::new();
        assert_eq!(t.throughput_bps(), 0);
        assert_eq!(t.smoothed_rtt(), Duration::ZERO);

        t.record_at(Instant::now(), 1_000_000, RTT);
        assert_eq!(t.throughput_bps(), 0);
        assert_eq!(t.exchanges_per_sec(), 0.0);
        assert_eq!(t.smoothed_rtt(), RTT);
    }

    #[test]
    fn simultaneous_completions_report_no_rate() {
        let mut t = LatencyTracker::new();
        let now = Instant::now();
        t.record_at(now, 500, RTT);
        t.record_at(now, 500, RTT);
        assert_eq!(t.throughput_bps(), 0);
    }

    #[test]
    fn steady_stream_rate() {
        let mut t = LatencyTracker::with_window(Duration::from_secs(2));
        let t0 = Instant::now();
        for i in 0..5 {
            t.record_at(t0 + Duration::from_millis(250 * i), 1000, RTT);
        }
        // Four intervals of 250 ms, 1000 bytes each.
        assert!((t.exchanges_per_sec() - 4.0).abs() < 1e-9);
        assert_eq!(t.throughput_bps(), 4000);
    }

    #[test]
    fn window_drops_stale_exchanges() {
        let mut t = LatencyTracker::with_window(Duration::from_millis(500));
        let t0 = Instant::now();
        t.record_at(t0, 1_000_000, RTT);
        t.record_at(t0 + Duration::from_secs(2), 100, RTT);
        t.record_at(t0 + Duration::from_millis(2100), 100, RTT);
        // The first exchange fell out; only the last interval counts.
        assert_eq!(t.throughput_bps(), 1000);
        assert!((t.exchanges_per_sec() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn smoothed_rtt_follows_samples_slowly() {
        let mut t = LatencyTracker::new();
        let now = Instant::now();
        t.record_at(now, 0, Duration::from_millis(10));
        t.record_at(now, 0, Duration::from_millis(2));
        // (10 ms * 7 + 2 ms) / 8
        assert_eq!(t.smoothed_rtt(), Duration::from_millis(9));
        assert_eq!(t.last_rtt(), Duration::from_millis(2));
    }
}
