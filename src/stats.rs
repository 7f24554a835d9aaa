/// Replay statistics
///
/// Running counters for one replay plus bounded latency windows. Rates are
/// computed against wall-clock time since the first packet, so they measure
/// how fast the capture was processed, not the capture's own pace.

use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::info;

const WINDOW_SIZE: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencyStats {
    pub min_ns: u64,
    pub max_ns: u64,
    pub mean_ns: f64,
    pub p50_ns: u64,
    pub p99_ns: u64,
}

/// The most recent latency samples, oldest evicted first
#[derive(Debug, Clone, Default)]
pub struct LatencyWindow {
    samples: VecDeque<u64>,
}

impl LatencyWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, elapsed: Duration) {
        if self.samples.len() == WINDOW_SIZE {
            self.samples.pop_front();
        }
        self.samples.push_back(u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX));
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn stats(&self) -> Option<LatencyStats> {
        let mut sorted: Vec<u64> = self.samples.iter().copied().collect();
        sorted.sort_unstable();
        let (&min_ns, &max_ns) = (sorted.first()?, sorted.last()?);
        let rank = |pct: usize| sorted[(sorted.len() * pct / 100).min(sorted.len() - 1)];
        Some(LatencyStats {
            min_ns,
            max_ns,
            mean_ns: sorted.iter().map(|&n| n as f64).sum::<f64>() / sorted.len() as f64,
            p50_ns: rank(50),
            p99_ns: rank(99),
        })
    }
}

/// Point-in-time view of a `FeedStats`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeedSnapshot {
    pub packets: u64,
    pub messages: u64,
    pub bytes: u64,
    /// Missing sequence numbers over all sessions
    pub missing: u64,
    pub gap_events: u64,
    pub elapsed: Duration,
    pub packets_per_sec: f64,
    pub messages_per_sec: f64,
    pub bytes_per_sec: f64,
    pub packet_latency: Option<LatencyStats>,
}

#[derive(Debug, Clone, Default)]
pub struct FeedStats {
    first_packet: Option<Instant>,
    packets: u64,
    messages: u64,
    bytes: u64,
    missing: u64,
    gap_events: u64,
    packet_latency: LatencyWindow,
}

impl FeedStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_packet(&mut self, size: usize) {
        self.first_packet.get_or_insert_with(Instant::now);
        self.packets += 1;
        self.bytes += size as u64;
    }

    pub fn record_message(&mut self) {
        self.messages += 1;
    }

    /// Time spent decoding and handling one packet
    pub fn record_packet_latency(&mut self, elapsed: Duration) {
        self.packet_latency.record(elapsed);
    }

    pub fn record_gap(&mut self, missing: u64) {
        self.missing += missing;
        self.gap_events += 1;
    }

    pub fn snapshot(&self) -> FeedSnapshot {
        let elapsed = self.first_packet.map_or(Duration::ZERO, |t| t.elapsed());
        let secs = elapsed.as_secs_f64();
        let rate = |n: u64| if secs > 0.0 { n as f64 / secs } else { 0.0 };
        FeedSnapshot {
            packets: self.packets,
            messages: self.messages,
            bytes: self.bytes,
            missing: self.missing,
            gap_events: self.gap_events,
            elapsed,
            packets_per_sec: rate(self.packets),
            messages_per_sec: rate(self.messages),
            bytes_per_sec: rate(self.bytes),
            packet_latency: self.packet_latency.stats(),
        }
    }

    pub fn log_summary(&self) {
        let s = self.snapshot();
        info!(
            packets = s.packets,
            messages = s.messages,
            bytes = s.bytes,
            elapsed = ?s.elapsed,
            packets_per_sec = %format!("{:.0}", s.packets_per_sec),
            messages_per_sec = %format!("{:.0}", s.messages_per_sec),
            "feed statistics"
        );
        if let Some(l) = s.packet_latency {
            info!(
                min_ns = l.min_ns,
                p50_ns = l.p50_ns,
                p99_ns = l.p99_ns,
                max_ns = l.max_ns,
                mean_ns = %format!("{:.1}", l.mean_ns),
                "packet latency"
            );
        }
        if s.gap_events > 0 {
            info!(missing = s.missing, events = s.gap_events, "sequence gaps");
        }
    }
}
