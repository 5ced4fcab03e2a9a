//! Connection and message counters for the command plane.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Default)]
pub struct MessageMetrics {
    pub total: u64,
    pub success: u64,
    pub failure: u64,
}

#[derive(Debug, Clone, Default)]
pub struct LatencyMetrics {
    pub p50_ms: u64,
    pub p95_ms: u64,
    pub p99_ms: u64,
}

#[derive(Debug, Clone, Default)]
pub struct ConnectionMetrics {
    pub active_connections: u64,
    pub total_connects: u64,
    pub total_disconnects: u64,
}

#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub messages: MessageMetrics,
    pub latency: LatencyMetrics,
    pub connections: ConnectionMetrics,
}

/// Shared across the registry's per-agent connection actors. Cheap to clone
/// (an `Arc` internally); one instance serves the whole command plane.
pub struct MetricsCollector {
    messages: Arc<Mutex<MessageMetrics>>,
    latencies: Arc<Mutex<VecDeque<u64>>>,
    connections: Arc<Mutex<ConnectionMetrics>>,
    max_latency_samples: usize,
}

impl MetricsCollector {
    pub fn new(max_samples: usize) -> Self {
        Self {
            messages: Arc::new(Mutex::new(MessageMetrics::default())),
            latencies: Arc::new(Mutex::new(VecDeque::with_capacity(max_samples))),
            connections: Arc::new(Mutex::new(ConnectionMetrics::default())),
            max_latency_samples: max_samples,
        }
    }

    pub fn record_message(&self, success: bool) {
        let mut metrics = self.messages.lock().expect("metrics mutex poisoned");
        metrics.total += 1;
        if success {
            metrics.success += 1;
        } else {
            metrics.failure += 1;
        }
    }

    pub fn record_latency(&self, latency_ms: u64) {
        let mut latencies = self.latencies.lock().expect("metrics mutex poisoned");
        latencies.push_back(latency_ms);
        if latencies.len() > self.max_latency_samples {
            latencies.pop_front();
        }
    }

    pub fn record_connect(&self) {
        let mut connections = self.connections.lock().expect("metrics mutex poisoned");
        connections.active_connections += 1;
        connections.total_connects += 1;
    }

    pub fn record_disconnect(&self) {
        let mut connections = self.connections.lock().expect("metrics mutex poisoned");
        connections.active_connections = connections.active_connections.saturating_sub(1);
        connections.total_disconnects += 1;
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let messages = self.messages.lock().expect("metrics mutex poisoned").clone();
        let connections = self
            .connections
            .lock()
            .expect("metrics mutex poisoned")
            .clone();

        let mut latency_vec: Vec<u64> = self
            .latencies
            .lock()
            .expect("metrics mutex poisoned")
            .iter()
            .copied()
            .collect();
        latency_vec.sort_unstable();

        let latency = if latency_vec.is_empty() {
            LatencyMetrics::default()
        } else {
            let idx = |pct: f64| {
                let i = (latency_vec.len() as f64 * pct) as usize;
                latency_vec.get(i.min(latency_vec.len() - 1)).copied().unwrap_or(0)
            };
            LatencyMetrics {
                p50_ms: idx(0.5),
                p95_ms: idx(0.95),
                p99_ms: idx(0.99),
            }
        };

        MetricsSnapshot {
            messages,
            latency,
            connections,
        }
    }
}

pub struct LatencyTimer {
    start: Instant,
    collector: Arc<MetricsCollector>,
}

impl LatencyTimer {
    pub fn start(collector: Arc<MetricsCollector>) -> Self {
        Self {
            start: Instant::now(),
            collector,
        }
    }

    pub fn finish(self) -> Duration {
        let duration = self.start.elapsed();
        self.collector.record_latency(duration.as_millis() as u64);
        duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reports_recorded_messages() {
        let collector = MetricsCollector::new(100);
        collector.record_message(true);
        collector.record_message(false);
        let snapshot = collector.snapshot();
        assert_eq!(snapshot.messages.total, 2);
        assert_eq!(snapshot.messages.success, 1);
        assert_eq!(snapshot.messages.failure, 1);
    }

    #[test]
    fn connect_disconnect_tracks_active_count() {
        let collector = MetricsCollector::new(100);
        collector.record_connect();
        collector.record_connect();
        collector.record_disconnect();
        let snapshot = collector.snapshot();
        assert_eq!(snapshot.connections.active_connections, 1);
        assert_eq!(snapshot.connections.total_connects, 2);
        assert_eq!(snapshot.connections.total_disconnects, 1);
    }
}
