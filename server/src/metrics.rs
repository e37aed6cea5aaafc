// Request metrics and the /metrics payload

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tts_core::CacheStats;

const LATENCY_WINDOW: usize = 1000;

/// Per-endpoint counters and a sliding window of latencies for percentiles.
#[derive(Debug)]
pub struct EndpointMetrics {
    request_count: AtomicU64,
    error_count: AtomicU64,
    total_latency_ms: AtomicU64,
    min_latency_ms: AtomicU64,
    max_latency_ms: AtomicU64,
    latency_samples: Mutex<VecDeque<u64>>,
}

impl EndpointMetrics {
    pub fn new() -> Self {
        Self {
            request_count: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
            total_latency_ms: AtomicU64::new(0),
            min_latency_ms: AtomicU64::new(u64::MAX),
            max_latency_ms: AtomicU64::new(0),
            latency_samples: Mutex::new(VecDeque::with_capacity(LATENCY_WINDOW)),
        }
    }

    pub fn record(&self, latency: Duration, ok: bool) {
        let latency_ms = latency.as_millis() as u64;
        self.request_count.fetch_add(1, Ordering::Relaxed);
        if !ok {
            self.error_count.fetch_add(1, Ordering::Relaxed);
        }
        self.total_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);
        self.min_latency_ms.fetch_min(latency_ms, Ordering::Relaxed);
        self.max_latency_ms.fetch_max(latency_ms, Ordering::Relaxed);

        if let Ok(mut samples) = self.latency_samples.lock() {
            if samples.len() == LATENCY_WINDOW {
                samples.pop_front();
            }
            samples.push_back(latency_ms);
        }
    }

    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    fn percentiles(&self) -> [u64; 3] {
        let Ok(samples) = self.latency_samples.lock() else {
            return [0; 3];
        };
        if samples.is_empty() {
            return [0; 3];
        }
        let mut sorted: Vec<u64> = samples.iter().copied().collect();
        drop(samples);
        sorted.sort_unstable();
        [50, 95, 99].map(|p| sorted[(sorted.len() * p / 100).min(sorted.len() - 1)])
    }

    pub fn snapshot(&self) -> EndpointStats {
        let request_count = self.request_count();
        let total = self.total_latency_ms.load(Ordering::Relaxed);
        let min = self.min_latency_ms.load(Ordering::Relaxed);
        let [p50, p95, p99] = self.percentiles();
        EndpointStats {
            request_count,
            error_count: self.error_count.load(Ordering::Relaxed),
            avg_latency_ms: if request_count == 0 {
                0.0
            } else {
                total as f64 / request_count as f64
            },
            min_latency_ms: if min == u64::MAX { 0 } else { min },
            max_latency_ms: self.max_latency_ms.load(Ordering::Relaxed),
            p50_latency_ms: p50,
            p95_latency_ms: p95,
            p99_latency_ms: p99,
        }
    }
}

impl Default for EndpointMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Metrics shared by all handlers.
#[derive(Debug)]
pub struct AppMetrics {
    pub tts: EndpointMetrics,
    pub tts_stream: EndpointMetrics,
    pub audio: EndpointMetrics,
    started_at: Instant,
}

impl AppMetrics {
    pub fn new() -> Self {
        Self {
            tts: EndpointMetrics::new(),
            tts_stream: EndpointMetrics::new(),
            audio: EndpointMetrics::new(),
            started_at: Instant::now(),
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn total_requests(&self) -> u64 {
        self.tts.request_count() + self.tts_stream.request_count() + self.audio.request_count()
    }

    pub fn endpoints(&self) -> EndpointMetricsResponse {
        EndpointMetricsResponse {
            tts: self.tts.snapshot(),
            tts_stream: self.tts_stream.snapshot(),
            audio: self.audio.snapshot(),
        }
    }
}

impl Default for AppMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
pub struct MetricsResponse {
    pub timestamp: DateTime<Utc>,
    pub system: SystemMetrics,
    pub endpoints: EndpointMetricsResponse,
    pub cache: CacheStats,
}

#[derive(Serialize)]
pub struct SystemMetrics {
    pub cpu_usage_percent: f32,
    pub memory_used_mb: u64,
    pub memory_total_mb: u64,
    pub memory_usage_percent: f32,
    pub request_count: u64,
    pub uptime_seconds: u64,
    pub system_load: Option<f64>,
}

impl SystemMetrics {
    /// Sample CPU, memory and load average from the host.
    pub fn collect(request_count: u64, uptime: Duration) -> Self {
        let mut system = sysinfo::System::new();
        system.refresh_cpu();
        system.refresh_memory();

        let memory_used = system.used_memory();
        let memory_total = system.total_memory();
        let memory_usage_percent = if memory_total > 0 {
            (memory_used as f64 / memory_total as f64 * 100.0) as f32
        } else {
            0.0
        };

        let load = sysinfo::System::load_average().one;

        Self {
            cpu_usage_percent: system.global_cpu_info().cpu_usage(),
            memory_used_mb: memory_used / 1024 / 1024,
            memory_total_mb: memory_total / 1024 / 1024,
            memory_usage_percent,
            request_count,
            uptime_seconds: uptime.as_secs(),
            system_load: (load > 0.0).then_some(load),
        }
    }
}

#[derive(Serialize)]
pub struct EndpointMetricsResponse {
    pub tts: EndpointStats,
    pub tts_stream: EndpointStats,
    pub audio: EndpointStats,
}

#[derive(Debug, Serialize)]
pub struct EndpointStats {
    pub request_count: u64,
    pub error_count: u64,
    pub avg_latency_ms: f64,
    pub min_latency_ms: u64,
    pub max_latency_ms: u64,
    pub p50_latency_ms: u64,
    pub p95_latency_ms: u64,
    pub p99_latency_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_endpoint_snapshot() {
        let stats = EndpointMetrics::new().snapshot();
        assert_eq!(stats.request_count, 0);
        assert_eq!(stats.min_latency_ms, 0);
        assert_eq!(stats.avg_latency_ms, 0.0);
        assert_eq!(stats.p99_latency_ms, 0);
    }

    #[test]
    fn test_record_tracks_counts_and_latency() {
        let metrics = EndpointMetrics::new();
        for ms in [10, 20, 30, 40] {
            metrics.record(Duration::from_millis(ms), true);
        }
        metrics.record(Duration::from_millis(100), false);

        let stats = metrics.snapshot();
        assert_eq!(stats.request_count, 5);
        assert_eq!(stats.error_count, 1);
        assert_eq!(stats.min_latency_ms, 10);
        assert_eq!(stats.max_latency_ms, 100);
        assert_eq!(stats.avg_latency_ms, 40.0);
        assert_eq!(stats.p50_latency_ms, 30);
        assert_eq!(stats.p99_latency_ms, 100);
    }

    #[test]
    fn test_latency_window_is_bounded() {
        let metrics = EndpointMetrics::new();
        for _ in 0..LATENCY_WINDOW + 10 {
            metrics.record(Duration::from_millis(1), true);
        }
        assert_eq!(metrics.latency_samples.lock().unwrap().len(), LATENCY_WINDOW);
    }

    #[test]
    fn test_total_requests_sums_endpoints() {
        let metrics = AppMetrics::new();
        metrics.tts.record(Duration::ZERO, true);
        metrics.tts_stream.record(Duration::ZERO, true);
        metrics.audio.record(Duration::ZERO, false);
        assert_eq!(metrics.total_requests(), 3);
    }
}
