//! Repeated-prediction latency benchmark
//!
//! Runs the full `preprocess → infer → format` path many times on one image
//! and summarizes the per-call latencies.

use std::time::Duration;

use burn::tensor::backend::Backend;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::predictor::Predictor;
use crate::utils::error::LeafDiseaseError;

/// Configuration for benchmarking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    /// Number of warmup iterations (excluded from measurements)
    pub warmup_iterations: usize,

    /// Number of measured iterations
    pub iterations: usize,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            warmup_iterations: 10,
            iterations: 100,
        }
    }
}

impl BenchmarkConfig {
    /// A short run for smoke testing
    pub fn quick() -> Self {
        Self {
            warmup_iterations: 2,
            iterations: 10,
        }
    }
}

/// Latency statistics from benchmark
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LatencyStats {
    /// Mean latency in milliseconds
    pub mean_ms: f64,
    /// Standard deviation in milliseconds
    pub std_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    /// Median (50th percentile)
    pub p50_ms: f64,
    /// 95th percentile
    pub p95_ms: f64,
    /// 99th percentile
    pub p99_ms: f64,
}

impl LatencyStats {
    /// Calculate statistics from a list of durations
    pub fn from_durations(durations: &[Duration]) -> Self {
        let secs: Vec<f64> = durations.iter().map(Duration::as_secs_f64).collect();
        Self::from_secs(&secs)
    }

    /// Calculate statistics from latencies in seconds
    pub fn from_secs(latencies: &[f64]) -> Self {
        if latencies.is_empty() {
            return Self::default();
        }

        let mut times_ms: Vec<f64> = latencies.iter().map(|s| s * 1000.0).collect();
        times_ms.sort_by(f64::total_cmp);

        let n = times_ms.len();
        let mean = times_ms.iter().sum::<f64>() / n as f64;
        let variance = times_ms.iter().map(|t| (t - mean).powi(2)).sum::<f64>() / n as f64;

        Self {
            mean_ms: mean,
            std_ms: variance.sqrt(),
            min_ms: times_ms[0],
            max_ms: times_ms[n - 1],
            p50_ms: percentile(&times_ms, 50.0),
            p95_ms: percentile(&times_ms, 95.0),
            p99_ms: percentile(&times_ms, 99.0),
        }
    }

    /// Images per second at the mean latency
    pub fn throughput(&self) -> f64 {
        if self.mean_ms > 0.0 {
            1000.0 / self.mean_ms
        } else {
            0.0
        }
    }
}

/// Percentile from sorted data (nearest rank)
fn percentile(sorted_data: &[f64], p: f64) -> f64 {
    if sorted_data.is_empty() {
        return 0.0;
    }

    let idx = (p / 100.0 * (sorted_data.len() - 1) as f64).round() as usize;
    sorted_data[idx.min(sorted_data.len() - 1)]
}

/// Results from a benchmark run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub latency: LatencyStats,
    /// Images per second
    pub throughput: f64,
    pub config: BenchmarkConfig,
    /// RFC 3339 time the run finished
    pub timestamp: String,
    pub backend: String,
}

impl BenchmarkResult {
    pub fn from_latencies(latencies: &[f64], config: BenchmarkConfig, backend: &str) -> Self {
        let latency = LatencyStats::from_secs(latencies);
        Self {
            throughput: latency.throughput(),
            latency,
            config,
            timestamp: chrono::Utc::now().to_rfc3339(),
            backend: backend.to_string(),
        }
    }

    /// Whether the 95th percentile stays within `target_ms`
    pub fn meets_latency_target(&self, target_ms: f64) -> bool {
        self.latency.p95_ms <= target_ms
    }

    pub fn summary(&self) -> String {
        format!(
            "Latency: {:.2}ms (mean), {:.2}ms (p95), {:.2}ms (p99) | Throughput: {:.1} img/s",
            self.latency.mean_ms, self.latency.p95_ms, self.latency.p99_ms, self.throughput
        )
    }
}

impl std::fmt::Display for BenchmarkResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Benchmark Results ({})", self.backend)?;
        writeln!(f, "  Timestamp:  {}", self.timestamp)?;
        writeln!(
            f,
            "  Iterations: {} (+{} warmup)",
            self.config.iterations, self.config.warmup_iterations
        )?;
        writeln!(f, "  Mean:       {:8.2} ms", self.latency.mean_ms)?;
        writeln!(f, "  Std Dev:    {:8.2} ms", self.latency.std_ms)?;
        writeln!(f, "  Min:        {:8.2} ms", self.latency.min_ms)?;
        writeln!(f, "  Max:        {:8.2} ms", self.latency.max_ms)?;
        writeln!(f, "  P50:        {:8.2} ms", self.latency.p50_ms)?;
        writeln!(f, "  P95:        {:8.2} ms", self.latency.p95_ms)?;
        writeln!(f, "  P99:        {:8.2} ms", self.latency.p99_ms)?;
        write!(f, "  Throughput: {:8.1} images/second", self.throughput)
    }
}

/// Benchmark `predictor` on a single image
///
/// Any failing prediction aborts the run, since its latency would not be
/// comparable.
pub fn run_benchmark<B: Backend>(
    predictor: &Predictor<B>,
    image: &DynamicImage,
    config: BenchmarkConfig,
    backend: &str,
) -> Result<BenchmarkResult, LeafDiseaseError> {
    info!(
        "Benchmarking: {} warmup + {} measured iterations",
        config.warmup_iterations, config.iterations
    );

    for _ in 0..config.warmup_iterations {
        predictor.predict(image)?;
    }

    let mut latencies = Vec::with_capacity(config.iterations);
    for _ in 0..config.iterations {
        latencies.push(predictor.predict(image)?.latency_secs);
    }

    let result = BenchmarkResult::from_latencies(&latencies, config, backend);
    info!("{}", result.summary());
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_stats() {
        let durations: Vec<Duration> = vec![
            Duration::from_millis(10),
            Duration::from_millis(12),
            Duration::from_millis(11),
            Duration::from_millis(15),
            Duration::from_millis(9),
        ];

        let stats = LatencyStats::from_durations(&durations);

        assert!((stats.mean_ms - 11.4).abs() < 0.1);
        assert!((stats.min_ms - 9.0).abs() < 1e-9);
        assert!((stats.max_ms - 15.0).abs() < 1e-9);
        assert!((stats.p50_ms - 11.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_stats() {
        let stats = LatencyStats::from_secs(&[]);
        assert_eq!(stats.mean_ms, 0.0);
        assert_eq!(stats.throughput(), 0.0);
    }

    #[test]
    fn test_meets_latency_target() {
        let result =
            BenchmarkResult::from_latencies(&[0.100, 0.120, 0.110], BenchmarkConfig::default(), "cpu");

        assert!(result.meets_latency_target(500.0));
        assert!(!result.meets_latency_target(50.0));
        assert!((result.throughput - 1000.0 / 110.0).abs() < 1e-6);
    }
}
