//! Performance metrics and statistics tracking for the prediction service.

use crate::types::prediction::PredictionKind;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

/// Metrics collector for pipeline activity
pub struct PipelineMetrics {
    /// Survival predictions stored
    pub survival_predictions: AtomicU64,
    /// Sepsis risk predictions stored
    pub sepsis_predictions: AtomicU64,
    /// Sepsis predictions flagged positive (probability >= 0.5)
    pub sepsis_high_probability: AtomicU64,
    /// User-correctable rejections by reason
    rejections: RwLock<HashMap<String, u64>>,
    /// Internal failures by reason
    failures: RwLock<HashMap<String, u64>>,
    /// Processing times (in microseconds)
    processing_times: RwLock<Vec<u64>>,
    /// Sepsis probability distribution buckets
    probability_buckets: RwLock<[u64; 10]>,
    /// Start time for rate calculation
    start_time: Instant,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            survival_predictions: AtomicU64::new(0),
            sepsis_predictions: AtomicU64::new(0),
            sepsis_high_probability: AtomicU64::new(0),
            rejections: RwLock::new(HashMap::new()),
            failures: RwLock::new(HashMap::new()),
            processing_times: RwLock::new(Vec::with_capacity(1000)),
            probability_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
        }
    }

    /// Record a stored prediction
    pub fn record_prediction(
        &self,
        kind: PredictionKind,
        processing_time: Duration,
        probability: Option<f64>,
    ) {
        match kind {
            PredictionKind::Survival => {
                self.survival_predictions.fetch_add(1, Ordering::Relaxed);
            }
            PredictionKind::SepsisRisk => {
                self.sepsis_predictions.fetch_add(1, Ordering::Relaxed);
            }
        }

        if let Ok(mut times) = self.processing_times.write() {
            times.push(processing_time.as_micros() as u64);
            // Keep only last 10000 for memory efficiency
            if times.len() > 10000 {
                times.drain(0..5000);
            }
        }

        if let Some(probability) = probability {
            if probability >= 0.5 {
                self.sepsis_high_probability.fetch_add(1, Ordering::Relaxed);
            }
            let bucket = (probability.clamp(0.0, 1.0) * 10.0).min(9.0) as usize;
            if let Ok(mut buckets) = self.probability_buckets.write() {
                buckets[bucket] += 1;
            }
        }
    }

    /// Record a request rejected for bad input
    pub fn record_rejection(&self, reason: &str) {
        if let Ok(mut by_reason) = self.rejections.write() {
            *by_reason.entry(reason.to_string()).or_insert(0) += 1;
        }
    }

    /// Record an inference or storage failure
    pub fn record_failure(&self, reason: &str) {
        if let Ok(mut by_reason) = self.failures.write() {
            *by_reason.entry(reason.to_string()).or_insert(0) += 1;
        }
    }

    pub fn total_predictions(&self) -> u64 {
        self.survival_predictions.load(Ordering::Relaxed)
            + self.sepsis_predictions.load(Ordering::Relaxed)
    }

    /// Get processing time statistics
    pub fn get_processing_stats(&self) -> ProcessingStats {
        let times = match self.processing_times.read() {
            Ok(times) => times,
            Err(_) => return ProcessingStats::default(),
        };
        if times.is_empty() {
            return ProcessingStats::default();
        }

        let mut sorted: Vec<u64> = times.clone();
        sorted.sort_unstable();

        let sum: u64 = sorted.iter().sum();
        let count = sorted.len();
        let percentile = |p: f64| sorted[((count as f64 * p) as usize).min(count - 1)];

        ProcessingStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: sorted[count / 2],
            p95_us: percentile(0.95),
            p99_us: percentile(0.99),
            max_us: *sorted.last().unwrap_or(&0),
        }
    }

    /// Predictions per second since startup
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.total_predictions() as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn get_probability_distribution(&self) -> [u64; 10] {
        self.probability_buckets
            .read()
            .map(|b| *b)
            .unwrap_or([0; 10])
    }

    pub fn get_rejections(&self) -> HashMap<String, u64> {
        self.rejections
            .read()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn get_failures(&self) -> HashMap<String, u64> {
        self.failures.read().map(|f| f.clone()).unwrap_or_default()
    }

    /// Point-in-time copy for the metrics endpoint
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.start_time.elapsed().as_secs(),
            survival_predictions: self.survival_predictions.load(Ordering::Relaxed),
            sepsis_predictions: self.sepsis_predictions.load(Ordering::Relaxed),
            sepsis_high_probability: self.sepsis_high_probability.load(Ordering::Relaxed),
            throughput_per_sec: self.get_throughput(),
            rejections: self.get_rejections(),
            failures: self.get_failures(),
            processing: self.get_processing_stats(),
            probability_distribution: self.get_probability_distribution(),
        }
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        let snapshot = self.snapshot();
        let total = snapshot.survival_predictions + snapshot.sepsis_predictions;
        let positive_rate = if snapshot.sepsis_predictions > 0 {
            (snapshot.sepsis_high_probability as f64 / snapshot.sepsis_predictions as f64) * 100.0
        } else {
            0.0
        };

        info!("╔══════════════════════════════════════════════════════════════╗");
        info!("║          SEPSIS PREDICTION SERVICE - METRICS SUMMARY         ║");
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Predictions Stored:     {:>8}  │  Throughput: {:>6.2} /s   ║",
            total, snapshot.throughput_per_sec
        );
        info!(
            "║ Survival: {:>8}  │  Sepsis: {:>8}  │  >=0.5: {:>5.1}%    ║",
            snapshot.survival_predictions, snapshot.sepsis_predictions, positive_rate
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Processing Time (μs): mean={:>5} p50={:>5} p95={:>5} p99={:>5} ║",
            snapshot.processing.mean_us,
            snapshot.processing.p50_us,
            snapshot.processing.p95_us,
            snapshot.processing.p99_us
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        for (reason, count) in &snapshot.rejections {
            info!("║   rejected {:16}: {:>6}                            ║", reason, count);
        }
        for (reason, count) in &snapshot.failures {
            info!("║   failed   {:16}: {:>6}                            ║", reason, count);
        }
        info!("║ Sepsis Probability Distribution:                             ║");
        let dist_total: u64 = snapshot.probability_distribution.iter().sum();
        for (i, &count) in snapshot.probability_distribution.iter().enumerate() {
            let pct = if dist_total > 0 {
                (count as f64 / dist_total as f64) * 100.0
            } else {
                0.0
            };
            let bar_len = (pct / 2.0) as usize;
            let bar: String = "█".repeat(bar_len.min(20));
            info!(
                "║   {:.1}-{:.1}: {:>6} ({:>5.1}%) {}",
                i as f64 / 10.0,
                (i + 1) as f64 / 10.0,
                count,
                pct,
                bar
            );
        }
        info!("╚══════════════════════════════════════════════════════════════╝");
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Processing time statistics
#[derive(Debug, Default, Clone, Serialize)]
pub struct ProcessingStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Serializable view of all counters
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub survival_predictions: u64,
    pub sepsis_predictions: u64,
    pub sepsis_high_probability: u64,
    pub throughput_per_sec: f64,
    pub rejections: HashMap<String, u64>,
    pub failures: HashMap<String, u64>,
    pub processing: ProcessingStats,
    pub probability_distribution: [u64; 10],
}

/// Real-time metrics reporter that prints periodic summaries
pub struct MetricsReporter {
    metrics: Arc<PipelineMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<PipelineMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs.max(1)));
        // The first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}
