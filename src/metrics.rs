//! Metrics collection and reporting for a run.
//!
//! Every [`Job::run`](crate::Job::run) fills a [`MetricsCollector`] with the
//! run's timing, a handful of counters and the distribution of partition
//! sizes. The collector is returned in the [`RunReport`](crate::RunReport)
//! and can be printed or saved as JSON.
//!
//! # Built-in metrics
//!
//! The names a run fills are listed in [`BUILTIN`] with their kind and the
//! description attached to them in `to_json` and `print` output. Any other
//! name is accepted and simply has no description.
//!
//! # Example
//!
//! ```no_run
//! use csvfan::metrics::{Metric, MetricsCollector};
//! use serde_json::Value;
//!
//! struct RejectedAmounts(usize);
//!
//! impl Metric for RejectedAmounts {
//!     fn name(&self) -> &str {
//!         "rejected_amounts"
//!     }
//!
//!     fn value(&self) -> Value {
//!         serde_json::json!(self.0)
//!     }
//!
//!     fn as_any(&self) -> &dyn std::any::Any {
//!         self
//!     }
//! }
//!
//! # fn main() -> anyhow::Result<()> {
//! let mut metrics = MetricsCollector::new();
//! metrics.register(Box::new(RejectedAmounts(3)));
//! metrics.print();
//! metrics.save_to_file("metrics.json")?;
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use serde_json::{Value, json};
use std::any::Any;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Trait for custom metrics.
pub trait Metric: Send + Sync + Any {
    /// The name of this metric (e.g., `rows_counted`).
    fn name(&self) -> &str;

    /// The current value of this metric as a JSON value.
    fn value(&self) -> Value;

    /// Optional description of what this metric measures.
    fn description(&self) -> Option<&str> {
        None
    }

    /// Cast to Any for downcasting.
    fn as_any(&self) -> &dyn Any;
}

/// Thread-safe container for a run's metrics. Clones share state.
#[derive(Clone)]
pub struct MetricsCollector {
    inner: Arc<Mutex<Registry>>,
}

#[derive(Default)]
struct Registry {
    metrics: HashMap<String, Box<dyn Metric>>,
    start_time: Option<Instant>,
    end_time: Option<Instant>,
}

impl Registry {
    fn builtin(&self, name: &str) -> Option<&RunMetric> {
        self.metrics.get(name)?.as_any().downcast_ref::<RunMetric>()
    }

    fn put(&mut self, name: &str, value: MetricValue) {
        self.metrics
            .insert(name.to_string(), Box::new(RunMetric::new(name, value)));
    }

    fn elapsed(&self) -> Option<Duration> {
        Some(self.end_time?.duration_since(self.start_time?))
    }
}

impl MetricsCollector {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Registry::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a metric, replacing any metric with the same name.
    pub fn register(&mut self, metric: Box<dyn Metric>) {
        self.lock().metrics.insert(metric.name().to_string(), metric);
    }

    pub fn record_start(&self) {
        self.lock().start_time = Some(Instant::now());
    }

    pub fn record_end(&self) {
        self.lock().end_time = Some(Instant::now());
    }

    /// Time between [`record_start`](Self::record_start) and
    /// [`record_end`](Self::record_end), once both have been called.
    #[must_use]
    pub fn elapsed(&self) -> Option<Duration> {
        self.lock().elapsed()
    }

    /// Add `by` to a counter, starting from zero if `name` is not a counter yet.
    pub fn increment_counter(&self, name: &str, by: u64) {
        let mut registry = self.lock();
        let current = match registry.builtin(name).map(|m| &m.value) {
            Some(MetricValue::Counter(n)) => *n,
            _ => 0,
        };
        registry.put(name, MetricValue::Counter(current + by));
    }

    pub fn set_counter(&self, name: &str, value: u64) {
        self.lock().put(name, MetricValue::Counter(value));
    }

    pub fn set_gauge(&self, name: &str, value: f64) {
        self.lock().put(name, MetricValue::Gauge(value));
    }

    /// Add one observation to the histogram `name`.
    pub fn record_value(&self, name: &str, value: f64) {
        let mut registry = self.lock();
        let mut values = match registry.builtin(name).map(|m| &m.value) {
            Some(MetricValue::Histogram(v)) => v.clone(),
            _ => Vec::new(),
        };
        values.push(value);
        registry.put(name, MetricValue::Histogram(values));
    }

    /// Every metric as `{ name: { "value": .., "description": .. } }`, plus
    /// `execution_time_ms` once the run has ended.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let registry = self.lock();
        let mut out: serde_json::Map<String, Value> = registry
            .metrics
            .iter()
            .map(|(name, metric)| {
                let mut entry = json!({ "value": metric.value() });
                if let Some(desc) = metric.description() {
                    entry["description"] = json!(desc);
                }
                (name.clone(), entry)
            })
            .collect();
        if let Some(elapsed) = registry.elapsed() {
            out.insert(
                "execution_time_ms".to_string(),
                json!({ "value": elapsed.as_millis() as u64, "description": "Wall time of the run" }),
            );
        }
        Value::Object(out)
    }

    /// Print every metric to stdout, sorted by name.
    pub fn print(&self) {
        let registry = self.lock();
        println!("\n============ Run Metrics =============");
        if let Some(elapsed) = registry.elapsed() {
            println!("Execution Time: {:.3}s", elapsed.as_secs_f64());
        }
        let mut names: Vec<_> = registry.metrics.keys().collect();
        names.sort();
        for name in names {
            let metric = &registry.metrics[name];
            match metric.description() {
                Some(desc) => println!("{name}: {} ({desc})", metric.value()),
                None => println!("{name}: {}", metric.value()),
            }
        }
        println!("======================================\n");
    }

    /// Write [`to_json`](Self::to_json), pretty-printed, to `path`.
    ///
    /// # Errors
    /// The file cannot be created or written.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let text = serde_json::to_string_pretty(&self.to_json())?;
        fs::write(path, text).with_context(|| format!("write metrics to {}", path.display()))
    }

    /// Metric names mapped to their current values.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.lock()
            .metrics
            .iter()
            .map(|(name, metric)| (name.clone(), metric.value()))
            .collect()
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MetricsCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsCollector")
            .field("metrics", &self.snapshot())
            .field("elapsed", &self.elapsed())
            .finish()
    }
}

// ========== Run Metrics ==========

/// The metrics every run fills: name, kind and description.
pub const BUILTIN: &[(&str, MetricKind, &str)] = &[
    ("rows_counted", MetricKind::Counter, "Data rows in the source"),
    ("effective_workers", MetricKind::Gauge, "Partitions cut after clamping to the row count"),
    ("partitions_dispatched", MetricKind::Counter, "Partitions handed to a transform"),
    ("partition_rows", MetricKind::Histogram, "Rows per partition"),
    ("worker_failures", MetricKind::Counter, "Transforms that returned an error or panicked"),
    ("success_rows_merged", MetricKind::Counter, "Rows in the aggregate success file"),
    ("error_rows_merged", MetricKind::Counter, "Rows in the aggregate error file"),
    ("row_errors", MetricKind::Counter, "Interim rows or files skipped while merging"),
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
}

/// The description of a built-in metric.
#[must_use]
pub fn describe(name: &str) -> Option<&'static str> {
    BUILTIN
        .iter()
        .find(|(n, _, _)| *n == name)
        .map(|(_, _, desc)| *desc)
}

#[derive(Clone, Debug, PartialEq)]
enum MetricValue {
    Counter(u64),
    Gauge(f64),
    Histogram(Vec<f64>),
}

struct RunMetric {
    name: String,
    value: MetricValue,
}

impl RunMetric {
    fn new(name: &str, value: MetricValue) -> Self {
        Self {
            name: name.to_string(),
            value,
        }
    }
}

impl Metric for RunMetric {
    fn name(&self) -> &str {
        &self.name
    }

    fn value(&self) -> Value {
        match &self.value {
            MetricValue::Counter(n) => json!(n),
            MetricValue::Gauge(v) => json!(v),
            MetricValue::Histogram(values) => {
                let s = HistogramStats::from_values(values);
                json!({
                    "count": s.count,
                    "sum": s.sum,
                    "mean": s.mean,
                    "min": s.min,
                    "max": s.max,
                    "p50": s.p50,
                })
            }
        }
    }

    fn description(&self) -> Option<&str> {
        describe(&self.name)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Summary of a histogram's observations. All zero when there are none.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistogramStats {
    pub count: usize,
    pub sum: f64,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    /// Upper median: the element at `count / 2` once sorted.
    pub p50: f64,
}

impl HistogramStats {
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_values(values: &[f64]) -> Self {
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        let (Some(&min), Some(&max)) = (sorted.first(), sorted.last()) else {
            return Self::default();
        };
        let count = sorted.len();
        let sum: f64 = sorted.iter().sum();
        Self {
            count,
            sum,
            mean: sum / count as f64,
            min,
            max,
            p50: sorted[count / 2],
        }
    }
}
