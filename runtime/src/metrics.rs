//! Prometheus metrics for observability and monitoring.
//!
//! The store and its subscription engine record through the `metrics` facade
//! unconditionally; nothing is collected until a recorder is installed. This
//! module describes the metrics and provides a Prometheus-backed exporter.
//!
//! # Example
//!
//! ```rust,no_run
//! use statecraft_runtime::metrics::MetricsExporter;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut exporter = MetricsExporter::new();
//! exporter.install()?;
//!
//! // ... run stores ...
//!
//! if let Some(text) = exporter.render() {
//!     println!("{text}");
//! }
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics exporter.
///
/// Installs a global recorder and renders the collected metrics in the
/// Prometheus text format, ready to be served by whatever HTTP layer the
/// application uses.
#[derive(Default)]
pub struct MetricsExporter {
    handle: Option<PrometheusHandle>,
}

impl MetricsExporter {
    /// Create an exporter that has not been installed yet.
    #[must_use]
    pub const fn new() -> Self {
        Self { handle: None }
    }

    /// Describe all metrics and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// If a recorder is already installed (e.g., by another test), this logs a
    /// warning and succeeds without a handle; [`render`](Self::render) then
    /// returns `None`.
    pub fn install(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.000_01, 0.000_05, 0.000_1, 0.000_5, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!("Prometheus metrics recorder installed");
                Ok(())
            },
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            },
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if this exporter did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
pub fn register_metrics() {
    // Store
    describe_counter!(
        "store_actions_processed_total",
        "Total number of actions reduced by stores, by origin"
    );
    describe_histogram!(
        "store_reducer_duration_seconds",
        "Time taken by a single reducer invocation"
    );
    describe_counter!(
        "store_emissions_discarded_total",
        "Effect actions dropped because their subscription was cancelled"
    );
    describe_gauge!(
        "store_effects_in_flight",
        "Effect subscriptions that have not completed yet"
    );

    // Effects
    describe_counter!(
        "effects_subscribed_total",
        "Total number of effect nodes subscribed, by kind"
    );
    describe_counter!(
        "effects_cancelled_total",
        "Total number of subscriptions disposed through cancellation"
    );
    describe_counter!(
        "effects_failed_total",
        "Async effects that could not be started, by kind"
    );
    describe_gauge!(
        "effects_pending_tasks",
        "Async effect tasks currently running on the Tokio runtime"
    );
}

/// Store metrics recorder.
pub struct StoreMetrics;

impl StoreMetrics {
    /// Record an action reduced by a store.
    pub fn record_action(origin: &'static str, duration: Duration) {
        counter!("store_actions_processed_total", "origin" => origin).increment(1);
        histogram!("store_reducer_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record an effect action dropped at the registry boundary.
    pub fn record_discarded() {
        counter!("store_emissions_discarded_total").increment(1);
    }

    /// Record the number of in-flight effect subscriptions.
    #[allow(clippy::cast_precision_loss)] // Gauge values never approach 2^52
    pub fn record_in_flight(count: usize) {
        gauge!("store_effects_in_flight").set(count as f64);
    }
}

/// Effect metrics recorder.
pub struct EffectMetrics;

impl EffectMetrics {
    /// Record an effect node subscription.
    pub fn record_subscribed(kind: &'static str) {
        counter!("effects_subscribed_total", "kind" => kind).increment(1);
    }

    /// Record subscriptions disposed by a cancellation.
    pub fn record_cancelled(count: usize) {
        counter!("effects_cancelled_total").increment(count as u64);
    }

    /// Record an async effect that could not be started.
    pub fn record_failure(kind: &'static str) {
        counter!("effects_failed_total", "kind" => kind).increment(1);
    }

    /// Record the number of running async effect tasks.
    #[allow(clippy::cast_precision_loss)] // Gauge values never approach 2^52
    pub fn record_pending_tasks(count: usize) {
        gauge!("effects_pending_tasks").set(count as f64);
    }
}
