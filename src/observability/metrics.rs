//! Prometheus metrics for retention passes.
//!
//! Provides metrics for:
//! - Files deleted and bytes freed per category
//! - Pass failures and pass duration
//! - Managed directory occupancy, refreshed whenever stats are collected

#[cfg(feature = "prometheus")]
use metrics::{counter, gauge, histogram};
#[cfg(feature = "prometheus")]
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::config::MetricsConfig;

/// Pass duration buckets in seconds. Passes are usually sub-second but a
/// large cache directory can take a while.
#[cfg(feature = "prometheus")]
const PASS_DURATION_BUCKETS: &[f64] = &[0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 15.0, 60.0];

/// Install the Prometheus exporter and its scrape endpoint.
///
/// Must be called from within a Tokio runtime.
#[cfg(feature = "prometheus")]
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    if !config.enabled {
        return Ok(());
    }

    let builder = PrometheusBuilder::new()
        .with_http_listener(config.listen)
        .set_buckets_for_metric(
            metrics_exporter_prometheus::Matcher::Suffix("_duration_seconds".to_string()),
            PASS_DURATION_BUCKETS,
        )
        .map_err(|e| MetricsError::Setup(e.to_string()))?;

    let (recorder, exporter) = builder.build().map_err(MetricsError::Install)?;
    metrics::set_global_recorder(recorder)
        .map_err(|_| MetricsError::Setup("Metrics already initialized".to_string()))?;

    tokio::spawn(async move {
        if exporter.await.is_err() {
            tracing::error!("Prometheus exporter stopped");
        }
    });

    tracing::info!(listen = %config.listen, "Prometheus metrics endpoint enabled");
    Ok(())
}

/// Install the Prometheus exporter (no-op without prometheus feature).
#[cfg(not(feature = "prometheus"))]
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    if config.enabled {
        tracing::warn!(
            "Metrics are enabled in config but the 'prometheus' feature is not compiled. \
            Rebuild with: cargo build --features prometheus"
        );
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Metric Recording Functions
// ─────────────────────────────────────────────────────────────────────────────

/// Record a completed retention pass.
pub fn record_retention_pass(category: &str, removed: u64, bytes_freed: u64, duration_secs: f64) {
    #[cfg(feature = "prometheus")]
    {
        counter!("retention_files_deleted_total", "category" => category.to_string())
            .increment(removed);
        counter!("retention_bytes_freed_total", "category" => category.to_string())
            .increment(bytes_freed);
        histogram!("retention_pass_duration_seconds", "category" => category.to_string())
            .record(duration_secs);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (category, removed, bytes_freed, duration_secs);
    }
}

/// Record a pass that could not complete.
pub fn record_retention_error(category: &str) {
    #[cfg(feature = "prometheus")]
    {
        counter!("retention_pass_errors_total", "category" => category.to_string()).increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = category;
    }
}

/// Record the current occupancy of a managed directory.
pub fn record_directory_usage(category: &str, total_bytes: u64, file_count: u64) {
    #[cfg(feature = "prometheus")]
    {
        gauge!("retention_directory_bytes", "category" => category.to_string())
            .set(total_bytes as f64);
        gauge!("retention_directory_files", "category" => category.to_string())
            .set(file_count as f64);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (category, total_bytes, file_count);
    }
}

/// Metrics initialization errors.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("Failed to set up metrics: {0}")]
    Setup(String),

    #[cfg(feature = "prometheus")]
    #[error("Failed to install metrics recorder: {0}")]
    Install(#[from] metrics_exporter_prometheus::BuildError),
}
