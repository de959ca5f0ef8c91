//! Logging and metrics exporter setup for the binaries

use crate::config::ObservabilityConfig;
use crate::errors::{AppError, Result};
use crate::metrics::{register_metrics, EMBEDDING_BUCKETS};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` overrides the configured level when set.
pub fn init_tracing(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| AppError::Configuration {
            message: format!("invalid log level '{}': {}", config.log_level, e),
        })?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let installed = if config.json_logging {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    installed.map_err(|e| AppError::Configuration {
        message: format!("failed to install tracing subscriber: {}", e),
    })
}

/// Start the Prometheus exporter when a metrics port is configured
pub fn install_metrics_exporter(config: &ObservabilityConfig) -> Result<()> {
    if config.metrics_port == 0 {
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], config.metrics_port))
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            EMBEDDING_BUCKETS,
        )
        .map_err(|e| AppError::Configuration {
            message: format!("invalid metric buckets: {}", e),
        })?
        .install()
        .map_err(|e| AppError::Configuration {
            message: format!("failed to start metrics exporter: {}", e),
        })?;

    register_metrics();
    tracing::info!(port = config.metrics_port, service = %config.service_name, "Metrics exporter listening");
    Ok(())
}
