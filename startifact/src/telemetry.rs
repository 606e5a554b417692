//! Logging, error reporting and metrics for one invocation.

use crate::config::Config;
use metrics_exporter_statsd::StatsdBuilder;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const METRICS_PREFIX: &str = "startifact";

#[derive(thiserror::Error, Debug)]
pub enum TelemetryError {
    #[error("invalid log level {level:?}: {reason}")]
    LogLevel { level: String, reason: String },
    #[error("could not install logging: {0}")]
    Logging(String),
    #[error("could not install metrics: {0}")]
    Metrics(String),
}

/// Keeps error reporting alive until dropped.
pub struct TelemetryGuard {
    _sentry: Option<sentry::ClientInitGuard>,
}

/// Logs go to stderr so stdout carries only progress and results.
/// `RUST_LOG` wins over `log_level`.
pub fn init(log_level: &str, config: &Config) -> Result<TelemetryGuard, TelemetryError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(log_level).map_err(|e| TelemetryError::LogLevel {
            level: log_level.to_string(),
            reason: e.to_string(),
        })?,
    };

    let sentry = config.logging.as_ref().map(|logging| {
        sentry::init((
            logging.sentry_dsn.as_str(),
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(sentry.as_ref().map(|_| sentry::integrations::tracing::layer()))
        .with(filter)
        .try_init()
        .map_err(|e| TelemetryError::Logging(e.to_string()))?;

    if let Some(metrics) = &config.metrics {
        let recorder = StatsdBuilder::from(metrics.statsd_host.clone(), metrics.statsd_port)
            .build(Some(METRICS_PREFIX))
            .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
        metrics::set_global_recorder(recorder)
            .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
        shared::metrics_defs::describe_all(stager::metrics_defs::ALL_METRICS);
        tracing::debug!(
            host = %metrics.statsd_host,
            port = metrics.statsd_port,
            "Sending metrics to statsd"
        );
    }

    Ok(TelemetryGuard { _sentry: sentry })
}
