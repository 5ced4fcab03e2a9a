//! Structured logging and distributed tracing for the scheduler.
//!
//! Two entry points: [`init_logging`] for plain `tracing_subscriber` JSON
//! output (the default for local runs and tests), and
//! [`init_logging_with_otlp`] which additionally bridges spans to an OTLP
//! collector via `tracing-opentelemetry`.

use opentelemetry_sdk::Resource;
use std::time::Duration;
use tracing::info;

/// OTLP exporter configuration, read from the standard `OTEL_*` environment
/// variables with sensible defaults for local development.
#[derive(Debug, Clone)]
pub struct OtlpConfig {
    pub endpoint: String,
    pub service_name: String,
    pub service_version: String,
    pub timeout: Duration,
}

impl Default for OtlpConfig {
    fn default() -> Self {
        Self {
            endpoint: std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
                .unwrap_or_else(|_| "http://localhost:4317".to_string()),
            service_name: std::env::var("OTEL_SERVICE_NAME")
                .unwrap_or_else(|_| "krakenhashes-scheduler".to_string()),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

fn default_env_filter() -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("krakenhashes=info,tower_http=info"))
}

/// Initialize a JSON-formatted `tracing` subscriber from `RUST_LOG` (or the
/// crate's own default filter). No OTLP export; this is what the server
/// binary runs when no collector is configured.
pub fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(default_env_filter())
        .with_target(true)
        .with_current_span(true)
        .init();
    Ok(())
}

fn build_tracer(
    config: &OtlpConfig,
) -> Result<opentelemetry_sdk::trace::Tracer, Box<dyn std::error::Error>> {
    use opentelemetry_otlp::WithExportConfig;

    let resource = Resource::new(vec![
        opentelemetry::KeyValue::new("service.name", config.service_name.clone()),
        opentelemetry::KeyValue::new("service.version", config.service_version.clone()),
    ]);

    let exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(&config.endpoint)
        .with_timeout(config.timeout);

    let provider = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(exporter)
        .with_trace_config(opentelemetry_sdk::trace::Config::default().with_resource(resource))
        .install_batch(opentelemetry_sdk::runtime::Tokio)?;

    Ok(provider.tracer(config.service_name.clone()))
}

/// Initialize structured logging plus OTLP span export. Spans created with
/// `#[tracing::instrument]` anywhere in the scheduler are bridged to the
/// configured collector in addition to being printed as JSON.
pub fn init_logging_with_otlp(config: &OtlpConfig) -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::Registry;

    let tracer = build_tracer(config)?;
    let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);

    let fmt_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_target(true)
        .with_current_span(true)
        .with_span_list(true);

    let subscriber = Registry::default()
        .with(default_env_filter())
        .with(fmt_layer)
        .with(otel_layer);

    tracing::subscriber::set_global_default(subscriber)?;

    info!(
        endpoint = %config.endpoint,
        service = %config.service_name,
        "tracing initialized with OTLP export"
    );

    Ok(())
}

/// Initialize logging, enabling OTLP export only when `OTEL_EXPORTER_OTLP_ENDPOINT`
/// is set. This is what `main.rs` calls at startup.
pub fn init_from_env() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() {
        init_logging_with_otlp(&OtlpConfig::default())
    } else {
        init_logging()
    }
}

/// Gracefully flush any buffered OTLP spans. Call on shutdown; batched
/// exporters otherwise drop spans queued since the last export tick.
pub fn shutdown_tracing() {
    opentelemetry::global::shutdown_tracer_provider();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn otlp_config_defaults_to_localhost() {
        std::env::remove_var("OTEL_EXPORTER_OTLP_ENDPOINT");
        std::env::remove_var("OTEL_SERVICE_NAME");
        let config = OtlpConfig::default();
        assert_eq!(config.endpoint, "http://localhost:4317");
        assert_eq!(config.service_name, "krakenhashes-scheduler");
    }

    #[test]
    fn otlp_config_reads_environment() {
        std::env::set_var("OTEL_EXPORTER_OTLP_ENDPOINT", "http://collector:4317");
        std::env::set_var("OTEL_SERVICE_NAME", "krakenhashes-test");

        let config = OtlpConfig::default();
        assert_eq!(config.endpoint, "http://collector:4317");
        assert_eq!(config.service_name, "krakenhashes-test");

        std::env::remove_var("OTEL_EXPORTER_OTLP_ENDPOINT");
        std::env::remove_var("OTEL_SERVICE_NAME");
    }
}
