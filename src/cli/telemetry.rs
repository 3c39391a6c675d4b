//! Tracing and OpenTelemetry initialization.

use anyhow::{Context, Result};
use opentelemetry::{global, trace::TracerProvider as _, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{runtime::Tokio, trace, Resource};
use std::time::Duration;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

/// Spans are exported over OTLP only when an endpoint is configured; the
/// fmt layer is always installed.
const OTLP_ENDPOINT_ENV: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";

/// Initialize the global tracing subscriber.
///
/// # Errors
///
/// Returns an error if the OTLP exporter cannot be built or a global
/// subscriber is already set.
pub fn init(verbosity: Option<tracing::Level>) -> Result<()> {
    let fmt_layer = fmt::layer()
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_target(false);

    // RUST_LOG overrides the -v derived default
    let default_level = verbosity.unwrap_or(tracing::Level::ERROR);
    let env_filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    let registry = Registry::default().with(fmt_layer).with(env_filter);

    if std::env::var(OTLP_ENDPOINT_ENV).is_ok() {
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_timeout(Duration::from_secs(3))
            .build()
            .context("Failed to build OTLP span exporter")?;

        let provider = trace::TracerProvider::builder()
            .with_batch_exporter(exporter, Tokio)
            .with_resource(Resource::new(vec![
                KeyValue::new("service.name", env!("CARGO_PKG_NAME")),
                KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
            ]))
            .build();

        let tracer = provider.tracer(env!("CARGO_PKG_NAME"));
        global::set_tracer_provider(provider);

        tracing::subscriber::set_global_default(registry.with(OpenTelemetryLayer::new(tracer)))
            .context("Failed to set global tracing subscriber")?;
    } else {
        tracing::subscriber::set_global_default(registry)
            .context("Failed to set global tracing subscriber")?;
    }

    Ok(())
}
