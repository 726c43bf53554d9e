//! Tracing and telemetry initialization.
//!
//! Always installs a formatted stdout subscriber with an `EnvFilter`. When
//! `OTEL_EXPORTER_OTLP_ENDPOINT` is set, an OTLP (gRPC) span exporter is added
//! so request and database spans reach the collector.

use anyhow::Result;
use opentelemetry::{global, trace::TracerProvider as _, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{propagation::TraceContextPropagator, runtime, trace as sdktrace, Resource};
use std::env::var;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

/// Initialize the global tracing subscriber.
///
/// The verbosity level (from `-v` flags or `HORIZON_LOG_LEVEL`) sets the
/// default directive; `RUST_LOG` still overrides per-target filters.
///
/// # Errors
///
/// Returns an error if the OTLP exporter cannot be built or a global
/// subscriber is already installed.
pub fn init(verbosity: Option<tracing::Level>) -> Result<()> {
    let default_level = verbosity.unwrap_or(tracing::Level::ERROR);

    let env_filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    let fmt_layer = fmt::layer()
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_target(false);

    let registry = Registry::default().with(env_filter).with(fmt_layer);

    if let Ok(endpoint) = var("OTEL_EXPORTER_OTLP_ENDPOINT") {
        global::set_text_map_propagator(TraceContextPropagator::new());

        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()?;

        let provider = sdktrace::TracerProvider::builder()
            .with_batch_exporter(exporter, runtime::Tokio)
            .with_resource(Resource::new(vec![
                KeyValue::new("service.name", env!("CARGO_PKG_NAME")),
                KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
            ]))
            .build();

        let tracer = provider.tracer(env!("CARGO_PKG_NAME"));
        global::set_tracer_provider(provider);

        tracing::subscriber::set_global_default(
            registry.with(tracing_opentelemetry::layer().with_tracer(tracer)),
        )?;
    } else {
        tracing::subscriber::set_global_default(registry)?;
    }

    Ok(())
}
