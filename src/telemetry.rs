//! OpenTelemetry tracing integration for deep_research.
//!
//! Builds a layered tracing subscriber: a `fmt` layer for console output
//! (always active) plus an OpenTelemetry layer exporting spans via OTLP/gRPC
//! when the config enables it. Driven by [`TelemetryConfig`] with the
//! standard OTel environment variable overrides applied by the config layer.

use crate::config::TelemetryConfig;
use anyhow::{Context, Result};
use opentelemetry::trace::TracerProvider;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::TracerProvider as SdkTracerProvider;
use opentelemetry_sdk::Resource;
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the tracing subscriber.
///
/// `verbose` lowers the default fmt level to DEBUG; `RUST_LOG` overrides
/// either way. When `config.enabled` is set, spans are additionally exported
/// to the OTLP collector at `config.otlp_endpoint` under
/// `config.service_name`.
///
/// # Errors
/// Returns an error if the OTLP exporter or tracer provider fails to
/// initialise.
pub fn init_telemetry(config: &TelemetryConfig, verbose: bool) -> Result<()> {
    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    if config.enabled {
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(&config.otlp_endpoint)
            .build()
            .context("Failed to build OTLP span exporter")?;

        let provider = SdkTracerProvider::builder()
            .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
            .with_resource(Resource::new(vec![opentelemetry::KeyValue::new(
                "service.name",
                config.service_name.clone(),
            )]))
            .build();

        let tracer = provider.tracer(config.service_name.clone());

        // Register the provider globally so shutdown can flush it
        opentelemetry::global::set_tracer_provider(provider);

        let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .with(otel_layer)
            .init();

        tracing::info!(
            otlp_endpoint = %config.otlp_endpoint,
            service_name = %config.service_name,
            "OpenTelemetry tracing enabled"
        );
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .init();
    }

    Ok(())
}

/// Flush pending spans and shut down the global tracer provider.
///
/// Call this once the run finishes so in-flight spans are exported before
/// the process exits.
pub fn shutdown_telemetry() {
    opentelemetry::global::shutdown_tracer_provider();
}
