//! Logging and optional OpenTelemetry export.
//!
//! Console output always goes to stderr so `--json` output on stdout stays
//! clean. When an OTLP endpoint is configured, spans and log events are also
//! exported over gRPC.

use std::time::Duration;

use anyhow::{Context, Result};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::trace::{RandomIdGenerator, Sampler, SdkTracerProvider};
use opentelemetry_sdk::Resource;
use serenade_conf::TelemetryConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Bounds how long an unreachable collector can stall an export
const EXPORT_TIMEOUT: Duration = Duration::from_secs(5);

/// Keeps exporters alive; call `shutdown` before exit to flush.
#[derive(Default)]
pub struct TelemetryGuard {
    tracer_provider: Option<SdkTracerProvider>,
    logger_provider: Option<SdkLoggerProvider>,
}

impl TelemetryGuard {
    pub fn shutdown(self) {
        if let Some(provider) = self.tracer_provider {
            if let Err(e) = provider.shutdown() {
                eprintln!("trace exporter shutdown failed: {e}");
            }
        }
        if let Some(provider) = self.logger_provider {
            if let Err(e) = provider.shutdown() {
                eprintln!("log exporter shutdown failed: {e}");
            }
        }
    }
}

struct OtlpProviders {
    tracer: SdkTracerProvider,
    logger: SdkLoggerProvider,
}

fn otlp_providers(otlp_endpoint: &str) -> Result<OtlpProviders> {
    let resource = Resource::builder_empty()
        .with_service_name("serenade")
        .with_attributes(vec![KeyValue::new("service.version", env!("CARGO_PKG_VERSION"))])
        .build();

    let endpoint = if otlp_endpoint.contains("://") {
        otlp_endpoint.to_string()
    } else {
        format!("http://{}", otlp_endpoint)
    };

    let span_exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint.clone())
        .with_timeout(EXPORT_TIMEOUT)
        .build()
        .context("Failed to create OTLP span exporter")?;

    let tracer = SdkTracerProvider::builder()
        .with_span_processor(
            opentelemetry_sdk::trace::BatchSpanProcessor::builder(span_exporter).build(),
        )
        .with_sampler(Sampler::AlwaysOn)
        .with_id_generator(RandomIdGenerator::default())
        .with_resource(resource.clone())
        .build();

    let log_exporter = opentelemetry_otlp::LogExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .with_timeout(EXPORT_TIMEOUT)
        .build()
        .context("Failed to create OTLP log exporter")?;

    let logger = SdkLoggerProvider::builder()
        .with_log_processor(opentelemetry_sdk::logs::BatchLogProcessor::builder(log_exporter).build())
        .with_resource(resource)
        .build();

    Ok(OtlpProviders { tracer, logger })
}

/// Install the global subscriber. Call once, inside the tokio runtime.
pub fn init(config: &TelemetryConfig) -> Result<TelemetryGuard> {
    let env_filter = EnvFilter::try_new(&config.log_level)
        .with_context(|| format!("Invalid log filter: {}", config.log_level))?;

    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let Some(endpoint) = config.otlp_endpoint.as_deref() else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .context("Failed to install tracing subscriber")?;
        return Ok(TelemetryGuard::default());
    };

    let providers = otlp_providers(endpoint)?;
    let tracer = providers.tracer.tracer("serenade");
    global::set_tracer_provider(providers.tracer.clone());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(tracing_opentelemetry::layer().with_tracer(tracer))
        .with(opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge::new(
            &providers.logger,
        ))
        .try_init()
        .context("Failed to install tracing subscriber")?;

    tracing::info!("exporting traces and logs to {}", endpoint);

    Ok(TelemetryGuard {
        tracer_provider: Some(providers.tracer),
        logger_provider: Some(providers.logger),
    })
}

