//! Log output and optional Langfuse trace export.
//!
//! Spans are always formatted to stdout.  When Langfuse credentials are present,
//! the same spans are also exported over OTLP/HTTP to Langfuse's OpenTelemetry
//! ingestion endpoint; without credentials that layer is simply absent.

use std::collections::HashMap;

use base64::{Engine, engine::general_purpose::STANDARD};
use opentelemetry::trace::TracerProvider;
use opentelemetry_otlp::{Protocol, WithExportConfig, WithHttpConfig};
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};
use tracing::warn;
use tracing_subscriber::{fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt};

use super::{config::Config, types::Res};

const SERVICE_NAME: &str = "slack-agent-bot";

/// Keeps the trace exporter alive; flushes pending spans when dropped.
pub struct TelemetryGuard {
    provider: Option<SdkTracerProvider>,
}

impl TelemetryGuard {
    /// Whether spans are exported to Langfuse.
    pub fn is_exporting(&self) -> bool {
        self.provider.is_some()
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.provider.take()
            && let Err(err) = provider.shutdown()
        {
            eprintln!("Failed to flush traces: {err}");
        }
    }
}

/// Map the `-v` count to a level.
pub fn level_from_verbosity(verbose: u8) -> tracing::Level {
    match verbose {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    }
}

/// The Langfuse OTLP traces endpoint for a given host.
pub fn langfuse_otlp_endpoint(host: &str) -> String {
    format!("{}/api/public/otel/v1/traces", host.trim_end_matches('/'))
}

/// The `Authorization` header value for Langfuse's public API.
pub fn langfuse_basic_auth(public_key: &str, secret_key: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{public_key}:{secret_key}")))
}

/// Build the Langfuse tracer provider, when credentials are configured.
fn build_langfuse_provider(config: &Config) -> Res<Option<SdkTracerProvider>> {
    let Some((public_key, secret_key)) = config.langfuse_credentials() else {
        return Ok(None);
    };

    let headers = HashMap::from([("Authorization".to_string(), langfuse_basic_auth(public_key, secret_key))]);

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_protocol(Protocol::HttpBinary)
        .with_endpoint(langfuse_otlp_endpoint(&config.langfuse_host))
        .with_headers(headers)
        .build()?;

    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(Resource::builder().with_service_name(SERVICE_NAME).build())
        .build();

    Ok(Some(provider))
}

/// Install the global subscriber.
pub fn init(config: &Config, verbose: u8) -> Res<TelemetryGuard> {
    // Construct the level filter.

    let level_filter = tracing_subscriber::filter::LevelFilter::from_level(level_from_verbosity(verbose));

    // Prepare the log layer.

    let stdout = tracing_subscriber::fmt::layer()
        .without_time()
        .with_ansi(true)
        .with_level(true)
        .with_file(false)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE);

    // Prepare the otlp layer.

    let provider = build_langfuse_provider(config)?;
    let otel = provider.as_ref().map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer(SERVICE_NAME)));

    tracing_subscriber::registry().with(otel).with(level_filter).with(stdout).init();

    if provider.is_none() {
        warn!("[langfuse] credentials missing; traces are not exported.");
    }

    Ok(TelemetryGuard { provider })
}

// Tests.
