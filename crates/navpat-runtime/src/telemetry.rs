//! Log and span output for a `navpat` process.
//!
//! Log lines go to stderr, compact by default or one JSON object per line
//! with `NAVPAT_LOG_FORMAT=json`.  `RUST_LOG` filters them (`info` when
//! unset).  Setting `OTEL_EXPORTER_OTLP_ENDPOINT` additionally ships spans
//! to an OTLP/HTTP collector.
//!
//! ```rust,no_run
//! let _tracing = navpat_runtime::init_tracing("navpat");
//! // ... run ...
//! // dropping the guard flushes exported spans
//! ```

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

const ENDPOINT_VAR: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Compact,
        }
    }
}

/// Install the global subscriber.  Call once, before the first log line.
pub fn init_tracing(service_name: &str) -> TracerProviderGuard {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let format = LogFormat::parse(std::env::var("NAVPAT_LOG_FORMAT").ok().as_deref());

    let provider = std::env::var(ENDPOINT_VAR)
        .ok()
        .and_then(|endpoint| otlp_provider(service_name, endpoint));
    let spans = provider
        .as_ref()
        .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer("navpat")));

    let lines = match format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(spans)
        .with(lines)
        .init();

    TracerProviderGuard(provider)
}

/// Flushes and shuts down span export when dropped.
pub struct TracerProviderGuard(Option<SdkTracerProvider>);

impl TracerProviderGuard {
    pub fn exporting(&self) -> bool {
        self.0.is_some()
    }
}

impl Drop for TracerProviderGuard {
    fn drop(&mut self) {
        let Some(provider) = self.0.take() else {
            return;
        };
        // The subscriber may already be gone at this point.
        if let Err(e) = provider.shutdown() {
            eprintln!("navpat: span export shutdown failed: {e}");
        }
    }
}

fn otlp_provider(service_name: &str, endpoint: String) -> Option<SdkTracerProvider> {
    let exporter = match opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
    {
        Ok(exporter) => exporter,
        Err(e) => {
            eprintln!("navpat: span export disabled: {e}");
            return None;
        }
    };

    // Simple exporter: the control loop has no async runtime to batch on.
    let provider = SdkTracerProvider::builder()
        .with_resource(
            Resource::builder()
                .with_service_name(service_name.to_string())
                .build(),
        )
        .with_simple_exporter(exporter)
        .build();
    Some(provider)
}
