//! Tracing subscriber initialization with structured logging and optional
//! OpenTelemetry trace export.
//!
//! # Usage
//!
//! ```no_run
//! use chorus_observe::tracing_setup::{TracingOptions, init_tracing};
//!
//! init_tracing(&TracingOptions::from_verbosity(1, false)).unwrap();
//! ```

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use std::sync::OnceLock;

/// Stores the OTel tracer provider so it can be shut down cleanly on exit.
static TRACER_PROVIDER: OnceLock<SdkTracerProvider> = OnceLock::new();

/// How the global subscriber should be built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingOptions {
    /// Filter used when `RUST_LOG` is unset.
    pub default_filter: String,
    /// Emit one JSON object per event instead of human-readable lines.
    pub json: bool,
    /// Bridge spans to OpenTelemetry with a stdout exporter.
    pub otel: bool,
}

impl TracingOptions {
    /// Map `-v`/`-q` counts to a default filter.
    pub fn from_verbosity(verbose: u8, quiet: bool) -> Self {
        let filter = match verbose {
            0 if quiet => "error",
            0 => "info",
            1 => "info,chorus=debug,chorus_core=debug,chorus_infra=debug",
            _ => "trace",
        };
        Self {
            default_filter: filter.to_string(),
            json: false,
            otel: false,
        }
    }
}

/// Initialize the global tracing subscriber.
///
/// - Always installs a `fmt` layer (plain or JSON) with span close timing.
/// - When `otel` is set, additionally bridges spans to OpenTelemetry using a
///   stdout exporter.
/// - `RUST_LOG` takes precedence over `default_filter`.
///
/// # Errors
///
/// Returns an error if the global subscriber has already been set or the
/// filter cannot be parsed.
pub fn init_tracing(options: &TracingOptions) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&options.default_filter)?,
    };

    let json_layer = options.json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_events(FmtSpan::CLOSE)
    });
    let text_layer = (!options.json).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_span_events(FmtSpan::CLOSE)
    });

    let otel_layer = if options.otel {
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(opentelemetry_stdout::SpanExporter::default())
            .build();
        let tracer = provider.tracer("chorus");

        // Store the provider for shutdown and register it globally.
        let _ = TRACER_PROVIDER.set(provider.clone());
        opentelemetry::global::set_tracer_provider(provider);

        Some(tracing_opentelemetry::layer().with_tracer(tracer))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .with(otel_layer)
        .try_init()?;

    Ok(())
}

/// Flush pending traces and shut down the OpenTelemetry tracer provider.
///
/// No-op when OTel was not enabled.
pub fn shutdown_tracing() {
    if let Some(provider) = TRACER_PROVIDER.get() {
        if let Err(e) = provider.shutdown() {
            eprintln!("Warning: OTel tracer provider shutdown error: {e}");
        }
    }
}
