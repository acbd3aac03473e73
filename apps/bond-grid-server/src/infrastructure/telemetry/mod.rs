//! OpenTelemetry Tracing Integration
//!
//! Structured logging through `tracing-subscriber`, with an optional OTLP
//! span exporter.
//!
//! # Environment Variables
//!
//! - `OTEL_ENABLED`: Set to "false" to disable span export (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: http://localhost:4317)
//! - `OTEL_SERVICE_NAME`: Service name for traces (default: bond-grid-server)
//! - `RUST_LOG`: Extra filter directives
//!
//! # Usage
//!
//! ```ignore
//! use bond_grid_server::infrastructure::telemetry;
//!
//! // Keep the guard alive for the lifetime of the process.
//! let _guard = telemetry::init()?;
//! ```

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const DEFAULT_SERVICE_NAME: &str = "bond-grid-server";

const DEFAULT_OTLP_ENDPOINT: &str = "http://localhost:4317";

const DEFAULT_DIRECTIVES: [&str; 4] = ["bond_grid_server=info", "tower_http=info", "h2=warn", "hyper=warn"];

/// Telemetry setup failure.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// A filter directive did not parse.
    #[error("Invalid log directive: {0}")]
    Directive(#[from] ParseError),

    /// The OTLP exporter could not be built.
    #[error("Failed to create OTLP exporter: {0}")]
    Exporter(#[from] opentelemetry_otlp::ExporterBuildError),

    /// A global subscriber is already installed.
    #[error("Failed to install tracing subscriber: {0}")]
    Install(#[from] tracing_subscriber::util::TryInitError),
}

/// Shuts down the tracer provider when dropped.
pub struct TelemetryGuard {
    tracer_provider: Option<SdkTracerProvider>,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.tracer_provider.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("Failed to shutdown OpenTelemetry tracer provider: {e}");
        }
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Whether span export is enabled.
    pub enabled: bool,
    /// OTLP exporter endpoint.
    pub otlp_endpoint: String,
    /// Service name for traces.
    pub service_name: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            otlp_endpoint: DEFAULT_OTLP_ENDPOINT.to_string(),
            service_name: DEFAULT_SERVICE_NAME.to_string(),
        }
    }
}

impl TelemetryConfig {
    /// Read configuration from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        let enabled = std::env::var("OTEL_ENABLED")
            .map(|v| v.to_lowercase() != "false")
            .unwrap_or(true);

        let otlp_endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
            .unwrap_or_else(|_| DEFAULT_OTLP_ENDPOINT.to_string());

        let service_name =
            std::env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| DEFAULT_SERVICE_NAME.to_string());

        Self {
            enabled,
            otlp_endpoint,
            service_name,
        }
    }
}

/// Initialise telemetry from the environment.
///
/// # Errors
///
/// See [`init_with_config`].
pub fn init() -> Result<TelemetryGuard, TelemetryError> {
    init_with_config(TelemetryConfig::from_env())
}

/// Initialise telemetry.
///
/// # Errors
///
/// Returns `TelemetryError` if the exporter cannot be built or a global
/// subscriber is already installed.
pub fn init_with_config(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let env_filter = env_filter()?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if !config.enabled {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()?;

        return Ok(TelemetryGuard {
            tracer_provider: None,
        });
    }

    let otlp_exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&config.otlp_endpoint)
        .build()?;

    let tracer_provider = SdkTracerProvider::builder()
        .with_batch_exporter(otlp_exporter)
        .with_resource(
            opentelemetry_sdk::Resource::builder()
                .with_service_name(config.service_name.clone())
                .build(),
        )
        .build();

    let tracer = tracer_provider.tracer(config.service_name);
    let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(otel_layer)
        .try_init()?;

    Ok(TelemetryGuard {
        tracer_provider: Some(tracer_provider),
    })
}

fn env_filter() -> Result<EnvFilter, ParseError> {
    DEFAULT_DIRECTIVES
        .iter()
        .try_fold(EnvFilter::from_default_env(), |filter, directive| {
            Ok(filter.add_directive(directive.parse()?))
        })
}

// =============================================================================
// Tests
// =============================================================================
