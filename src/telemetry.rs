use opentelemetry::global;
use opentelemetry::metrics::{Counter, Histogram, Meter, MeterProvider};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::trace::TracerProvider;
use opentelemetry_sdk::{runtime, Resource};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const SERVICE_NAME: &str = "logrelay";

static METRICS: OnceLock<RelayMetrics> = OnceLock::new();
static METER_PROVIDER: OnceLock<SdkMeterProvider> = OnceLock::new();

/// Metrics for the log relay
pub struct RelayMetrics {
    // HTTP front door
    pub requests_total: Counter<u64>,
    pub requests_errors: Counter<u64>,

    // Upstream calls
    pub upstream_errors: Counter<u64>,
    pub fetch_duration_seconds: Histogram<f64>,

    // Mail credentials
    pub token_refreshes: Counter<u64>,
    pub token_refresh_failures: Counter<u64>,
}

impl RelayMetrics {
    fn new(meter: &Meter) -> Self {
        Self {
            requests_total: meter
                .u64_counter("logrelay_requests_total")
                .with_description("Total number of log view requests")
                .build(),
            requests_errors: meter
                .u64_counter("logrelay_requests_errors_total")
                .with_description("Total number of log view requests answered with an error")
                .build(),
            upstream_errors: meter
                .u64_counter("logrelay_upstream_errors_total")
                .with_description("Total number of failed upstream API calls")
                .build(),
            fetch_duration_seconds: meter
                .f64_histogram("logrelay_fetch_duration_seconds")
                .with_description("Time spent fetching logs from an upstream provider")
                .build(),
            token_refreshes: meter
                .u64_counter("logrelay_token_refreshes_total")
                .with_description("Total number of successful mail token refreshes")
                .build(),
            token_refresh_failures: meter
                .u64_counter("logrelay_token_refresh_failures_total")
                .with_description("Total number of failed mail token refreshes")
                .build(),
        }
    }

    /// Record one front door request for `source` ("mail" or "sms")
    pub fn record_request(&self, source: &'static str, duration: Duration, ok: bool) {
        let attrs = [KeyValue::new("source", source)];
        self.requests_total.add(1, &attrs);
        self.fetch_duration_seconds
            .record(duration.as_secs_f64(), &attrs);
        if !ok {
            self.requests_errors.add(1, &attrs);
        }
    }
}

pub fn get_metrics() -> Option<&'static RelayMetrics> {
    METRICS.get()
}

pub struct TelemetryConfig {
    pub otlp_endpoint: Option<String>,
    pub log_filter: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            otlp_endpoint: None,
            log_filter: "info".to_string(),
        }
    }
}

impl From<&crate::config::TelemetryConfig> for TelemetryConfig {
    fn from(config: &crate::config::TelemetryConfig) -> Self {
        Self {
            otlp_endpoint: config.otlp_endpoint.clone(),
            log_filter: config
                .log_filter
                .clone()
                .unwrap_or_else(|| "info".to_string()),
        }
    }
}

fn create_resource() -> Resource {
    Resource::new(vec![
        KeyValue::new(
            opentelemetry_semantic_conventions::attribute::SERVICE_NAME,
            SERVICE_NAME,
        ),
        KeyValue::new(
            opentelemetry_semantic_conventions::attribute::SERVICE_VERSION,
            env!("CARGO_PKG_VERSION"),
        ),
    ])
}

fn init_tracer_provider(
    endpoint: &str,
) -> Result<TracerProvider, opentelemetry::trace::TraceError> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .with_timeout(Duration::from_secs(3))
        .build()?;

    let provider = TracerProvider::builder()
        .with_resource(create_resource())
        .with_batch_exporter(exporter, runtime::Tokio)
        .build();

    Ok(provider)
}

fn init_meter_provider(
    endpoint: &str,
) -> Result<SdkMeterProvider, opentelemetry_sdk::metrics::MetricError> {
    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .with_timeout(Duration::from_secs(3))
        .build()?;

    let reader = PeriodicReader::builder(exporter, runtime::Tokio)
        .with_interval(Duration::from_secs(10))
        .build();

    let provider = SdkMeterProvider::builder()
        .with_resource(create_resource())
        .with_reader(reader)
        .build();

    Ok(provider)
}

/// Install the global subscriber. Must be called from within the tokio
/// runtime when an OTLP endpoint is configured.
pub fn init_telemetry(config: TelemetryConfig) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::new(&config.log_filter);

    match &config.otlp_endpoint {
        Some(endpoint) => {
            let tracer_provider = init_tracer_provider(endpoint)
                .map_err(|e| format!("Failed to init tracer: {}", e))?;
            let meter_provider = init_meter_provider(endpoint)
                .map_err(|e| format!("Failed to init meter: {}", e))?;

            global::set_tracer_provider(tracer_provider.clone());
            global::set_meter_provider(meter_provider.clone());
            let _ = METER_PROVIDER.set(meter_provider.clone());

            let tracer = tracer_provider.tracer(SERVICE_NAME);
            let meter = meter_provider.meter(SERVICE_NAME);
            let _ = METRICS.set(RelayMetrics::new(&meter));

            let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .with(otel_layer)
                .try_init()?;

            info!(
                endpoint = %endpoint,
                "OpenTelemetry initialized with OTLP export"
            );
        }
        None => {
            // Metrics are still recorded so instrumentation paths stay live
            let meter_provider = SdkMeterProvider::builder()
                .with_resource(create_resource())
                .build();

            global::set_meter_provider(meter_provider.clone());
            let _ = METER_PROVIDER.set(meter_provider.clone());

            let meter = meter_provider.meter(SERVICE_NAME);
            let _ = METRICS.set(RelayMetrics::new(&meter));

            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .try_init()?;

            info!("Telemetry initialized without OTLP export");
        }
    }

    Ok(())
}

/// Flush and stop exporters. The final metric interval is pushed here.
pub fn shutdown_telemetry() {
    if let Some(provider) = METER_PROVIDER.get() {
        shutdown_meter_provider(provider);
    }
    global::shutdown_tracer_provider();
}

fn shutdown_meter_provider(provider: &SdkMeterProvider) -> bool {
    match provider.shutdown() {
        Ok(()) => true,
        Err(e) => {
            warn!("Failed to shut down meter provider: {}", e);
            false
        }
    }
}
