//! Logging setup: a fmt subscriber filtered by `RUST_LOG`, plus optional OTLP trace export.
//!
//! Export is off unless `enable_otel_export: true` is set in the config file. When on, the
//! exporter is configured from the standard environment variables:
//!
//! - `OTEL_EXPORTER_OTLP_ENDPOINT` (default `http://localhost:4318`)
//! - `OTEL_EXPORTER_OTLP_PROTOCOL` (`http/protobuf` or `http/json`)
//! - `OTEL_EXPORTER_OTLP_HEADERS` as comma-separated `key=value` pairs, `%20` decoded to a space
//! - `OTEL_SERVICE_NAME` (default `checkin`)
//!
//! A batch run is short-lived, so [`shutdown_telemetry`] must be called before exit or the last
//! spans are lost.

use opentelemetry::KeyValue;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::{Protocol, WithExportConfig, WithHttpConfig};
use opentelemetry_sdk::trace::SdkTracerProvider;
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Kept so the provider can be flushed on shutdown; tracing-opentelemetry only holds the tracer.
static TRACER_PROVIDER: OnceLock<SdkTracerProvider> = OnceLock::new();

const DEFAULT_SERVICE_NAME: &str = "checkin";
const DEFAULT_ENDPOINT: &str = "http://localhost:4318";

/// Install the global subscriber. Falls back to console-only logging if the exporter cannot be
/// built.
pub fn init_telemetry(enable_otel_export: bool) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if !enable_otel_export {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()?;
        info!("Telemetry initialized (OTLP export disabled)");
        return Ok(());
    }

    let settings = OtlpSettings::from_env();
    match create_otlp_tracer(&settings) {
        Ok(tracer) => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .with(tracing_opentelemetry::layer().with_tracer(tracer))
                .try_init()?;
            info!(
                service_name = %settings.service_name,
                endpoint = %settings.endpoint,
                headers = settings.headers.len(),
                "Telemetry initialized with OTLP export enabled"
            );
        }
        Err(e) => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .try_init()?;
            info!(endpoint = %settings.endpoint, "Telemetry initialized without OTLP export: {}", e);
        }
    }

    Ok(())
}

/// Exporter settings read from the standard `OTEL_*` variables.
struct OtlpSettings {
    service_name: String,
    endpoint: String,
    headers: HashMap<String, String>,
    protocol: Protocol,
}

impl OtlpSettings {
    fn from_env() -> Self {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            service_name: var("OTEL_SERVICE_NAME").unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string()),
            endpoint: var("OTEL_EXPORTER_OTLP_ENDPOINT").unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            headers: var("OTEL_EXPORTER_OTLP_HEADERS")
                .map(|raw| parse_headers(&raw))
                .unwrap_or_default(),
            protocol: protocol_from(var("OTEL_EXPORTER_OTLP_PROTOCOL").as_deref()),
        }
    }
}

/// Parse `OTEL_EXPORTER_OTLP_HEADERS`-style text into a header map.
fn parse_headers(raw: &str) -> HashMap<String, String> {
    raw.replace("%20", " ")
        .split(',')
        .filter_map(|pair| pair.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

fn protocol_from(raw: Option<&str>) -> Protocol {
    match raw {
        Some("http/json") => Protocol::HttpJson,
        _ => Protocol::HttpBinary,
    }
}

fn create_otlp_tracer(settings: &OtlpSettings) -> anyhow::Result<opentelemetry_sdk::trace::Tracer> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(&settings.endpoint)
        .with_protocol(settings.protocol)
        .with_headers(settings.headers.clone())
        .build()?;

    let tracer_provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(
            opentelemetry_sdk::Resource::builder()
                .with_attribute(KeyValue::new("service.name", settings.service_name.clone()))
                .build(),
        )
        .build();

    let tracer = tracer_provider.tracer(settings.service_name.clone());
    let _ = TRACER_PROVIDER.set(tracer_provider);

    Ok(tracer)
}

/// Flush pending spans. A no-op when export was never enabled.
pub fn shutdown_telemetry() {
    if let Some(provider) = TRACER_PROVIDER.get()
        && let Err(e) = provider.shutdown()
    {
        tracing::error!("Failed to shutdown tracer provider: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_headers() {
        let headers = parse_headers("Authorization=Basic%20abc, x-scope = checkin,broken");
        assert_eq!(headers.len(), 2);
        assert_eq!(headers["Authorization"], "Basic abc");
        assert_eq!(headers["x-scope"], "checkin");
    }

    #[test]
    fn test_settings_defaults_and_overrides() {
        let defaults = OtlpSettings::from_vars(|_| None);
        assert_eq!(defaults.service_name, "checkin");
        assert_eq!(defaults.endpoint, "http://localhost:4318");
        assert!(defaults.headers.is_empty());

        let settings = OtlpSettings::from_vars(|name| match name {
            "OTEL_SERVICE_NAME" => Some("nightly-checkin".to_string()),
            "OTEL_EXPORTER_OTLP_HEADERS" => Some("Authorization=Bearer%20t".to_string()),
            "OTEL_EXPORTER_OTLP_PROTOCOL" => Some("http/json".to_string()),
            _ => None,
        });
        assert_eq!(settings.service_name, "nightly-checkin");
        assert_eq!(settings.headers["Authorization"], "Bearer t");
        assert!(matches!(settings.protocol, Protocol::HttpJson));
    }

    #[test]
    fn test_protocol_defaults_to_protobuf() {
        assert!(matches!(protocol_from(None), Protocol::HttpBinary));
        assert!(matches!(protocol_from(Some("grpc")), Protocol::HttpBinary));
        assert!(matches!(protocol_from(Some("http/json")), Protocol::HttpJson));
    }
}
