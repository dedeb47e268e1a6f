//! Logging, tracing and metrics set-up.
//!
//! Console logging through `tracing-subscriber` is always on. When any
//! `OTEL_EXPORTER_OTLP_*` variable is present, spans and metrics are also exported
//! over OTLP, either `http/protobuf` (the default) or `grpc`.

use axum::http::{Request, Response, StatusCode};
use opentelemetry::trace::{Status, TracerProvider};
use opentelemetry::{KeyValue, Value, global};
use opentelemetry_otlp::ExporterBuildError;
use opentelemetry_sdk::{
    Resource,
    metrics::{MeterProviderBuilder, PeriodicReader, SdkMeterProvider, Temporality},
    trace::{RandomIdGenerator, Sampler, SdkTracerProvider},
};
use opentelemetry_semantic_conventions::{
    SCHEMA_URL,
    attribute::{DEPLOYMENT_ENVIRONMENT_NAME, SERVICE_VERSION},
};
use std::env;
use std::time::Duration;
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::trace::{DefaultOnRequest, MakeSpan, OnResponse, TraceLayer};
use tracing::Span;
use tracing_opentelemetry::{MetricsLayer, OpenTelemetryLayer, OpenTelemetrySpanExt};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::handlers::X_PAYMENT;

const DEFAULT_LOG_FILTER: &str = "info";
const METRICS_EXPORT_INTERVAL: Duration = Duration::from_secs(30);

/// Transport for OTLP export.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TelemetryProtocol {
    HTTP,
    GRPC,
}

impl TelemetryProtocol {
    /// `None` unless at least one `OTEL_EXPORTER_OTLP_*` variable is set.
    fn from_env() -> Option<Self> {
        let is_enabled = ["ENDPOINT", "HEADERS", "PROTOCOL"]
            .iter()
            .any(|suffix| env::var(format!("OTEL_EXPORTER_OTLP_{suffix}")).is_ok());
        is_enabled.then(|| Self::parse(env::var("OTEL_EXPORTER_OTLP_PROTOCOL").ok().as_deref()))
    }

    /// Unknown values fall back to HTTP.
    fn parse(protocol: Option<&str>) -> Self {
        match protocol.map(str::trim) {
            Some("grpc") => TelemetryProtocol::GRPC,
            _ => TelemetryProtocol::HTTP,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("failed to build OTLP exporter: {0}")]
    Exporter(#[from] ExporterBuildError),
}

/// Identity of this service as reported in telemetry resources.
///
/// Each value can be overridden at run time through `OTEL_SERVICE_NAME`,
/// `OTEL_SERVICE_VERSION` and `OTEL_SERVICE_DEPLOYMENT` respectively.
#[derive(Clone, Debug, Default)]
pub struct Telemetry {
    pub name: Option<Value>,
    pub version: Option<Value>,
    pub deployment: Option<Value>,
}

impl Telemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(&self, name: impl Into<Value>) -> Self {
        let mut this = self.clone();
        this.name = Some(name.into());
        this
    }

    pub fn with_version(&self, version: impl Into<Value>) -> Self {
        let mut this = self.clone();
        this.version = Some(version.into());
        this
    }

    pub fn name(&self) -> Option<Value> {
        env_value("OTEL_SERVICE_NAME").or_else(|| self.name.clone())
    }

    pub fn version(&self) -> Option<Value> {
        env_value("OTEL_SERVICE_VERSION").or_else(|| self.version.clone())
    }

    pub fn deployment(&self) -> Option<Value> {
        env_value("OTEL_SERVICE_DEPLOYMENT").or_else(|| self.deployment.clone())
    }

    /// Resource attached to every exported span and metric.
    pub fn resource(&self) -> Resource {
        let mut builder = Resource::builder();
        if let Some(name) = self.name() {
            builder = builder.with_service_name(name)
        }
        let attributes: Vec<KeyValue> = [
            self.version().map(|v| KeyValue::new(SERVICE_VERSION, v)),
            self.deployment()
                .map(|d| KeyValue::new(DEPLOYMENT_ENVIRONMENT_NAME, d)),
        ]
        .into_iter()
        .flatten()
        .collect();
        if !attributes.is_empty() {
            builder = builder.with_schema_url(attributes, SCHEMA_URL);
        }
        builder.build()
    }

    fn init_tracer_provider(
        &self,
        protocol: TelemetryProtocol,
    ) -> Result<SdkTracerProvider, TelemetryError> {
        let exporter = opentelemetry_otlp::SpanExporter::builder();
        let exporter = match protocol {
            TelemetryProtocol::HTTP => exporter.with_http().build()?,
            TelemetryProtocol::GRPC => exporter.with_tonic().build()?,
        };
        Ok(SdkTracerProvider::builder()
            .with_sampler(Sampler::ParentBased(Box::new(Sampler::AlwaysOn)))
            .with_id_generator(RandomIdGenerator::default())
            .with_resource(self.resource())
            .with_batch_exporter(exporter)
            .build())
    }

    fn init_meter_provider(
        &self,
        protocol: TelemetryProtocol,
    ) -> Result<SdkMeterProvider, TelemetryError> {
        let exporter = opentelemetry_otlp::MetricExporter::builder();
        let exporter = match protocol {
            TelemetryProtocol::HTTP => exporter
                .with_http()
                .with_temporality(Temporality::default())
                .build()?,
            TelemetryProtocol::GRPC => exporter
                .with_tonic()
                .with_temporality(Temporality::default())
                .build()?,
        };
        let reader = PeriodicReader::builder(exporter)
            .with_interval(METRICS_EXPORT_INTERVAL)
            .build();

        let mut builder = MeterProviderBuilder::default()
            .with_resource(self.resource())
            .with_reader(reader);
        // Local inspection of what is being exported.
        if env::var("OTEL_METRICS_STDOUT").is_ok_and(|v| v == "true") {
            builder = builder.with_reader(
                PeriodicReader::builder(opentelemetry_stdout::MetricExporter::default()).build(),
            );
        }
        let meter_provider = builder.build();
        global::set_meter_provider(meter_provider.clone());
        Ok(meter_provider)
    }

    /// Installs the global subscriber.
    ///
    /// When OTLP export is configured but an exporter cannot be built, logging still
    /// goes to the console and the error is returned alongside.
    pub fn register(&self) -> (TelemetryProviders, Option<TelemetryError>) {
        let Some(protocol) = TelemetryProtocol::from_env() else {
            register_console();
            tracing::info!("OpenTelemetry is not enabled");
            return (TelemetryProviders::none(), None);
        };

        let providers = self
            .init_tracer_provider(protocol)
            .and_then(|tracer| Ok((tracer, self.init_meter_provider(protocol)?)));
        let (tracer_provider, meter_provider) = match providers {
            Ok(providers) => providers,
            Err(e) => {
                register_console();
                return (TelemetryProviders::none(), Some(e));
            }
        };

        let tracer = tracer_provider.tracer(env!("CARGO_PKG_NAME"));
        tracing_subscriber::registry()
            // A global level filter keeps the exporter's own network stack from
            // re-entering the OpenTelemetry layer while it exports.
            .with(tracing_subscriber::filter::LevelFilter::INFO)
            .with(tracing_subscriber::fmt::layer())
            .with(MetricsLayer::new(meter_provider.clone()))
            .with(OpenTelemetryLayer::new(tracer))
            .init();
        tracing::info!(?protocol, "OpenTelemetry export enabled");

        (
            TelemetryProviders {
                tracer_provider: Some(tracer_provider),
                meter_provider: Some(meter_provider),
            },
            None,
        )
    }
}

fn env_value(key: &str) -> Option<Value> {
    env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(Value::from)
}

fn register_console() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Flushes and shuts down the OpenTelemetry providers on drop.
pub struct TelemetryProviders {
    pub tracer_provider: Option<SdkTracerProvider>,
    pub meter_provider: Option<SdkMeterProvider>,
}

impl TelemetryProviders {
    fn none() -> Self {
        Self {
            tracer_provider: None,
            meter_provider: None,
        }
    }

    /// Request spans for the HTTP router.
    pub fn http_tracing(
        &self,
    ) -> TraceLayer<
        SharedClassifier<ServerErrorsAsFailures>,
        GateHttpMakeSpan,
        DefaultOnRequest,
        GateHttpOnResponse,
    > {
        TraceLayer::new_for_http()
            .make_span_with(GateHttpMakeSpan)
            .on_response(GateHttpOnResponse)
    }
}

impl Drop for TelemetryProviders {
    fn drop(&mut self) {
        if let Some(tracer_provider) = self.tracer_provider.as_ref() {
            if let Err(err) = tracer_provider.shutdown() {
                eprintln!("{err:?}");
            }
        }
        if let Some(meter_provider) = self.meter_provider.as_ref() {
            if let Err(err) = meter_provider.shutdown() {
                eprintln!("{err:?}");
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct GateHttpMakeSpan;

impl<A> MakeSpan<A> for GateHttpMakeSpan {
    fn make_span(&mut self, request: &Request<A>) -> Span {
        tracing::info_span!(
            "http_request",
            otel.kind = "server",
            otel.name = %format!("{} {}", request.method(), request.uri().path()),
            method = %request.method(),
            uri = %request.uri(),
            version = ?request.version(),
            payment_proof = request.headers().contains_key(X_PAYMENT),
            status = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
            http.status_code = tracing::field::Empty,
        )
    }
}

#[derive(Clone, Debug)]
pub struct GateHttpOnResponse;

impl<A> OnResponse<A> for GateHttpOnResponse {
    fn on_response(self, response: &Response<A>, latency: Duration, span: &Span) {
        let status = response.status();
        span.record("status", tracing::field::display(status));
        span.record("latency_ms", latency.as_millis() as u64);
        span.record("http.status_code", status.as_u16());
        span.set_status(span_status(status));

        tracing::info!(
            status = status.as_u16(),
            elapsed_ms = latency.as_millis() as u64,
            "Request finished"
        );
    }
}

/// 402 challenges and 404 "not finalized yet" answers are part of the protocol, not failures.
fn span_status(status: StatusCode) -> Status {
    if status.is_success() {
        Status::Ok
    } else if status == StatusCode::PAYMENT_REQUIRED || status == StatusCode::NOT_FOUND {
        Status::Unset
    } else {
        Status::error(status.canonical_reason().unwrap_or("unknown").to_string())
    }
}
