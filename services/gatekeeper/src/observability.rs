//! Observability wiring for the gateway service.
//!
//! # Purpose
//! Initializes tracing, OpenTelemetry propagation and the Prometheus metrics
//! endpoint, and defines the [`Observer`] port the pipeline, guards and stores
//! report through.
//!
//! # Notes
//! Process-wide initialization is guarded by `OnceLock` to keep startup
//! idempotent in tests. Components never touch the metrics registry directly;
//! they receive an `Arc<dyn Observer>` at construction.
use axum::http::HeaderMap;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use opentelemetry::propagation::Extractor;
use opentelemetry::trace::TracerProvider;
use opentelemetry::{KeyValue, global};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::{SdkTracer, SdkTracerProvider};
use std::net::SocketAddr;
use std::sync::{Mutex, OnceLock};
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

static SUBSCRIBER: OnceLock<()> = OnceLock::new();
static PROPAGATOR: OnceLock<()> = OnceLock::new();
static RECORDER: OnceLock<PrometheusHandle> = OnceLock::new();

/// Record-style sink for security and storage signals.
pub trait Observer: Send + Sync {
    /// `outcome` is `allow` or `reject`; `reason` is a stable snake_case label.
    fn auth_decision(&self, outcome: &'static str, reason: &'static str);
    fn permission_check(&self, guard: &'static str, allowed: bool);
    fn store_operation(&self, op: &'static str, outcome: &'static str, elapsed: Duration);
    fn audit_write_failed(&self);
    fn last_login_update(&self, outcome: &'static str);
}

/// Publishes observations to the process-wide `metrics` recorder.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsObserver;

impl Observer for MetricsObserver {
    fn auth_decision(&self, outcome: &'static str, reason: &'static str) {
        metrics::counter!(
            "gatekeeper_auth_decisions_total",
            "outcome" => outcome,
            "reason" => reason
        )
        .increment(1);
    }

    fn permission_check(&self, guard: &'static str, allowed: bool) {
        metrics::counter!(
            "gatekeeper_permission_checks_total",
            "guard" => guard,
            "allowed" => if allowed { "true" } else { "false" }
        )
        .increment(1);
    }

    fn store_operation(&self, op: &'static str, outcome: &'static str, elapsed: Duration) {
        metrics::counter!(
            "gatekeeper_store_operations_total",
            "op" => op,
            "outcome" => outcome
        )
        .increment(1);
        metrics::histogram!("gatekeeper_store_operation_seconds", "op" => op)
            .record(elapsed.as_secs_f64());
    }

    fn audit_write_failed(&self) {
        metrics::counter!("gatekeeper_audit_write_failures_total").increment(1);
    }

    fn last_login_update(&self, outcome: &'static str) {
        metrics::counter!("gatekeeper_last_login_updates_total", "outcome" => outcome)
            .increment(1);
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl Observer for NoopObserver {
    fn auth_decision(&self, _outcome: &'static str, _reason: &'static str) {}
    fn permission_check(&self, _guard: &'static str, _allowed: bool) {}
    fn store_operation(&self, _op: &'static str, _outcome: &'static str, _elapsed: Duration) {}
    fn audit_write_failed(&self) {}
    fn last_login_update(&self, _outcome: &'static str) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    AuthDecision {
        outcome: &'static str,
        reason: &'static str,
    },
    PermissionCheck {
        guard: &'static str,
        allowed: bool,
    },
    StoreOperation {
        op: &'static str,
        outcome: &'static str,
    },
    AuditWriteFailed,
    LastLoginUpdate {
        outcome: &'static str,
    },
}

/// Keeps every observation in memory so tests can assert on them.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    observations: Mutex<Vec<Observation>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observations(&self) -> Vec<Observation> {
        self.observations
            .lock()
            .map(|items| items.clone())
            .unwrap_or_default()
    }

    pub fn auth_reasons(&self) -> Vec<&'static str> {
        self.observations()
            .into_iter()
            .filter_map(|observation| match observation {
                Observation::AuthDecision { reason, .. } => Some(reason),
                _ => None,
            })
            .collect()
    }

    fn push(&self, observation: Observation) {
        if let Ok(mut items) = self.observations.lock() {
            items.push(observation);
        }
    }
}

impl Observer for RecordingObserver {
    fn auth_decision(&self, outcome: &'static str, reason: &'static str) {
        self.push(Observation::AuthDecision { outcome, reason });
    }

    fn permission_check(&self, guard: &'static str, allowed: bool) {
        self.push(Observation::PermissionCheck { guard, allowed });
    }

    fn store_operation(&self, op: &'static str, outcome: &'static str, _elapsed: Duration) {
        self.push(Observation::StoreOperation { op, outcome });
    }

    fn audit_write_failed(&self) {
        self.push(Observation::AuditWriteFailed);
    }

    fn last_login_update(&self, outcome: &'static str) {
        self.push(Observation::LastLoginUpdate { outcome });
    }
}

/// Install the global subscriber, W3C propagator and Prometheus recorder.
///
/// Safe to call more than once; later calls only return the recorder handle.
///
/// # Errors
/// - The Prometheus recorder cannot be installed (another recorder owns the
///   process).
pub fn init_observability(service_name: &str) -> anyhow::Result<PrometheusHandle> {
    install_propagator();
    SUBSCRIBER.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let otel = otlp_tracer(service_name)
            .map(|tracer| tracing_opentelemetry::layer::<Registry>().with_tracer(tracer));
        let installed = tracing_subscriber::registry()
            .with(otel)
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init();
        if installed.is_err() {
            tracing::debug!("tracing subscriber already installed");
        }
    });
    prometheus_handle()
}

fn install_propagator() {
    PROPAGATOR.get_or_init(|| {
        global::set_text_map_propagator(TraceContextPropagator::new());
    });
}

/// `None` when no OTLP exporter can be built; logs then go to stdout only.
fn otlp_tracer(service_name: &str) -> Option<SdkTracer> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .build()
        .ok()?;
    let resource = Resource::builder_empty()
        .with_attributes(resource_attributes(service_name, |key| std::env::var(key).ok()))
        .build();
    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(resource)
        .build();
    let tracer = provider.tracer(service_name.to_string());
    global::set_tracer_provider(provider);
    Some(tracer)
}

fn resource_attributes(service_name: &str, env: impl Fn(&str) -> Option<String>) -> Vec<KeyValue> {
    let mut attrs = vec![KeyValue::new("service.name", service_name.to_string())];
    if let Some(instance) = env("GATEKEEPER_INSTANCE_ID").or_else(|| env("HOSTNAME")) {
        attrs.push(KeyValue::new("service.instance.id", instance));
    }
    if let Some(environment) = env("GATEKEEPER_ENVIRONMENT") {
        attrs.push(KeyValue::new("deployment.environment", environment));
    }
    attrs
}

/// Parent context for the `http.request` span from inbound W3C headers.
pub fn trace_context_from_headers(headers: &HeaderMap) -> opentelemetry::Context {
    install_propagator();
    global::get_text_map_propagator(|propagator| propagator.extract(&HeaderCarrier(headers)))
}

struct HeaderCarrier<'a>(&'a HeaderMap);

impl Extractor for HeaderCarrier<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key)?.to_str().ok()
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(|name| name.as_str()).collect()
    }
}

fn prometheus_handle() -> anyhow::Result<PrometheusHandle> {
    if let Some(handle) = RECORDER.get() {
        return Ok(handle.clone());
    }
    let handle = PrometheusBuilder::new().install_recorder()?;
    Ok(RECORDER.get_or_init(|| handle).clone())
}

/// Serve `GET /metrics` on its own listener until the task is dropped.
pub async fn serve_metrics(handle: PrometheusHandle, addr: SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "metrics listening");
    serve_metrics_on(handle, listener).await
}

async fn serve_metrics_on(
    handle: PrometheusHandle,
    listener: tokio::net::TcpListener,
) -> std::io::Result<()> {
    let render = move || {
        let handle = handle.clone();
        async move { handle.render() }
    };
    let app = axum::Router::new().route("/metrics", axum::routing::get(render));
    axum::serve(listener, app).await
}
