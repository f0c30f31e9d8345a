//! Prometheus metrics for purge runs.
//!
//! Exposes:
//! - `discord_purge_searches_total` (counter)
//! - `discord_purge_messages_total` (counter with outcome)
//! - `discord_purge_rate_limited_total` (counter with endpoint)
//! - `discord_purge_job_duration_seconds` (histogram with phase)
//! - `discord_purge_jobs_inflight` (gauge)
//! - process metrics via `process` collector

use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use once_cell::sync::Lazy;
use prometheus::process_collector::ProcessCollector;
use prometheus::{
    default_registry, register_histogram_vec, register_int_counter, register_int_counter_vec,
    register_int_gauge, Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, TextEncoder,
};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::state::Phase;

static PROCESS_COLLECTOR: Lazy<()> = Lazy::new(|| {
    if let Err(err) = default_registry().register(Box::new(ProcessCollector::for_self())) {
        warn!("Failed to register process collector: {}", err);
    }
});

static SEARCHES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "discord_purge_searches_total",
        "Search requests issued"
    )
    .expect("failed to register search counter")
});

static MESSAGES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "discord_purge_messages_total",
        "Messages handled by outcome",
        &["outcome"]
    )
    .expect("failed to register message counter")
});

static RATE_LIMITED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "discord_purge_rate_limited_total",
        "Throttling responses by endpoint",
        &["endpoint"]
    )
    .expect("failed to register rate limit counter")
});

static JOB_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    // Exponential buckets from 1s up to ~4.5 hours.
    let buckets =
        prometheus::exponential_buckets(1.0, 2.0, 15).expect("failed to create histogram buckets");
    register_histogram_vec!(
        "discord_purge_job_duration_seconds",
        "Job duration in seconds by terminal phase",
        &["phase"],
        buckets
    )
    .expect("failed to register job duration histogram")
});

static JOBS_INFLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("discord_purge_jobs_inflight", "Jobs currently running")
        .expect("failed to register inflight gauge")
});

/// Outcome label for [`record_message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    Deleted,
    Failed,
    Skipped,
}

impl MessageOutcome {
    fn label(self) -> &'static str {
        match self {
            MessageOutcome::Deleted => "deleted",
            MessageOutcome::Failed => "failed",
            MessageOutcome::Skipped => "skipped",
        }
    }
}

/// Ensure collectors are registered.
fn init_collectors() {
    Lazy::force(&PROCESS_COLLECTOR);
    Lazy::force(&SEARCHES_TOTAL);
    Lazy::force(&MESSAGES_TOTAL);
    Lazy::force(&RATE_LIMITED_TOTAL);
    Lazy::force(&JOB_DURATION);
    Lazy::force(&JOBS_INFLIGHT);
}

pub fn record_search() {
    SEARCHES_TOTAL.inc();
}

pub fn record_message(outcome: MessageOutcome) {
    MESSAGES_TOTAL.with_label_values(&[outcome.label()]).inc();
}

pub fn record_rate_limit(endpoint: &'static str) {
    RATE_LIMITED_TOTAL.with_label_values(&[endpoint]).inc();
}

/// Increment the inflight gauge for a job.
pub fn record_job_start() {
    JOBS_INFLIGHT.inc();
}

/// Record job completion with duration and terminal phase.
pub fn record_job_result(duration: Duration, phase: Phase) {
    JOBS_INFLIGHT.dec();
    let label = phase.to_string();
    JOB_DURATION
        .with_label_values(&[label.as_str()])
        .observe(duration.as_secs_f64());
}

async fn metrics_response() -> Result<Response<Full<Bytes>>, Infallible> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", err);
        return Ok(status_response(StatusCode::INTERNAL_SERVER_ERROR, "encode error"));
    }

    let mut response = Response::new(Full::from(buffer));
    if let Ok(value) = hyper::header::HeaderValue::from_str(encoder.format_type()) {
        response
            .headers_mut()
            .insert(hyper::header::CONTENT_TYPE, value);
    }
    Ok(response)
}

fn status_response(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::from(body));
    *response.status_mut() = status;
    response
}

async fn handle_request(req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    match req.uri().path() {
        "/metrics" => metrics_response().await,
        _ => Ok(status_response(StatusCode::NOT_FOUND, "")),
    }
}

async fn serve(addr: SocketAddr) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Prometheus metrics endpoint started");

    loop {
        let (stream, peer) = listener.accept().await?;
        let service = service_fn(handle_request);
        let io = TokioIo::new(stream);

        tokio::spawn(async move {
            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                warn!(?peer, "Metrics connection error: {}", err);
            }
        });
    }
}

/// Spawn the metrics HTTP endpoint on the given address.
pub fn spawn_metrics_server(addr: SocketAddr) {
    init_collectors();
    tokio::spawn(async move {
        if let Err(err) = serve(addr).await {
            error!(%addr, "Metrics server failed: {}", err);
        }
    });
}
