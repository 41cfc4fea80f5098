// Metrics module for the topology scheduler daemon.
// Provides Prometheus metrics plus health/ready/metrics HTTP endpoints.

use prometheus::{register_int_counter, Encoder, IntCounter, TextEncoder};
use warp::{Filter, Reply};

lazy_static::lazy_static! {
    static ref TICKS_TOTAL: IntCounter = register_int_counter!(
        "topology_scheduler_ticks_total",
        "Total number of control loop ticks executed"
    ).unwrap();

    static ref TICK_ERRORS_TOTAL: IntCounter = register_int_counter!(
        "topology_scheduler_tick_errors_total",
        "Total number of ticks that failed with an API error"
    ).unwrap();

    static ref JOBS_SEEN_TOTAL: IntCounter = register_int_counter!(
        "topology_scheduler_jobs_seen_total",
        "Total number of gated jobs considered for scheduling"
    ).unwrap();

    static ref JOBS_SCHEDULED_TOTAL: IntCounter = register_int_counter!(
        "topology_scheduler_jobs_scheduled_total",
        "Total number of jobs for which a feasible assignment was found"
    ).unwrap();

    static ref JOBS_SKIPPED_TOTAL: IntCounter = register_int_counter!(
        "topology_scheduler_jobs_skipped_total",
        "Total number of jobs skipped because no feasible assignment was found"
    ).unwrap();

    static ref PODS_COMMITTED_TOTAL: IntCounter = register_int_counter!(
        "topology_scheduler_pods_committed_total",
        "Total number of pods successfully pinned to a node"
    ).unwrap();
}

/// Handles to the process-wide counters, grouped so the control loop can
/// hold a single `Arc<Metrics>` instead of reaching into statics directly.
pub struct Metrics {
    pub ticks_total: &'static IntCounter,
    pub tick_errors_total: &'static IntCounter,
    pub jobs_seen_total: &'static IntCounter,
    pub jobs_scheduled_total: &'static IntCounter,
    pub jobs_skipped_total: &'static IntCounter,
    pub pods_committed_total: &'static IntCounter,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            ticks_total: &TICKS_TOTAL,
            tick_errors_total: &TICK_ERRORS_TOTAL,
            jobs_seen_total: &JOBS_SEEN_TOTAL,
            jobs_scheduled_total: &JOBS_SCHEDULED_TOTAL,
            jobs_skipped_total: &JOBS_SKIPPED_TOTAL,
            pods_committed_total: &PODS_COMMITTED_TOTAL,
        }
    }
}

/// Create metrics endpoint for Prometheus scraping
pub fn metrics_handler() -> impl Filter<Extract = impl Reply, Error = warp::Rejection> + Clone {
    warp::path("metrics")
        .and(warp::get())
        .map(|| {
            let encoder = TextEncoder::new();
            let metric_families = prometheus::gather();
            let mut buffer = Vec::new();
            encoder.encode(&metric_families, &mut buffer).unwrap();
            String::from_utf8(buffer).unwrap()
        })
        .map(|metrics: String| {
            warp::reply::with_header(
                metrics,
                "content-type",
                "text/plain; version=0.0.4; charset=utf-8",
            )
        })
}

/// Liveness endpoint: the process is up and serving requests.
pub fn health_handler() -> impl Filter<Extract = impl Reply, Error = warp::Rejection> + Clone {
    warp::path("healthz").and(warp::get()).map(|| {
        warp::reply::json(&serde_json::json!({
            "status": "healthy",
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "version": env!("CARGO_PKG_VERSION")
        }))
    })
}

/// Readiness endpoint. The control loop runs independently of this HTTP
/// server, so readiness here just confirms the process finished booting;
/// it does not probe the Kubernetes API directly.
pub fn ready_handler() -> impl Filter<Extract = impl Reply, Error = warp::Rejection> + Clone {
    warp::path("readyz").and(warp::get()).map(|| {
        warp::reply::json(&serde_json::json!({
            "status": "ready",
            "timestamp": chrono::Utc::now().to_rfc3339()
        }))
    })
}
