//! Command-line arguments.

use clap::Parser;

/// Topology-aware gang scheduler daemon: watches for pods gated behind a
/// configured scheduling-gate prefix and pins each job's pods to a set of
/// topologically adjacent nodes.
#[derive(Debug, Parser)]
#[command(name = "topology-scheduler-daemon", version, about)]
pub struct Args {
    /// Prefix of the scheduling gate this daemon is responsible for lifting.
    #[arg(short, long, default_value = "gke.io/topology-aware-auto-")]
    pub gate: String,

    /// Interval, in seconds, between scheduling ticks.
    #[arg(short, long, default_value_t = 1.0)]
    pub interval: f64,

    /// Namespaces to exclude from pod listing.
    #[arg(long = "ignored-namespace")]
    pub ignored_namespace: Vec<String>,

    /// Port the metrics/health/ready HTTP server listens on.
    #[arg(long, default_value_t = 8080)]
    pub http_port: u16,
}
