mod assignment;
mod cli;
mod committer;
mod control_loop;
mod error;
mod metrics;
mod node_filter;
mod orchestrator;
mod pod_filter;
mod quantity;
mod resources;
mod topology;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use kube::Client;
use tracing::info;
use warp::Filter;

use cli::Args;
use control_loop::ControlLoop;
use metrics::{health_handler, metrics_handler, ready_handler, Metrics};
use orchestrator::kube_client::KubeOrchestrator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let client = Client::try_default()
        .await
        .context("failed to build a Kubernetes client from in-cluster or kubeconfig settings")?;

    let metrics = Arc::new(Metrics::new());
    let orchestrator: Arc<dyn orchestrator::OrchestratorApi> =
        Arc::new(KubeOrchestrator::new(client));

    let http_routes = metrics_handler().or(health_handler()).or(ready_handler());
    let http_port = args.http_port;
    tokio::spawn(async move {
        info!(port = http_port, "starting metrics/health/ready server");
        warp::serve(http_routes).run(([0, 0, 0, 0], http_port)).await;
    });

    let tick_interval = Duration::from_secs_f64(args.interval.max(0.0));
    let control_loop = ControlLoop::new(
        orchestrator,
        metrics,
        args.gate,
        args.ignored_namespace,
        tick_interval,
    );

    info!("starting topology scheduler control loop");
    control_loop.run().await;
}
