//! The periodic control loop: lists pods, discovers gates, and dispatches
//! each gated job through the filter/assignment/commit pipeline.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::assignment::calculate_pods_assignment;
use crate::committer;
use crate::error::Result;
use crate::metrics::Metrics;
use crate::node_filter::{self, NodeRecord};
use crate::orchestrator::OrchestratorApi;
use crate::pod_filter::{self, PodRecord};

/// Pods within a group are considered visible to each other only after
/// this settling delay following the first sighting of a gate, giving a
/// job's remaining pods time to appear in listings before the first pod
/// in the group is scheduled alone.
const GATE_SETTLING_DELAY: Duration = Duration::from_secs(5);

pub struct ControlLoop {
    orchestrator: Arc<dyn OrchestratorApi>,
    metrics: Arc<Metrics>,
    gate_prefix: String,
    ignored_namespaces: Vec<String>,
    tick_interval: Duration,
}

impl ControlLoop {
    pub fn new(
        orchestrator: Arc<dyn OrchestratorApi>,
        metrics: Arc<Metrics>,
        gate_prefix: String,
        ignored_namespaces: Vec<String>,
        tick_interval: Duration,
    ) -> Self {
        Self {
            orchestrator,
            metrics,
            gate_prefix,
            ignored_namespaces,
            tick_interval,
        }
    }

    /// Runs the loop until the process is killed. Errors from a single
    /// tick are logged and swallowed - a transient API error should not
    /// bring the daemon down, it should just be retried next tick.
    pub async fn run(&self) -> ! {
        let mut interval = tokio::time::interval(self.tick_interval);
        loop {
            interval.tick().await;
            self.metrics.ticks_total.inc();
            if let Err(err) = self.tick().await {
                warn!(error = %err, "scheduling tick failed");
                self.metrics.tick_errors_total.inc();
            }
        }
    }

    async fn tick(&self) -> Result<()> {
        let pods = self.list_pods().await?;
        let gates = pod_filter::discover_gates(&pods, &self.gate_prefix);
        debug!(pods = pods.len(), gates = gates.len(), "tick observed");

        if gates.is_empty() {
            return Ok(());
        }

        tokio::time::sleep(GATE_SETTLING_DELAY).await;

        for gate in gates {
            info!(gate, "scheduling pods for gate");
            // Re-list so late-arriving pods in the same job are visible.
            let pods = self.list_pods().await?;
            self.schedule_gate(&pods, &gate).await?;
        }

        Ok(())
    }

    async fn schedule_gate(&self, pods: &[k8s_openapi::api::core::v1::Pod], gate: &str) -> Result<()> {
        let gated = pod_filter::schedulable_pods(pods, gate);
        let nodes = self.orchestrator.list_nodes().await?;

        let mut jobs = pod_filter::split_into_jobs(gated);
        jobs.sort_by(|a, b| {
            let ta = pod_filter::job_creation_time(a).map(|t| t.0);
            let tb = pod_filter::job_creation_time(b).map(|t| t.0);
            ta.cmp(&tb)
        });

        for job in jobs {
            self.schedule_job(pods, &nodes, job, gate).await;
        }

        Ok(())
    }

    async fn schedule_job(
        &self,
        all_pods: &[k8s_openapi::api::core::v1::Pod],
        nodes: &[k8s_openapi::api::core::v1::Node],
        job: Vec<PodRecord>,
        gate: &str,
    ) {
        let job_name = job.first().and_then(|p| p.job_name.clone());
        self.metrics.jobs_seen_total.inc();

        let Some(tolerations) = pod_filter::job_tolerations(&job) else {
            warn!(
                job_name = ?job_name,
                gate,
                "pods within job have differing tolerations, aborting job for this tick"
            );
            self.metrics.jobs_skipped_total.inc();
            return;
        };
        let schedulable = node_filter::schedulable_nodes(nodes, all_pods, &tolerations);

        let mut sorted_pods = job;
        sorted_pods.sort_by_key(pod_filter::pod_sort_key);

        let mut sorted_nodes = schedulable;
        sorted_nodes.sort_by(|a, b| a.topology.cmp(&b.topology));

        let Some(assignment) = calculate_pods_assignment(&sorted_nodes, &sorted_pods) else {
            warn!(job_name = ?job_name, gate, "no feasible assignment found, skipping job");
            self.metrics.jobs_skipped_total.inc();
            return;
        };

        info!(job_name = ?job_name, pods = sorted_pods.len(), "assignment found, committing job");
        for (pod, &node_idx) in sorted_pods.iter().zip(assignment.iter()) {
            let node: &NodeRecord = &sorted_nodes[node_idx];
            match committer::commit(
                self.orchestrator.as_ref(),
                &pod.namespace,
                &pod.name,
                node,
                gate,
            )
            .await
            {
                Ok(()) => self.metrics.pods_committed_total.inc(),
                Err(err) => {
                    warn!(pod = pod.name, error = %err, "commit failed");
                    self.metrics.tick_errors_total.inc();
                }
            }
        }
        self.metrics.jobs_scheduled_total.inc();
    }

    async fn list_pods(&self) -> Result<Vec<k8s_openapi::api::core::v1::Pod>> {
        let namespaces = self.orchestrator.list_namespaces().await?;
        let mut pods = Vec::new();
        for ns in namespaces {
            let Some(name) = ns.metadata.name else {
                continue;
            };
            if self.ignored_namespaces.iter().any(|ignored| ignored == &name) {
                continue;
            }
            pods.extend(self.orchestrator.list_pods(&name).await?);
        }
        Ok(pods)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Metrics;
    use async_trait::async_trait;
    use k8s_openapi::api::core::v1::{
        Namespace, Node, NodeCondition, NodeSpec, NodeStatus, Pod, PodSchedulingGate, PodSpec,
    };
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
    use std::sync::Mutex as StdMutex;

    const GATE: &str = "gke.io/topology-aware-auto-x";

    /// An in-memory stand-in for the cluster: namespaces, nodes, and a
    /// mutable pod set that `replace_pod` writes back into, with a log of
    /// every pod name replaced, in order, so tests can assert on admission
    /// order and on whether a re-tick performs any writes at all.
    struct InMemoryOrchestrator {
        namespace: String,
        nodes: Vec<Node>,
        pods: StdMutex<Vec<Pod>>,
        replace_log: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl OrchestratorApi for InMemoryOrchestrator {
        async fn list_namespaces(&self) -> Result<Vec<Namespace>> {
            Ok(vec![Namespace {
                metadata: ObjectMeta {
                    name: Some(self.namespace.clone()),
                    ..Default::default()
                },
                ..Default::default()
            }])
        }

        async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>> {
            Ok(self
                .pods
                .lock()
                .unwrap()
                .iter()
                .filter(|p| p.metadata.namespace.as_deref() == Some(namespace))
                .cloned()
                .collect())
        }

        async fn list_nodes(&self) -> Result<Vec<Node>> {
            Ok(self.nodes.clone())
        }

        async fn read_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>> {
            Ok(self
                .pods
                .lock()
                .unwrap()
                .iter()
                .find(|p| {
                    p.metadata.namespace.as_deref() == Some(namespace)
                        && p.metadata.name.as_deref() == Some(name)
                })
                .cloned())
        }

        async fn replace_pod(&self, namespace: &str, pod: &Pod) -> Result<()> {
            let mut pods = self.pods.lock().unwrap();
            if let Some(existing) = pods.iter_mut().find(|p| {
                p.metadata.namespace.as_deref() == Some(namespace) && p.metadata.name == pod.metadata.name
            }) {
                *existing = pod.clone();
            }
            self.replace_log
                .lock()
                .unwrap()
                .push(pod.metadata.name.clone().unwrap_or_default());
            Ok(())
        }
    }

    fn topology_labels(rack: &str, host: &str) -> BTreeMapAlias {
        [
            ("cloud.google.com/gke-placement-group", "pg1"),
            ("topology.gke.io/cluster", "c1"),
            ("topology.gke.io/rack", rack),
            ("topology.gke.io/host", host),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    type BTreeMapAlias = std::collections::BTreeMap<String, String>;

    fn node(name: &str, rack: &str, host: &str) -> Node {
        Node {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(topology_labels(rack, host)),
                ..Default::default()
            },
            spec: Some(NodeSpec::default()),
            status: Some(NodeStatus {
                conditions: Some(vec![NodeCondition {
                    type_: "Ready".to_string(),
                    status: "True".to_string(),
                    ..Default::default()
                }]),
                allocatable: Some({
                    let mut m = std::collections::BTreeMap::new();
                    m.insert("cpu".to_string(), Quantity("4".to_string()));
                    m.insert("memory".to_string(), Quantity("8Gi".to_string()));
                    m
                }),
                ..Default::default()
            }),
        }
    }

    fn gated_pod(name: &str, job_name: &str, created_at: &str) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                labels: Some(
                    [("job-name", job_name)]
                        .into_iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                ),
                creation_timestamp: Some(Time(
                    chrono::DateTime::parse_from_rfc3339(created_at)
                        .unwrap()
                        .with_timezone(&chrono::Utc),
                )),
                ..Default::default()
            },
            spec: Some(PodSpec {
                scheduling_gates: Some(vec![PodSchedulingGate {
                    name: GATE.to_string(),
                }]),
                containers: vec![k8s_openapi::api::core::v1::Container {
                    name: "main".to_string(),
                    resources: Some(k8s_openapi::api::core::v1::ResourceRequirements {
                        requests: Some({
                            let mut m = std::collections::BTreeMap::new();
                            m.insert("cpu".to_string(), Quantity("100m".to_string()));
                            m
                        }),
                        ..Default::default()
                    }),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn four_node_cluster() -> Vec<Node> {
        vec![
            node("n0", "r1", "h0"),
            node("n1", "r1", "h1"),
            node("n2", "r2", "h2"),
            node("n3", "r2", "h3"),
        ]
    }

    #[tokio::test(start_paused = true)]
    async fn admission_order_schedules_older_job_first() {
        let pods = vec![
            // Job B created first in the vector but later in time.
            gated_pod("b-0", "b", "2024-01-01T00:02:00Z"),
            gated_pod("b-1", "b", "2024-01-01T00:02:00Z"),
            gated_pod("a-0", "a", "2024-01-01T00:01:00Z"),
            gated_pod("a-1", "a", "2024-01-01T00:01:00Z"),
        ];
        let orchestrator = Arc::new(InMemoryOrchestrator {
            namespace: "default".to_string(),
            nodes: four_node_cluster(),
            pods: StdMutex::new(pods),
            replace_log: StdMutex::new(vec![]),
        });

        let control_loop = ControlLoop::new(
            orchestrator.clone(),
            Arc::new(Metrics::new()),
            "gke.io/topology-aware-auto-".to_string(),
            vec![],
            Duration::from_secs(1),
        );

        control_loop.tick().await.unwrap();

        let log = orchestrator.replace_log.lock().unwrap().clone();
        assert_eq!(log.len(), 4);
        let pos = |name: &str| log.iter().position(|n| n == name).unwrap();
        assert!(pos("a-0") < pos("b-0"));
        assert!(pos("a-1") < pos("b-0"));
        assert!(pos("a-0") < pos("b-1"));
        assert!(pos("a-1") < pos("b-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn re_tick_after_success_performs_no_further_writes() {
        let pods = vec![
            gated_pod("a-0", "a", "2024-01-01T00:01:00Z"),
            gated_pod("a-1", "a", "2024-01-01T00:01:00Z"),
        ];
        let orchestrator = Arc::new(InMemoryOrchestrator {
            namespace: "default".to_string(),
            nodes: four_node_cluster(),
            pods: StdMutex::new(pods),
            replace_log: StdMutex::new(vec![]),
        });

        let control_loop = ControlLoop::new(
            orchestrator.clone(),
            Arc::new(Metrics::new()),
            "gke.io/topology-aware-auto-".to_string(),
            vec![],
            Duration::from_secs(1),
        );

        control_loop.tick().await.unwrap();
        let writes_after_first_tick = orchestrator.replace_log.lock().unwrap().len();
        assert_eq!(writes_after_first_tick, 2);

        control_loop.tick().await.unwrap();
        let writes_after_second_tick = orchestrator.replace_log.lock().unwrap().len();
        assert_eq!(writes_after_second_tick, writes_after_first_tick);
    }
}
