//! Committer: pins a scheduled pod to its chosen node and lifts the gate.

use k8s_openapi::api::core::v1::{
    Affinity, NodeAffinity, NodeSelector, NodeSelectorRequirement, NodeSelectorTerm, Pod,
};
use tracing::{info, warn};

use crate::error::{Result, SchedulerError};
use crate::node_filter::NodeRecord;
use crate::orchestrator::OrchestratorApi;

const HOSTNAME_LABEL: &str = "kubernetes.io/hostname";

/// Re-reads a pod, removes `gate_name` from its scheduling gates and pins
/// it to `node` via a required node-affinity term on
/// `kubernetes.io/hostname`, then writes the pod back.
///
/// Re-reading immediately before the write (rather than reusing the pod
/// object the tick already had in memory) narrows the window in which a
/// concurrent edit could be silently clobbered. A pod that vanished in the
/// meantime is reported as [`SchedulerError::PodGone`] rather than a fatal
/// error - the caller logs it and moves on to the next pod, retrying the
/// job on a later tick if the pod reappears.
pub async fn commit(
    orchestrator: &dyn OrchestratorApi,
    namespace: &str,
    pod_name: &str,
    node: &NodeRecord,
    gate_name: &str,
) -> Result<()> {
    let Some(mut pod) = orchestrator.read_pod(namespace, pod_name).await? else {
        return Err(SchedulerError::PodGone {
            namespace: namespace.to_string(),
            name: pod_name.to_string(),
        });
    };

    let Some(spec) = pod.spec.as_mut() else {
        warn!(namespace, pod_name, "pod has no spec, skipping commit");
        return Ok(());
    };

    let has_gate = spec
        .scheduling_gates
        .as_ref()
        .map(|gates| gates.iter().any(|g| g.name == gate_name))
        .unwrap_or(false);
    if !has_gate {
        warn!(namespace, pod_name, gate_name, "gate already removed, skipping commit");
        return Ok(());
    }

    if let Some(gates) = spec.scheduling_gates.as_mut() {
        gates.retain(|g| g.name != gate_name);
    }

    spec.affinity = Some(pin_to_host(node));

    match orchestrator.replace_pod(namespace, &pod).await {
        Ok(()) => {
            info!(
                namespace,
                pod_name,
                node = %node.name,
                "pod scheduled"
            );
            Ok(())
        }
        Err(err) => {
            warn!(namespace, pod_name, node = %node.name, error = %err, "failed to commit pod, will retry next tick");
            Ok(())
        }
    }
}

fn pin_to_host(node: &NodeRecord) -> Affinity {
    Affinity {
        node_affinity: Some(NodeAffinity {
            required_during_scheduling_ignored_during_execution: Some(NodeSelector {
                node_selector_terms: vec![NodeSelectorTerm {
                    match_expressions: Some(vec![NodeSelectorRequirement {
                        key: HOSTNAME_LABEL.to_string(),
                        operator: "In".to_string(),
                        values: Some(vec![node.name.clone()]),
                    }]),
                    match_fields: None,
                }],
            }),
            preferred_during_scheduling_ignored_during_execution: None,
        }),
        pod_affinity: None,
        pod_anti_affinity: None,
    }
}

/// Exposed so [`crate::control_loop`] can stamp the pod's identity into
/// the same `Pod` object this module reads, without duplicating the
/// read-modify-write.
pub fn affinity_matches(pod: &Pod, node_name: &str) -> bool {
    pod.spec
        .as_ref()
        .and_then(|s| s.affinity.as_ref())
        .and_then(|a| a.node_affinity.as_ref())
        .and_then(|na| na.required_during_scheduling_ignored_during_execution.as_ref())
        .map(|sel| {
            sel.node_selector_terms.iter().any(|term| {
                term.match_expressions
                    .as_ref()
                    .map(|exprs| {
                        exprs.iter().any(|e| {
                            e.key == HOSTNAME_LABEL
                                && e.values.as_deref() == Some([node_name.to_string()].as_slice())
                        })
                    })
                    .unwrap_or(false)
            })
        })
        .unwrap_or(false)
}
