//! NodeFilter: which nodes are eligible placement targets for a tick.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Node, Pod, Taint, Toleration};
use tracing::debug;

use crate::resources::{self, ResourceQuantities};
use crate::topology::TopologyKey;

/// A schedulable node: its topology position, free capacity, and the raw
/// labels used to build a node-affinity selector once a pod is assigned
/// here.
#[derive(Debug, Clone)]
pub struct NodeRecord {
    pub name: String,
    pub topology: TopologyKey,
    pub free: ResourceQuantities,
    pub labels: BTreeMap<String, String>,
}

/// Filters the node list down to nodes that are topology-labeled, Ready,
/// and not tainted against the daemon's tolerated set; computes free
/// capacity for the survivors.
///
/// A node missing topology labels, carrying an untolerated taint, or
/// reporting `Ready != True` is skipped with the rest of the list still
/// considered (no early `break`).
pub fn schedulable_nodes(
    nodes: &[Node],
    pods: &[Pod],
    tolerated_taints: &[Toleration],
) -> Vec<NodeRecord> {
    nodes
        .iter()
        .filter_map(|node| schedulable_node(node, pods, tolerated_taints))
        .collect()
}

fn schedulable_node(
    node: &Node,
    pods: &[Pod],
    tolerated_taints: &[Toleration],
) -> Option<NodeRecord> {
    let name = node.metadata.name.clone().unwrap_or_default();
    let labels = node.metadata.labels.clone().unwrap_or_default();

    let Some(topology) = TopologyKey::from_labels(&labels) else {
        debug!(node = %name, "skipping node: missing topology metadata");
        return None;
    };

    if let Some(taints) = node.spec.as_ref().and_then(|s| s.taints.as_ref()) {
        if let Some(taint) = find_untolerated_taint(taints, tolerated_taints) {
            debug!(node = %name, taint = %taint.key, "skipping node: untolerated taint");
            return None;
        }
    }

    if !is_ready(node) {
        debug!(node = %name, "skipping node: not ready");
        return None;
    }

    let free = resources::free_capacity(node, pods);

    Some(NodeRecord {
        name,
        topology,
        free,
        labels,
    })
}

fn is_ready(node: &Node) -> bool {
    let Some(conditions) = node.status.as_ref().and_then(|s| s.conditions.as_ref()) else {
        return false;
    };
    conditions
        .iter()
        .find(|c| c.type_ == "Ready")
        .map(|c| c.status == "True")
        .unwrap_or(false)
}

fn find_untolerated_taint<'a>(
    taints: &'a [Taint],
    tolerations: &[Toleration],
) -> Option<&'a Taint> {
    taints.iter().find(|t| !tolerated(t, tolerations))
}

fn tolerated(taint: &Taint, tolerations: &[Toleration]) -> bool {
    tolerations.iter().any(|t| tolerates(t, taint))
}

/// Whether a single toleration matches a taint by key, per the two
/// toleration operators Kubernetes defines:
/// - `Exists`: matches any taint with the same key, regardless of value.
/// - `Equal` (the default when unset): matches only if the value is also
///   equal.
fn tolerates(toleration: &Toleration, taint: &Taint) -> bool {
    match toleration.key.as_deref() {
        None => {
            // An empty key with operator Exists tolerates everything.
            matches!(toleration.operator.as_deref(), Some("Exists"))
        }
        Some(key) => {
            if key != taint.key {
                return false;
            }
            if toleration.operator.as_deref() == Some("Exists") {
                true
            } else {
                // Operator defaults to `Equal` when unset.
                toleration.value.as_deref() == taint.value.as_deref()
            }
        }
    }
}
