//! ResourceAccounting: summing container requests and computing free node
//! capacity.

use k8s_openapi::api::core::v1::{ContainerState, Node, Pod};

use crate::quantity;

/// CPU (millicores), memory (bytes) and GPU (integer count) at once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceQuantities {
    pub cpu_millis: i64,
    pub memory_bytes: i64,
    pub gpu: i64,
}

impl ResourceQuantities {
    /// `self >= other` for every dimension - the feasibility check
    /// Assignment relies on.
    pub fn covers(&self, other: &ResourceQuantities) -> bool {
        self.cpu_millis >= other.cpu_millis
            && self.memory_bytes >= other.memory_bytes
            && self.gpu >= other.gpu
    }

    /// Difference per dimension. Can go negative, e.g. a node that's
    /// already overcommitted; callers treat a negative free dimension as
    /// "nothing fits here" via [`ResourceQuantities::covers`].
    pub fn sub(&self, other: &ResourceQuantities) -> ResourceQuantities {
        ResourceQuantities {
            cpu_millis: self.cpu_millis - other.cpu_millis,
            memory_bytes: self.memory_bytes - other.memory_bytes,
            gpu: self.gpu - other.gpu,
        }
    }
}

impl std::ops::Add for ResourceQuantities {
    type Output = ResourceQuantities;

    fn add(self, rhs: Self) -> Self::Output {
        ResourceQuantities {
            cpu_millis: self.cpu_millis + rhs.cpu_millis,
            memory_bytes: self.memory_bytes + rhs.memory_bytes,
            gpu: self.gpu + rhs.gpu,
        }
    }
}

impl std::iter::Sum for ResourceQuantities {
    fn sum<I: Iterator<Item = ResourceQuantities>>(iter: I) -> Self {
        iter.fold(ResourceQuantities::default(), |acc, x| acc + x)
    }
}

/// Sum of a pod's container requests, counted only if the container's
/// status is not terminated (or no status is reported yet, e.g. a pod that
/// hasn't started).
pub fn pod_requests(pod: &Pod) -> ResourceQuantities {
    let Some(spec) = &pod.spec else {
        return ResourceQuantities::default();
    };
    let statuses = pod
        .status
        .as_ref()
        .and_then(|s| s.container_statuses.as_ref());

    spec.containers
        .iter()
        .filter(|c| !is_terminated(statuses, &c.name))
        .map(container_requests)
        .sum()
}

fn is_terminated(
    statuses: Option<&Vec<k8s_openapi::api::core::v1::ContainerStatus>>,
    container_name: &str,
) -> bool {
    let Some(statuses) = statuses else {
        return false;
    };
    statuses
        .iter()
        .find(|s| s.name == container_name)
        .map(|s| matches!(&s.state, Some(ContainerState { terminated: Some(_), .. })))
        .unwrap_or(false)
}

fn container_requests(container: &k8s_openapi::api::core::v1::Container) -> ResourceQuantities {
    let Some(resources) = &container.resources else {
        return ResourceQuantities::default();
    };
    let Some(requests) = &resources.requests else {
        return ResourceQuantities::default();
    };

    let cpu_millis = requests
        .get("cpu")
        .map(|q| quantity::parse_cpu_millis(&q.0).unwrap_or(0))
        .unwrap_or(0);
    let memory_bytes = requests
        .get("memory")
        .map(|q| quantity::parse_memory_bytes(&q.0).unwrap_or(0))
        .unwrap_or(0);
    let gpu = requests
        .get("nvidia.com/gpu")
        .map(|q| quantity::parse_int(&q.0).unwrap_or(0))
        .unwrap_or(0);

    ResourceQuantities {
        cpu_millis,
        memory_bytes,
        gpu,
    }
}

/// Sums the requests of every non-terminated pod bound to `node_name`.
pub fn used_on_node(pods: &[Pod], node_name: &str) -> ResourceQuantities {
    pods.iter()
        .filter(|p| {
            p.spec
                .as_ref()
                .and_then(|s| s.node_name.as_deref())
                .map(|n| n == node_name)
                .unwrap_or(false)
        })
        .map(pod_requests)
        .sum()
}

/// Allocatable capacity for a node, parsed from its status.
pub fn node_allocatable(node: &Node) -> ResourceQuantities {
    let Some(status) = &node.status else {
        return ResourceQuantities::default();
    };
    let Some(allocatable) = &status.allocatable else {
        return ResourceQuantities::default();
    };

    let cpu_millis = allocatable
        .get("cpu")
        .map(|q| quantity::parse_cpu_millis(&q.0).unwrap_or(0))
        .unwrap_or(0);
    let memory_bytes = allocatable
        .get("memory")
        .map(|q| quantity::parse_memory_bytes(&q.0).unwrap_or(0))
        .unwrap_or(0);
    let gpu = allocatable
        .get("nvidia.com/gpu")
        .map(|q| quantity::parse_int(&q.0).unwrap_or(0))
        .unwrap_or(0);

    ResourceQuantities {
        cpu_millis,
        memory_bytes,
        gpu,
    }
}

/// Free capacity of a node: allocatable minus what's already used by
/// non-terminated pods bound to it.
pub fn free_capacity(node: &Node, all_pods: &[Pod]) -> ResourceQuantities {
    let node_name = node.metadata.name.as_deref().unwrap_or_default();
    node_allocatable(node).sub(&used_on_node(all_pods, node_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{
        Container, ContainerStateTerminated, ContainerStatus, NodeStatus, PodSpec, PodStatus,
        ResourceRequirements,
    };
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;

    fn container(name: &str, cpu: &str, memory: &str, gpu: &str) -> Container {
        let mut requests = BTreeMap::new();
        requests.insert("cpu".to_string(), Quantity(cpu.to_string()));
        requests.insert("memory".to_string(), Quantity(memory.to_string()));
        if !gpu.is_empty() {
            requests.insert("nvidia.com/gpu".to_string(), Quantity(gpu.to_string()));
        }
        Container {
            name: name.to_string(),
            resources: Some(ResourceRequirements {
                requests: Some(requests),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn sums_non_terminated_containers_only() {
        let pod = Pod {
            spec: Some(PodSpec {
                containers: vec![
                    container("a", "100m", "128Mi", "1"),
                    container("b", "200m", "256Mi", ""),
                ],
                ..Default::default()
            }),
            status: Some(PodStatus {
                container_statuses: Some(vec![ContainerStatus {
                    name: "b".to_string(),
                    state: Some(ContainerState {
                        terminated: Some(ContainerStateTerminated {
                            exit_code: 0,
                            ..Default::default()
                        }),
                        ..Default::default()
                    }),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        };

        let req = pod_requests(&pod);
        assert_eq!(req.cpu_millis, 100);
        assert_eq!(req.memory_bytes, 128 * 1024 * 1024);
        assert_eq!(req.gpu, 1);
    }

    #[test]
    fn missing_container_status_counts_as_live() {
        let pod = Pod {
            spec: Some(PodSpec {
                containers: vec![container("a", "100m", "128Mi", "")],
                ..Default::default()
            }),
            status: None,
            ..Default::default()
        };
        assert_eq!(pod_requests(&pod).cpu_millis, 100);
    }

    #[test]
    fn free_capacity_deducts_used() {
        let node = Node {
            metadata: ObjectMeta {
                name: Some("n1".to_string()),
                ..Default::default()
            },
            status: Some(NodeStatus {
                allocatable: Some({
                    let mut m = BTreeMap::new();
                    m.insert("cpu".to_string(), Quantity("4".to_string()));
                    m.insert("memory".to_string(), Quantity("8Gi".to_string()));
                    m.insert("nvidia.com/gpu".to_string(), Quantity("4".to_string()));
                    m
                }),
                ..Default::default()
            }),
            ..Default::default()
        };

        let bound_pod = Pod {
            spec: Some(PodSpec {
                node_name: Some("n1".to_string()),
                containers: vec![container("a", "1000m", "1Gi", "1")],
                ..Default::default()
            }),
            ..Default::default()
        };

        let free = free_capacity(&node, &[bound_pod]);
        assert_eq!(free.cpu_millis, 3000);
        assert_eq!(free.memory_bytes, 7 * 1024 * 1024 * 1024);
        assert_eq!(free.gpu, 3);
    }

    #[test]
    fn covers_checks_all_dimensions() {
        let a = ResourceQuantities {
            cpu_millis: 1000,
            memory_bytes: 1024,
            gpu: 1,
        };
        let b = ResourceQuantities {
            cpu_millis: 500,
            memory_bytes: 1024,
            gpu: 1,
        };
        assert!(a.covers(&b));
        assert!(!b.covers(&a));
    }
}
