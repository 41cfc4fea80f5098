//! PodFilter: discovering gated pods, grouping them into jobs, and ordering
//! both jobs and the pods within a job.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Pod, Toleration};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

use crate::resources::{self, ResourceQuantities};

const LABEL_JOB_COMPLETION_INDEX: &str = "batch.kubernetes.io/job-completion-index";
const LABEL_JOB_NAME: &str = "job-name";

/// A single gated pod waiting on this daemon, with everything the
/// assignment search and the committer need.
#[derive(Debug, Clone)]
pub struct PodRecord {
    pub name: String,
    pub namespace: String,
    pub job_name: Option<String>,
    pub index: Option<i64>,
    pub creation_time: Option<Time>,
    pub requests: ResourceQuantities,
    pub node_selector: BTreeMap<String, String>,
    pub tolerations: Vec<Toleration>,
}

/// Scans every gate on every pod, returning the set of gate names whose
/// prefix matches the daemon's configured gate prefix.
pub fn discover_gates(pods: &[Pod], prefix: &str) -> Vec<String> {
    let mut names = std::collections::BTreeSet::new();
    for pod in pods {
        let Some(gates) = pod.spec.as_ref().and_then(|s| s.scheduling_gates.as_ref()) else {
            continue;
        };
        for gate in gates {
            if gate.name.starts_with(prefix) {
                names.insert(gate.name.clone());
            }
        }
    }
    names.into_iter().collect()
}

/// Collects every pod gated by `gate_name` into a `PodRecord`.
pub fn schedulable_pods(pods: &[Pod], gate_name: &str) -> Vec<PodRecord> {
    pods.iter()
        .filter(|pod| {
            pod.spec
                .as_ref()
                .and_then(|s| s.scheduling_gates.as_ref())
                .map(|gates| gates.iter().any(|g| g.name == gate_name))
                .unwrap_or(false)
        })
        .map(pod_record)
        .collect()
}

fn pod_record(pod: &Pod) -> PodRecord {
    let metadata = &pod.metadata;
    let labels = metadata.labels.clone().unwrap_or_default();

    let index = labels
        .get(LABEL_JOB_COMPLETION_INDEX)
        .and_then(|v| v.parse::<i64>().ok());
    let job_name = labels.get(LABEL_JOB_NAME).cloned();

    let spec = pod.spec.as_ref();
    let node_selector = spec
        .and_then(|s| s.node_selector.clone())
        .unwrap_or_default();
    let tolerations = spec.and_then(|s| s.tolerations.clone()).unwrap_or_default();

    PodRecord {
        name: metadata.name.clone().unwrap_or_default(),
        namespace: metadata.namespace.clone().unwrap_or_default(),
        job_name,
        index,
        creation_time: metadata.creation_timestamp.clone(),
        requests: resources::pod_requests(pod),
        node_selector,
        tolerations,
    }
}

/// Groups a flat pod list into jobs keyed by `job_name`, preserving each
/// pod's relative ordering within its job. Relies on same-job pods already
/// being adjacent in the input list.
pub fn split_into_jobs(pods: Vec<PodRecord>) -> Vec<Vec<PodRecord>> {
    let mut jobs: Vec<(Option<String>, Vec<PodRecord>)> = Vec::new();
    for pod in pods {
        match jobs.last_mut() {
            Some((key, group)) if *key == pod.job_name => group.push(pod),
            _ => jobs.push((pod.job_name.clone(), vec![pod])),
        }
    }
    jobs.into_iter().map(|(_, group)| group).collect()
}

/// Sort key for ordering jobs by the creation time of their first pod.
pub fn job_creation_time(job: &[PodRecord]) -> Option<Time> {
    job.first().and_then(|p| p.creation_time.clone())
}

/// Sort key for ordering pods within a job: the completion index if one
/// is set, otherwise a `(name_prefix, trailing_number)` tuple so that
/// `"job-pod2"` sorts before `"job-pod10"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum PodSortKey {
    Index(i64),
    NamePrefix(String, i64),
}

pub fn pod_sort_key(pod: &PodRecord) -> PodSortKey {
    if let Some(index) = pod.index {
        return PodSortKey::Index(index);
    }

    let name = pod.name.as_str();
    let trailing_digits = name
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .count();
    if trailing_digits == 0 {
        return PodSortKey::NamePrefix(name.to_string(), 0);
    }
    let split_at = name.len() - trailing_digits;
    let (prefix, suffix) = name.split_at(split_at);
    PodSortKey::NamePrefix(prefix.to_string(), suffix.parse().unwrap_or(0))
}

/// All tolerations tagged onto a job's pods. A job's pods are required to
/// be homogeneous and share one set of tolerations; this checks that
/// invariant by comparing every pod's tolerations against the first pod's,
/// returning `None` if any pod disagrees so the caller can abort the job
/// for this tick instead of scheduling against a toleration set that
/// doesn't actually apply to every pod in the job.
pub fn job_tolerations(job: &[PodRecord]) -> Option<Vec<Toleration>> {
    let first = job.first()?.tolerations.clone();
    if job.iter().all(|p| p.tolerations == first) {
        Some(first)
    } else {
        None
    }
}
