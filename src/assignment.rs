//! Backtracking search for the best strictly-increasing assignment of a
//! sorted job's pods onto a sorted list of candidate nodes.

use crate::node_filter::NodeRecord;
use crate::pod_filter::PodRecord;
use crate::topology::distance;

/// Whether `node` has enough free capacity and a matching node selector
/// for `pod`.
pub fn can_schedule(node: &NodeRecord, pod: &PodRecord) -> bool {
    for (key, value) in &pod.node_selector {
        match node.labels.get(key) {
            Some(node_value) if node_value == value => {}
            _ => return false,
        }
    }
    node.free.covers(&pod.requests)
}

/// Searches for the lowest-cost strictly-increasing assignment of
/// `sorted_pods[i]` onto `sorted_nodes[assignment[i]]`.
///
/// Both inputs must already be sorted (pods by [`crate::pod_filter::pod_sort_key`],
/// nodes by topology key) - the search only ever considers assignments
/// where `assignment[i] < assignment[i + 1]`, which is what keeps pods in
/// the same job packed onto topologically adjacent nodes rather than
/// scattered. Returns `None` if no feasible assignment exists.
///
/// The search walks a cursor over the pod list back and forth,
/// incrementing each pod's candidate node index past each infeasible
/// choice, until either the last pod's cursor runs off the end of the
/// node list (search exhausted) or a full feasible assignment is found,
/// at which point its cost is compared against the best found so far and
/// the search backtracks to look for a cheaper one.
pub fn calculate_pods_assignment(
    sorted_nodes: &[NodeRecord],
    sorted_pods: &[PodRecord],
) -> Option<Vec<usize>> {
    if sorted_pods.is_empty() || sorted_nodes.is_empty() {
        return None;
    }

    let pod_count = sorted_pods.len();
    let node_count = sorted_nodes.len();

    // assignment[i] ranges over -1..node_count during the search; -1 means
    // "not yet placed this round". i64 keeps that sentinel representable
    // without reshaping the control flow around unsigned indices.
    let mut assignment: Vec<i64> = (1..=pod_count as i64).rev().map(|x| -x).collect();
    let mut best: Option<Vec<usize>> = None;
    let mut minimum_distance = u64::MAX;

    loop {
        let mut all_ok = true;
        let mut i = assignment.len() as i64 - 1;
        while i >= 0 && all_ok {
            let idx = i as usize;
            assignment[idx] += 1;
            if assignment[idx] == node_count as i64 {
                break;
            }
            if assignment[idx] >= 0
                && can_schedule(&sorted_nodes[assignment[idx] as usize], &sorted_pods[idx])
            {
                i -= 1;
            } else if idx < assignment.len() - 1 && assignment[idx] == assignment[idx + 1] - 1 {
                all_ok = false;
            }
        }

        if *assignment.last().unwrap() == node_count as i64 {
            break;
        }

        if all_ok {
            let mut new_distance = 0u64;
            for i in 1..pod_count {
                new_distance += distance(
                    &sorted_nodes[assignment[i] as usize].topology,
                    &sorted_nodes[assignment[i - 1] as usize].topology,
                );
            }
            if new_distance < minimum_distance {
                minimum_distance = new_distance;
                best = Some(assignment.iter().map(|&x| x as usize).collect());
            }
        }
    }

    best
}
