//! Topology coordinates and the distance metric used to rank node orderings.

use std::collections::BTreeMap;

const LABEL_PLACEMENT_GROUP: &str = "cloud.google.com/gke-placement-group";
const LABEL_CLUSTER: &str = "topology.gke.io/cluster";
const LABEL_RACK: &str = "topology.gke.io/rack";
const LABEL_HOST: &str = "topology.gke.io/host";

/// A node's position in the placement-group -> cluster -> rack -> host hierarchy.
///
/// Ordering this type lexicographically groups nodes first by placement
/// group, then cluster, then rack, then host - exactly the grouping
/// `distance` rewards.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TopologyKey {
    pub placement_group: String,
    pub cluster: String,
    pub rack: String,
    pub host: String,
}

impl TopologyKey {
    /// Derives a topology key from a node's labels. Returns `None` if any of
    /// the four required labels is missing - such a node is not
    /// topology-labeled and must be excluded from consideration.
    pub fn from_labels(labels: &BTreeMap<String, String>) -> Option<Self> {
        Some(Self {
            placement_group: labels.get(LABEL_PLACEMENT_GROUP)?.clone(),
            cluster: labels.get(LABEL_CLUSTER)?.clone(),
            rack: labels.get(LABEL_RACK)?.clone(),
            host: labels.get(LABEL_HOST)?.clone(),
        })
    }

    fn coordinates(&self) -> [&str; 4] {
        [
            &self.placement_group,
            &self.cluster,
            &self.rack,
            &self.host,
        ]
    }
}

/// Distance between two topology keys.
///
/// `distance(k, k) == 0`. Otherwise, if the first differing coordinate (0 =
/// placement group, 3 = host) is at position `i`, the distance is
/// `1_000_000 / 100^i`: different placement group costs 10^6, different
/// cluster (same group) costs 10^4, different rack (same cluster) costs
/// 10^2, different host (same rack) costs 1. Differing deeper in the
/// hierarchy is cheaper - that's the point of the metric.
pub fn distance(a: &TopologyKey, b: &TopologyKey) -> u64 {
    let (ca, cb) = (a.coordinates(), b.coordinates());
    let mut cost = 1_000_000u64;
    for i in 0..4 {
        if ca[i] != cb[i] {
            return cost;
        }
        cost /= 100;
    }
    0
}
