//! The orchestrator API boundary: everything the scheduling core needs
//! from the cluster, abstracted behind a trait so the core logic can be
//! exercised against an in-memory fake instead of a live API server.

pub mod kube_client;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, Node, Pod};

use crate::error::Result;

/// Read/write access to the subset of the Kubernetes API this daemon
/// touches: namespace and node listing, pod listing/reading, and the
/// single read-modify-write a commit performs.
#[async_trait]
pub trait OrchestratorApi: Send + Sync {
    async fn list_namespaces(&self) -> Result<Vec<Namespace>>;
    async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>>;
    async fn list_nodes(&self) -> Result<Vec<Node>>;
    async fn read_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>>;
    async fn replace_pod(&self, namespace: &str, pod: &Pod) -> Result<()>;
}
