use crate::Result;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Readiness of one worker pod
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerStatus {
    /// No pod object exists for the worker
    Missing,
    /// The pod exists but has not been bound to a node yet
    Pending,
    /// The pod is bound to a node and can take new placements
    Eligible { node_name: String },
}

impl WorkerStatus {
    /// Derive the status from a pod object, if there is one
    pub fn from_pod(pod: Option<&Pod>) -> Self {
        let Some(pod) = pod else {
            return Self::Missing;
        };

        match pod
            .spec
            .as_ref()
            .and_then(|s| s.node_name.as_deref())
            .filter(|n| !n.is_empty())
        {
            Some(node_name) => Self::Eligible {
                node_name: node_name.to_string(),
            },
            None => Self::Pending,
        }
    }

    pub fn is_present(&self) -> bool {
        !matches!(self, Self::Missing)
    }

    pub fn is_eligible(&self) -> bool {
        matches!(self, Self::Eligible { .. })
    }
}

/// Source of live worker pod status
#[async_trait]
pub trait WorkerStatusSource: Send + Sync {
    /// Look up the worker pod called `pod_name`
    async fn worker_status(&self, pod_name: &str) -> Result<WorkerStatus>;
}

/// In-memory index of worker pods keyed by pod name
#[derive(Default)]
pub struct PodIndex {
    pods: RwLock<HashMap<String, Pod>>,
}

impl PodIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index from a list of pods, skipping pods without a name
    pub fn from_pods(pods: impl IntoIterator<Item = Pod>) -> Self {
        let pods = pods
            .into_iter()
            .filter_map(|pod| pod.metadata.name.clone().map(|name| (name, pod)))
            .collect();

        Self {
            pods: RwLock::new(pods),
        }
    }

    /// Insert or replace a pod. Pods without a name are ignored.
    pub async fn upsert(&self, pod: Pod) {
        if let Some(name) = pod.metadata.name.clone() {
            self.pods.write().await.insert(name, pod);
        }
    }

    pub async fn remove(&self, pod_name: &str) -> Option<Pod> {
        self.pods.write().await.remove(pod_name)
    }

    pub async fn len(&self) -> usize {
        self.pods.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.pods.read().await.is_empty()
    }
}

#[async_trait]
impl WorkerStatusSource for PodIndex {
    async fn worker_status(&self, pod_name: &str) -> Result<WorkerStatus> {
        let pods = self.pods.read().await;
        let status = WorkerStatus::from_pod(pods.get(pod_name));
        debug!("Worker {} status: {:?}", pod_name, status);
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::make_pod;

    #[test]
    fn test_status_from_pod() {
        assert_eq!(WorkerStatus::from_pod(None), WorkerStatus::Missing);

        let pending = make_pod("test-ns", "statefulset-name-0", "");
        assert_eq!(WorkerStatus::from_pod(Some(&pending)), WorkerStatus::Pending);

        let bound = make_pod("test-ns", "statefulset-name-1", "node-1");
        assert_eq!(
            WorkerStatus::from_pod(Some(&bound)),
            WorkerStatus::Eligible {
                node_name: "node-1".to_string()
            }
        );

        let no_spec = Pod::default();
        assert_eq!(WorkerStatus::from_pod(Some(&no_spec)), WorkerStatus::Pending);
    }

    #[test]
    fn test_presence_and_eligibility() {
        assert!(!WorkerStatus::Missing.is_present());
        assert!(!WorkerStatus::Missing.is_eligible());
        assert!(WorkerStatus::Pending.is_present());
        assert!(!WorkerStatus::Pending.is_eligible());

        let eligible = WorkerStatus::Eligible {
            node_name: "node-0".to_string(),
        };
        assert!(eligible.is_present());
        assert!(eligible.is_eligible());
    }

    #[tokio::test]
    async fn test_pod_index_lookup() {
        let index = PodIndex::from_pods(vec![
            make_pod("test-ns", "statefulset-name-0", ""),
            make_pod("test-ns", "statefulset-name-1", "node-1"),
            Pod::default(),
        ]);
        assert_eq!(index.len().await, 2);

        assert_eq!(
            index.worker_status("statefulset-name-0").await.unwrap(),
            WorkerStatus::Pending
        );
        assert!(index
            .worker_status("statefulset-name-1")
            .await
            .unwrap()
            .is_eligible());
        assert_eq!(
            index.worker_status("statefulset-name-2").await.unwrap(),
            WorkerStatus::Missing
        );

        // Binding the pending pod makes it eligible
        index
            .upsert(make_pod("test-ns", "statefulset-name-0", "node-0"))
            .await;
        assert!(index
            .worker_status("statefulset-name-0")
            .await
            .unwrap()
            .is_eligible());

        index.remove("statefulset-name-1").await;
        assert_eq!(
            index.worker_status("statefulset-name-1").await.unwrap(),
            WorkerStatus::Missing
        );
    }
}
