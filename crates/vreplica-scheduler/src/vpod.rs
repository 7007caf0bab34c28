use crate::{Result, SchedulerError};
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;
use vreplica_core::{Placement, VPod, VPodKey};

/// Read-only view over every VPod scheduled onto a worker pool
#[async_trait]
pub trait VPodLister: Send + Sync {
    /// Point-in-time list of all VPods
    async fn list(&self) -> Result<Vec<VPod>>;
}

/// Find the VPod with `key` in a previously listed sequence
pub fn lookup_vpod<'a>(key: &VPodKey, vpods: &'a [VPod]) -> Option<&'a VPod> {
    vpods.iter().find(|v| &v.key == key)
}

#[derive(Default)]
struct VPodStore {
    vpods: Vec<VPod>,
    failure: Option<String>,
}

/// In-memory VPod lister, listing VPods in creation order
#[derive(Default)]
pub struct VPodClient {
    store: RwLock<VPodStore>,
}

impl VPodClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a VPod, replacing any existing VPod with the same key
    pub async fn create(
        &self,
        namespace: &str,
        name: &str,
        vreplicas: i32,
        placements: Vec<Placement>,
    ) -> VPod {
        let vpod = VPod::new(VPodKey::new(namespace, name), vreplicas, placements);

        let mut store = self.store.write().await;
        match store.vpods.iter_mut().find(|v| v.key == vpod.key) {
            Some(existing) => *existing = vpod.clone(),
            None => store.vpods.push(vpod.clone()),
        }

        debug!("Created VPod {} ({} vreplicas)", vpod.key, vpod.vreplicas);
        vpod
    }

    pub async fn remove(&self, key: &VPodKey) -> Option<VPod> {
        let mut store = self.store.write().await;
        let idx = store.vpods.iter().position(|v| &v.key == key)?;
        Some(store.vpods.remove(idx))
    }

    /// Make `list` fail with `message` until `clear_failure` is called
    pub async fn fail_with(&self, message: impl Into<String>) {
        self.store.write().await.failure = Some(message.into());
    }

    pub async fn clear_failure(&self) {
        self.store.write().await.failure = None;
    }
}

#[async_trait]
impl VPodLister for VPodClient {
    async fn list(&self) -> Result<Vec<VPod>> {
        let store = self.store.read().await;
        match &store.failure {
            Some(message) => Err(SchedulerError::workload_list_failed(message.clone())),
            None => Ok(store.vpods.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_lookup() {
        let client = VPodClient::new();

        let created = client
            .create(
                "vpod-ns-0",
                "vpod-name-0",
                1,
                vec![Placement::new("statefulset-name-0", 1)],
            )
            .await;
        client.create("vpod-ns-1", "vpod-name-1", 2, vec![]).await;

        let listed = client.list().await.unwrap();
        assert_eq!(listed.len(), 2);

        let found = lookup_vpod(&VPodKey::new("vpod-ns-0", "vpod-name-0"), &listed);
        assert_eq!(found, Some(&created));

        assert!(lookup_vpod(&VPodKey::new("vpod-ns-0", "missing"), &listed).is_none());
    }

    #[tokio::test]
    async fn test_create_replaces_same_key() {
        let client = VPodClient::new();
        client.create("ns", "source", 1, vec![]).await;
        client
            .create("ns", "source", 3, vec![Placement::new("pool-0", 3)])
            .await;

        let listed = client.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].vreplicas, 3);

        let removed = client.remove(&VPodKey::new("ns", "source")).await;
        assert!(removed.is_some());
        assert!(client.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_failure() {
        let client = VPodClient::new();
        client.fail_with("informer not synced").await;

        let err = client.list().await.unwrap_err();
        assert!(matches!(err, SchedulerError::WorkloadListFailed { .. }));

        client.clear_failure().await;
        assert!(client.list().await.is_ok());
    }
}
