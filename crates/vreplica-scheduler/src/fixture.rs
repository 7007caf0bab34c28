//! Self-contained cluster description used by tests and offline snapshots
//!
//! A fixture declares a worker pool, how many of its workers are still
//! waiting for a node, and the VPods placed on it. [`ClusterFixture::into_cluster`]
//! turns it into in-memory sources wired to a [`StateBuilder`].

use crate::ordinal;
use crate::readiness::PodIndex;
use crate::scale_cache::{ScaleCache, ScaleCacheConfig, StaticScaleSource};
use crate::state::StateBuilder;
use crate::vpod::VPodClient;
use crate::{Result, SchedulerError};
use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{Pod, PodSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use vreplica_core::VPod;

fn default_namespace() -> String {
    "default".to_string()
}

/// Declarative description of a worker pool and its VPods
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterFixture {
    pub pool_name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    pub replicas: i32,
    /// The lowest `pending_replicas` ordinals have no node yet
    #[serde(default)]
    pub pending_replicas: i32,
    pub capacity: i32,
    #[serde(default)]
    pub vpods: Vec<VPod>,
}

/// In-memory sources built from a fixture, plus a builder reading them
pub struct FixtureCluster {
    pub builder: StateBuilder,
    pub scale: Arc<StaticScaleSource>,
    pub scale_cache: Arc<ScaleCache>,
    pub pods: Arc<PodIndex>,
    pub vpods: Arc<VPodClient>,
}

impl ClusterFixture {
    /// Reject self-contradictory fixtures
    pub fn validate(&self) -> Result<()> {
        if self.replicas < 0 {
            return Err(SchedulerError::invalid_configuration(
                format!("replicas {} is negative", self.replicas),
                "Set replicas to zero or more",
            ));
        }

        if self.pending_replicas < 0 {
            return Err(SchedulerError::invalid_configuration(
                format!("pending replicas {} is negative", self.pending_replicas),
                "Set pendingReplicas to zero or more",
            ));
        }

        if self.pending_replicas > self.replicas {
            return Err(SchedulerError::invalid_configuration(
                format!(
                    "pending replicas {} greater than replicas {}",
                    self.pending_replicas, self.replicas
                ),
                "pendingReplicas counts workers of the pool and cannot exceed replicas",
            ));
        }

        for vpod in &self.vpods {
            vpod.validate()?;
        }

        Ok(())
    }

    /// Worker pods of the pool, pending ones without a node
    pub fn pods(&self) -> Vec<Pod> {
        (0..self.replicas)
            .map(|i| {
                let name = ordinal::pod_name(&self.pool_name, i);
                let node_name = if i < self.pending_replicas {
                    String::new()
                } else {
                    format!("node-{}", i)
                };
                make_pod(&self.namespace, &name, &node_name)
            })
            .collect()
    }

    /// Validate the fixture and wire it into a ready state builder
    pub async fn into_cluster(self, config: ScaleCacheConfig) -> Result<FixtureCluster> {
        self.validate()?;

        let scale = Arc::new(StaticScaleSource::new(self.replicas));
        let pods = Arc::new(PodIndex::from_pods(self.pods()));

        let vpods = Arc::new(VPodClient::new());
        for vpod in self.vpods {
            vpods
                .create(
                    &vpod.key.namespace,
                    &vpod.key.name,
                    vpod.vreplicas,
                    vpod.placements,
                )
                .await;
        }

        let scale_cache = Arc::new(ScaleCache::new(
            self.pool_name.clone(),
            scale.clone(),
            config,
        ));

        let builder = StateBuilder::new(
            self.pool_name.clone(),
            self.capacity,
            vpods.clone(),
            pods.clone(),
            scale_cache.clone(),
        )?;

        debug!(
            "Fixture cluster for pool {} ready ({} replicas, {} pending)",
            self.pool_name, self.replicas, self.pending_replicas
        );

        Ok(FixtureCluster {
            builder,
            scale,
            scale_cache,
            pods,
            vpods,
        })
    }
}

/// Worker pod bound to `node_name`, or unbound when `node_name` is empty
pub fn make_pod(namespace: &str, name: &str, node_name: &str) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: Some(PodSpec {
            node_name: (!node_name.is_empty()).then(|| node_name.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// StatefulSet declaring `replicas` workers
pub fn make_statefulset(namespace: &str, name: &str, replicas: i32) -> StatefulSet {
    StatefulSet {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: Some(StatefulSetSpec {
            replicas: Some(replicas),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::readiness::WorkerStatusSource;
    use vreplica_core::{from_yaml, Placement, VPodKey};

    fn fixture(replicas: i32, pending_replicas: i32) -> ClusterFixture {
        ClusterFixture {
            pool_name: "statefulset-name".to_string(),
            namespace: "test-ns".to_string(),
            replicas,
            pending_replicas,
            capacity: 10,
            vpods: vec![],
        }
    }

    #[test]
    fn test_pending_greater_than_replicas_rejected() {
        let err = fixture(1, 2).validate().unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidConfiguration { .. }));
        assert!(err
            .to_string()
            .contains("pending replicas 2 greater than replicas 1"));
    }

    #[test]
    fn test_negative_counts_rejected() {
        assert!(fixture(-1, 0).validate().is_err());
        assert!(fixture(1, -1).validate().is_err());

        let mut bad_vpod = fixture(1, 0);
        bad_vpod
            .vpods
            .push(VPod::new(VPodKey::new("ns", "source"), -3, vec![]));
        assert!(matches!(
            bad_vpod.validate(),
            Err(SchedulerError::CoreError(_))
        ));
    }

    #[test]
    fn test_pods_pending_first() {
        let pods = fixture(3, 1).pods();
        assert_eq!(pods.len(), 3);

        let node_names: Vec<Option<String>> = pods
            .iter()
            .map(|p| p.spec.as_ref().and_then(|s| s.node_name.clone()))
            .collect();
        assert_eq!(
            node_names,
            vec![None, Some("node-1".to_string()), Some("node-2".to_string())]
        );
        assert_eq!(
            pods[2].metadata.name.as_deref(),
            Some("statefulset-name-2")
        );
    }

    #[tokio::test]
    async fn test_into_cluster_wires_sources() {
        let mut f = fixture(2, 1);
        f.vpods.push(VPod::new(
            VPodKey::new("vpod-ns", "vpod-name"),
            1,
            vec![Placement::new("statefulset-name-1", 1)],
        ));

        let cluster = f.into_cluster(ScaleCacheConfig::default()).await.unwrap();

        assert_eq!(cluster.pods.len().await, 2);
        assert!(!cluster
            .pods
            .worker_status("statefulset-name-0")
            .await
            .unwrap()
            .is_eligible());
        assert_eq!(cluster.scale_cache.get().await.unwrap(), 2);

        let state = cluster.builder.build().await.unwrap();
        assert_eq!(state.free_cap, vec![10, 9]);
        assert_eq!(state.schedulable_pods, vec![1]);
    }

    #[tokio::test]
    async fn test_invalid_fixture_builds_nothing() {
        let result = fixture(1, 2).into_cluster(ScaleCacheConfig::default()).await;
        assert!(matches!(
            result,
            Err(SchedulerError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_fixture_from_yaml() {
        let yaml = r#"
poolName: statefulset-name
replicas: 3
pendingReplicas: 1
capacity: 10
vpods:
  - key: vpod-ns/vpod-name
    vreplicas: 2
    placements:
      - podName: statefulset-name-1
        vreplicas: 2
"#;
        let f: ClusterFixture = from_yaml(yaml).unwrap();
        assert_eq!(f.namespace, "default");
        assert_eq!(f.pending_replicas, 1);
        assert_eq!(f.vpods[0].placements[0].vreplicas, 2);
        assert!(f.validate().is_ok());
    }

    #[test]
    fn test_make_statefulset() {
        let sts = make_statefulset("test-ns", "statefulset-name", 4);
        assert_eq!(sts.spec.and_then(|s| s.replicas), Some(4));
    }
}
