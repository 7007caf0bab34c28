use crate::ordinal::{self, parse_ordinal};
use crate::readiness::{WorkerStatus, WorkerStatusSource};
use crate::scale_cache::ScaleCache;
use crate::vpod::VPodLister;
use crate::{Result, SchedulerError};
use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vreplica_core::VPodKey;

/// Point-in-time scheduling state of one worker pool
///
/// Built by [`StateBuilder`] and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct State {
    /// Name of the StatefulSet backing the pool
    pub pool_name: String,
    /// Maximum vreplicas a single worker can host
    pub capacity: i32,
    /// Current size of the pool
    pub replicas: i32,
    /// Highest worker ordinal, -1 for an empty pool
    pub last_ordinal: i32,
    /// Free capacity per ordinal. Negative when a worker is over-committed.
    pub free_cap: Vec<i32>,
    /// Ordinals of workers bound to a node, ascending
    pub schedulable_pods: Vec<i32>,
    /// Per VPod, vreplicas placed on each schedulable worker
    pub pod_spread: BTreeMap<VPodKey, BTreeMap<String, i32>>,
    /// Per VPod, vreplicas not placed anywhere yet
    pub pending: BTreeMap<VPodKey, i32>,
    /// Per VPod, expected vreplicas
    pub expected_vreplica_by_vpod: BTreeMap<VPodKey, i32>,
}

impl State {
    /// Free capacity summed over schedulable workers only
    pub fn free_capacity(&self) -> i32 {
        saturating_sum(
            self.schedulable_pods
                .iter()
                .filter_map(|&o| self.free_cap.get(o as usize)),
        )
    }

    /// Free capacity of the worker at `ordinal`.
    /// Workers outside the pool are reported at full capacity.
    pub fn free(&self, ordinal: i32) -> i32 {
        usize::try_from(ordinal)
            .ok()
            .and_then(|o| self.free_cap.get(o))
            .copied()
            .unwrap_or(self.capacity)
    }

    pub fn is_schedulable(&self, ordinal: i32) -> bool {
        self.schedulable_pods.binary_search(&ordinal).is_ok()
    }

    pub fn total_pending(&self) -> i32 {
        saturating_sum(self.pending.values())
    }

    pub fn total_expected_vreplicas(&self) -> i32 {
        saturating_sum(self.expected_vreplica_by_vpod.values())
    }

    /// Name of the worker pod at `ordinal`
    pub fn pod_name(&self, ordinal: i32) -> String {
        ordinal::pod_name(&self.pool_name, ordinal)
    }
}

/// Worker status lookups a build keeps in flight at once
const MAX_CONCURRENT_WORKER_LOOKUPS: usize = 16;

fn saturating_sum<'a>(values: impl Iterator<Item = &'a i32>) -> i32 {
    values.fold(0i32, |total, &v| total.saturating_add(v))
}

/// Builds [`State`] snapshots for one worker pool
///
/// The builder holds no state between calls; the only shared state it
/// touches is the scale cache.
pub struct StateBuilder {
    pool_name: String,
    capacity: i32,
    vpod_lister: Arc<dyn VPodLister>,
    worker_status: Arc<dyn WorkerStatusSource>,
    scale_cache: Arc<ScaleCache>,
}

impl StateBuilder {
    /// Create a new state builder
    pub fn new(
        pool_name: impl Into<String>,
        capacity: i32,
        vpod_lister: Arc<dyn VPodLister>,
        worker_status: Arc<dyn WorkerStatusSource>,
        scale_cache: Arc<ScaleCache>,
    ) -> Result<Self> {
        let pool_name = pool_name.into();

        if pool_name.is_empty() {
            return Err(SchedulerError::invalid_configuration(
                "pool name is empty",
                "Pass the name of the StatefulSet backing the worker pool",
            ));
        }

        if capacity < 0 {
            return Err(SchedulerError::invalid_configuration(
                format!("capacity {} is negative", capacity),
                "Capacity is the number of vreplicas one worker can host and must be zero or more",
            ));
        }

        if scale_cache.pool_name() != pool_name {
            return Err(SchedulerError::invalid_configuration(
                format!(
                    "scale cache tracks pool {} but the builder targets pool {}",
                    scale_cache.pool_name(),
                    pool_name
                ),
                "Create one scale cache per pool and pass the matching one",
            ));
        }

        Ok(Self {
            pool_name,
            capacity,
            vpod_lister,
            worker_status,
            scale_cache,
        })
    }

    pub fn pool_name(&self) -> &str {
        &self.pool_name
    }

    pub fn capacity(&self) -> i32 {
        self.capacity
    }

    /// Build a snapshot of the pool
    pub async fn build(&self) -> Result<State> {
        self.build_with_cancel(&CancellationToken::new()).await
    }

    /// Build a snapshot, giving up as soon as `token` is cancelled
    pub async fn build_with_cancel(&self, token: &CancellationToken) -> Result<State> {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                warn!("State build for pool {} cancelled", self.pool_name);
                Err(SchedulerError::cancelled(&self.pool_name))
            }
            result = self.build_state() => result,
        }
    }

    async fn build_state(&self) -> Result<State> {
        debug!("Building state for pool {}", self.pool_name);

        let replicas = self.scale_cache.get().await?;
        let last_ordinal = replicas - 1;
        let mut free_cap = vec![self.capacity; replicas as usize];

        let vpods = match self.vpod_lister.list().await {
            Ok(vpods) => vpods,
            Err(e @ SchedulerError::WorkloadListFailed { .. }) => return Err(e),
            Err(e) => return Err(SchedulerError::workload_list_failed(e.to_string())),
        };

        let eligible = self.eligible_ordinals(replicas).await;

        let mut pod_spread: BTreeMap<VPodKey, BTreeMap<String, i32>> = BTreeMap::new();
        let mut pending = BTreeMap::new();
        let mut expected_vreplica_by_vpod = BTreeMap::new();

        for vpod in &vpods {
            let placed = vpod.total_placed();
            pending.insert(vpod.key.clone(), vpod.vreplicas.saturating_sub(placed).max(0));
            expected_vreplica_by_vpod.insert(vpod.key.clone(), vpod.vreplicas);

            let spread = pod_spread.entry(vpod.key.clone()).or_default();

            for placement in &vpod.placements {
                let ordinal = match parse_ordinal(&self.pool_name, &placement.pod_name) {
                    Some(o) if o < replicas => o as usize,
                    Some(o) => {
                        debug!(
                            "VPod {} has {} vreplicas on {} (ordinal {}) beyond pool size {}",
                            vpod.key, placement.vreplicas, placement.pod_name, o, replicas
                        );
                        continue;
                    }
                    None => {
                        warn!(
                            "VPod {} has a placement on {} which is not a worker of pool {}",
                            vpod.key, placement.pod_name, self.pool_name
                        );
                        continue;
                    }
                };

                // Capacity is consumed whether or not the worker is schedulable
                free_cap[ordinal] = free_cap[ordinal].saturating_sub(placement.vreplicas);

                if eligible[ordinal] {
                    let on_pod = spread.entry(placement.pod_name.clone()).or_insert(0);
                    *on_pod = on_pod.saturating_add(placement.vreplicas);
                }
            }
        }

        let schedulable_pods: Vec<i32> = (0..replicas)
            .filter(|&o| eligible[o as usize])
            .collect();

        let state = State {
            pool_name: self.pool_name.clone(),
            capacity: self.capacity,
            replicas,
            last_ordinal,
            free_cap,
            schedulable_pods,
            pod_spread,
            pending,
            expected_vreplica_by_vpod,
        };

        info!(
            "Built state for pool {}: {} replicas, {} schedulable, {} vpods, free capacity {}",
            self.pool_name,
            state.replicas,
            state.schedulable_pods.len(),
            vpods.len(),
            state.free_capacity()
        );

        Ok(state)
    }

    /// Eligibility of every ordinal in the pool. Lookup failures count as ineligible.
    async fn eligible_ordinals(&self, replicas: i32) -> Vec<bool> {
        let lookups = (0..replicas).map(|o| {
            let pod_name = ordinal::pod_name(&self.pool_name, o);
            async move {
                let status = self.worker_status.worker_status(&pod_name).await;
                (pod_name, status)
            }
        });

        stream::iter(lookups)
            .buffered(MAX_CONCURRENT_WORKER_LOOKUPS)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .map(|(pod_name, status)| match status {
                Ok(WorkerStatus::Eligible { .. }) => true,
                Ok(WorkerStatus::Pending) => {
                    debug!("Worker {} is not bound to a node yet", pod_name);
                    false
                }
                Ok(WorkerStatus::Missing) => {
                    debug!("Worker {} has no pod", pod_name);
                    false
                }
                Err(e) => {
                    warn!("Treating worker {} as unschedulable: {}", pod_name, e);
                    false
                }
            })
            .collect()
    }
}
