use crate::readiness::{WorkerStatus, WorkerStatusSource};
use crate::scale_cache::ScaleSource;
use crate::{Result, SchedulerError};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::Pod;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

/// Lightweight HTTP client reading worker pool objects from the API server
///
/// Serves as the pool-size source (StatefulSet replicas) and the worker
/// status source (pod node binding) for one namespace.
pub struct ApiClient {
    base_url: String,
    namespace: String,
    client: Client,
}

/// Declared replicas of a StatefulSet. The API server defaults a missing value to 1.
pub fn statefulset_replicas(statefulset: &StatefulSet) -> i32 {
    statefulset
        .spec
        .as_ref()
        .and_then(|s| s.replicas)
        .unwrap_or(1)
}

impl ApiClient {
    pub fn new(base_url: &str, namespace: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            namespace: namespace.to_string(),
            client: Client::new(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// GET /apis/apps/v1/namespaces/{namespace}/statefulsets/{name}
    pub async fn get_statefulset(&self, name: &str) -> std::result::Result<Option<StatefulSet>, String> {
        let url = format!(
            "{}/apis/apps/v1/namespaces/{}/statefulsets/{}",
            self.base_url, self.namespace, name
        );
        self.get_optional(&url).await
    }

    /// GET /api/v1/namespaces/{namespace}/pods/{name}
    pub async fn get_pod(&self, name: &str) -> std::result::Result<Option<Pod>, String> {
        let url = format!(
            "{}/api/v1/namespaces/{}/pods/{}",
            self.base_url, self.namespace, name
        );
        self.get_optional(&url).await
    }

    /// GET a single object, mapping 404 to `None`
    async fn get_optional<T: DeserializeOwned>(&self, url: &str) -> std::result::Result<Option<T>, String> {
        debug!("GET {}", url);

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("HTTP request failed: {}", e))?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(format!("GET {} failed with status {}: {}", url, status, body));
        }

        resp.json::<T>()
            .await
            .map(Some)
            .map_err(|e| format!("Failed to parse response from {}: {}", url, e))
    }
}

#[async_trait]
impl ScaleSource for ApiClient {
    async fn get_scale(&self, pool_name: &str) -> Result<i32> {
        match self.get_statefulset(pool_name).await {
            Ok(Some(statefulset)) => Ok(statefulset_replicas(&statefulset)),
            Ok(None) => Err(SchedulerError::pool_unavailable(
                pool_name,
                format!("statefulset {}/{} not found", self.namespace, pool_name),
            )),
            Err(message) => Err(SchedulerError::pool_unavailable(pool_name, message)),
        }
    }
}

#[async_trait]
impl WorkerStatusSource for ApiClient {
    async fn worker_status(&self, pod_name: &str) -> Result<WorkerStatus> {
        self.get_pod(pod_name)
            .await
            .map(|pod| WorkerStatus::from_pod(pod.as_ref()))
            .map_err(|message| SchedulerError::worker_lookup_failed(pod_name, message))
    }
}
