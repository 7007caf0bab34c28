use crate::{Result, SchedulerError};
use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Authoritative source of a worker pool's declared size
#[async_trait]
pub trait ScaleSource: Send + Sync {
    /// Current replica count of the named pool
    async fn get_scale(&self, pool_name: &str) -> Result<i32>;
}

/// Configuration for the scale cache
#[derive(Debug, Clone)]
pub struct ScaleCacheConfig {
    /// Maximum age of a cached size before `get` forces a lookup
    pub refresh_period: Duration,
}

impl Default for ScaleCacheConfig {
    fn default() -> Self {
        Self {
            refresh_period: Duration::from_secs(5 * 60),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ScaleEntry {
    replicas: i32,
    refreshed_at: Instant,
}

/// Result of one lookup and the moment the source answered
#[derive(Debug, Clone)]
struct LookupOutcome {
    result: std::result::Result<i32, String>,
    completed_at: Instant,
}

/// Lookup outcome shared between every caller waiting on it
type LookupFuture = Shared<BoxFuture<'static, LookupOutcome>>;

struct InFlight {
    id: u64,
    lookup: LookupFuture,
}

#[derive(Default)]
struct CacheState {
    entry: Option<ScaleEntry>,
    in_flight: Option<InFlight>,
    next_id: u64,
}

/// Memoizes the size of one worker pool.
///
/// `get` serves the cached size while it is younger than the refresh period.
/// A miss starts a single lookup against the [`ScaleSource`]; callers that
/// miss while it is running wait on the same lookup and see the same result.
/// A failed lookup leaves the last good size in place.
pub struct ScaleCache {
    pool_name: String,
    source: Arc<dyn ScaleSource>,
    config: ScaleCacheConfig,
    state: Mutex<CacheState>,
}

impl ScaleCache {
    /// Create a new cache for `pool_name`
    pub fn new(
        pool_name: impl Into<String>,
        source: Arc<dyn ScaleSource>,
        config: ScaleCacheConfig,
    ) -> Self {
        Self {
            pool_name: pool_name.into(),
            source,
            config,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn pool_name(&self) -> &str {
        &self.pool_name
    }

    pub fn config(&self) -> &ScaleCacheConfig {
        &self.config
    }

    /// Current pool size, looked up only when the cached value is missing or stale
    pub async fn get(&self) -> Result<i32> {
        let (id, lookup) = {
            let mut state = self.state.lock().await;
            self.settle_finished(&mut state);
            if let Some(entry) = state.entry {
                if entry.refreshed_at.elapsed() < self.config.refresh_period {
                    return Ok(entry.replicas);
                }
            }
            self.join_or_start(&mut state)
        };

        self.complete(id, lookup).await
    }

    /// Look the pool size up now, regardless of the cached value's age
    pub async fn refresh(&self) -> Result<i32> {
        let (id, lookup) = {
            let mut state = self.state.lock().await;
            self.settle_finished(&mut state);
            self.join_or_start(&mut state)
        };

        self.complete(id, lookup).await
    }

    /// Drop the cached size so the next `get` performs a lookup
    pub async fn invalidate(&self) {
        self.state.lock().await.entry = None;
        debug!("Invalidated cached scale for pool {}", self.pool_name);
    }

    /// Last successfully looked-up size, without triggering a lookup
    pub async fn cached(&self) -> Option<i32> {
        self.state.lock().await.entry.map(|e| e.replicas)
    }

    /// Refresh the cache every refresh period until the token is cancelled
    pub async fn run(&self, token: CancellationToken) {
        if self.config.refresh_period.is_zero() {
            warn!(
                "Scale cache for pool {} has a zero refresh period, background refresh disabled",
                self.pool_name
            );
            return;
        }

        info!(
            "Starting scale cache refresher for pool {} (interval: {:?})",
            self.pool_name, self.config.refresh_period
        );

        let mut interval = tokio::time::interval(self.config.refresh_period);

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("Scale cache refresher for pool {} shutting down", self.pool_name);
                    return;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.refresh().await {
                        warn!("Background scale refresh failed: {}", e);
                    }
                }
            }
        }
    }

    /// Record a lookup that finished after all of its waiters went away.
    ///
    /// The outcome keeps its completion time, so an old answer is already
    /// stale when the next caller sees it.
    fn settle_finished(&self, state: &mut CacheState) {
        let finished = state
            .in_flight
            .as_ref()
            .and_then(|f| f.lookup.peek().map(|outcome| (f.id, outcome.clone())));

        if let Some((id, outcome)) = finished {
            debug!("Recording abandoned scale lookup for pool {}", self.pool_name);
            self.record(state, id, &outcome);
        }
    }

    /// Join the running lookup, or start one. Must be called with the state locked
    /// and after `settle_finished`, so only a pending lookup is joined.
    fn join_or_start(&self, state: &mut CacheState) -> (u64, LookupFuture) {
        if let Some(in_flight) = &state.in_flight {
            debug!("Joining in-flight scale lookup for pool {}", self.pool_name);
            return (in_flight.id, in_flight.lookup.clone());
        }

        let id = state.next_id;
        state.next_id += 1;

        let source = Arc::clone(&self.source);
        let pool_name = self.pool_name.clone();
        let lookup = async move {
            debug!("Looking up scale for pool {}", pool_name);
            let result = match source.get_scale(&pool_name).await {
                Ok(replicas) if replicas < 0 => {
                    Err(format!("negative replica count {}", replicas))
                }
                Ok(replicas) => Ok(replicas),
                Err(SchedulerError::PoolUnavailable { message, .. }) => Err(message),
                Err(e) => Err(e.to_string()),
            };
            LookupOutcome {
                result,
                completed_at: Instant::now(),
            }
        }
        .boxed()
        .shared();

        state.in_flight = Some(InFlight {
            id,
            lookup: lookup.clone(),
        });

        (id, lookup)
    }

    /// Await a lookup and, if it is still the current one, record its outcome
    async fn complete(&self, id: u64, lookup: LookupFuture) -> Result<i32> {
        let outcome = lookup.await;
        self.record(&mut *self.state.lock().await, id, &outcome);

        outcome
            .result
            .map_err(|message| SchedulerError::pool_unavailable(&self.pool_name, message))
    }

    /// Clear the in-flight slot for lookup `id` and keep its size on success
    fn record(&self, state: &mut CacheState, id: u64, outcome: &LookupOutcome) {
        if !state.in_flight.as_ref().is_some_and(|f| f.id == id) {
            return;
        }
        state.in_flight = None;

        match &outcome.result {
            Ok(replicas) => {
                debug!("Pool {} has {} replicas", self.pool_name, replicas);
                state.entry = Some(ScaleEntry {
                    replicas: *replicas,
                    refreshed_at: outcome.completed_at,
                });
            }
            Err(message) => {
                warn!(
                    "Scale lookup for pool {} failed, keeping previous value {:?}: {}",
                    self.pool_name,
                    state.entry.map(|e| e.replicas),
                    message
                );
            }
        }
    }
}

struct StaticScale {
    replicas: i32,
    failure: Option<String>,
}

/// In-memory scale source with an adjustable size
///
/// Counts lookups and can be told to fail or to take a while to answer.
pub struct StaticScaleSource {
    scale: RwLock<StaticScale>,
    latency: Duration,
    lookups: AtomicUsize,
}

impl StaticScaleSource {
    pub fn new(replicas: i32) -> Self {
        Self {
            scale: RwLock::new(StaticScale {
                replicas,
                failure: None,
            }),
            latency: Duration::ZERO,
            lookups: AtomicUsize::new(0),
        }
    }

    /// Delay every lookup by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub async fn set_replicas(&self, replicas: i32) {
        self.scale.write().await.replicas = replicas;
    }

    /// Make lookups fail with `message` until `clear_failure` is called
    pub async fn fail_with(&self, message: impl Into<String>) {
        self.scale.write().await.failure = Some(message.into());
    }

    pub async fn clear_failure(&self) {
        self.scale.write().await.failure = None;
    }

    /// Number of lookups served so far
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScaleSource for StaticScaleSource {
    async fn get_scale(&self, pool_name: &str) -> Result<i32> {
        self.lookups.fetch_add(1, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let scale = self.scale.read().await;
        match &scale.failure {
            Some(message) => Err(SchedulerError::pool_unavailable(pool_name, message.clone())),
            None => Ok(scale.replicas),
        }
    }
}
