//! Vreplica Scheduler - Scheduling state for virtual replica placement
//!
//! This crate provides:
//! - A cache of the worker pool size
//! - Worker readiness lookups
//! - VPod listing
//! - The state builder producing per-worker free capacity and per-VPod spread

pub mod api_client;
pub mod error;
pub mod fixture;
pub mod ordinal;
pub mod readiness;
pub mod scale_cache;
pub mod state;
pub mod vpod;

// Re-export commonly used types
pub use api_client::ApiClient;
pub use error::{Result, SchedulerError};
pub use fixture::{ClusterFixture, FixtureCluster};
pub use readiness::{PodIndex, WorkerStatus, WorkerStatusSource};
pub use scale_cache::{ScaleCache, ScaleCacheConfig, ScaleSource, StaticScaleSource};
pub use state::{State, StateBuilder};
pub use vpod::{lookup_vpod, VPodClient, VPodLister};
