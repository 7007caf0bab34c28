// Allow unused assignments for diagnostic fields - they're used by the macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Scheduler error type
#[derive(Error, Debug, Diagnostic)]
pub enum SchedulerError {
    /// The worker pool size could not be resolved
    #[error("Worker pool {pool_name} unavailable: {message}")]
    #[diagnostic(
        code(scheduler::pool_unavailable),
        help("Check that the StatefulSet exists and the API server is reachable, then retry")
    )]
    PoolUnavailable {
        pool_name: String,
        message: String,
    },

    /// The VPod listing failed
    #[error("Failed to list VPods: {message}")]
    #[diagnostic(
        code(scheduler::workload_list_failed),
        help("The VPod source could not be enumerated. Retry on the next scheduling cycle")
    )]
    WorkloadListFailed {
        message: String,
    },

    /// A worker status lookup failed
    #[error("Failed to look up worker {pod_name}: {message}")]
    #[diagnostic(
        code(scheduler::worker_lookup_failed),
        help("Check that the API server is reachable")
    )]
    WorkerLookupFailed {
        pod_name: String,
        message: String,
    },

    /// Caller supplied contradictory parameters
    #[error("Invalid configuration: {message}")]
    #[diagnostic(
        code(scheduler::invalid_configuration),
        help("{suggestion}")
    )]
    InvalidConfiguration {
        message: String,
        suggestion: String,
    },

    /// The build was cancelled by the caller
    #[error("State build for pool {pool_name} was cancelled")]
    #[diagnostic(
        code(scheduler::cancelled),
        help("No snapshot was produced. Build again once the caller is ready")
    )]
    Cancelled {
        pool_name: String,
    },

    /// Core error
    #[error("Core error: {0}")]
    #[diagnostic(
        code(scheduler::core_error),
        help("This is an internal error")
    )]
    CoreError(#[from] vreplica_core::CoreError),
}

/// Result type for scheduler operations
pub type Result<T> = std::result::Result<T, SchedulerError>;

impl SchedulerError {
    /// Create a PoolUnavailable error
    pub fn pool_unavailable(pool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PoolUnavailable {
            pool_name: pool_name.into(),
            message: message.into(),
        }
    }

    /// Create a WorkloadListFailed error
    pub fn workload_list_failed(message: impl Into<String>) -> Self {
        Self::WorkloadListFailed {
            message: message.into(),
        }
    }

    /// Create a WorkerLookupFailed error
    pub fn worker_lookup_failed(pod_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::WorkerLookupFailed {
            pod_name: pod_name.into(),
            message: message.into(),
        }
    }

    /// Create an InvalidConfiguration error
    pub fn invalid_configuration(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a Cancelled error
    pub fn cancelled(pool_name: impl Into<String>) -> Self {
        Self::Cancelled {
            pool_name: pool_name.into(),
        }
    }
}
