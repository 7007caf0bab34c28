//! Vreplica Core - Data model for virtual replica placement
//!
//! This crate provides:
//! - VPod keys, placements and workloads
//! - Error types with miette diagnostics
//! - Serialization helpers

pub mod error;
pub mod types;

// Re-export commonly used types
pub use error::{CoreError, Result};
pub use types::{Placement, VPod, VPodKey};

fn serde_failure<E>(action: &str, format: &str, e: E) -> CoreError
where
    E: std::error::Error + Send + Sync + 'static,
{
    CoreError::serialization_error(
        format!("Failed to {} {}: {}", action, format, e),
        Some(Box::new(e)),
    )
}

/// Compact JSON, as printed by `vreplica snapshot`
pub fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| serde_failure("serialize", "JSON", e))
}

/// Indented JSON for snapshots meant to be read by people
pub fn to_json_pretty<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| serde_failure("serialize", "JSON", e))
}

/// Parse a [`VPod`] (or any other serde type) from JSON.
/// A malformed [`VPodKey`] surfaces as a serialization error.
pub fn from_json<T: for<'de> serde::Deserialize<'de>>(data: &str) -> Result<T> {
    serde_json::from_str(data).map_err(|e| serde_failure("deserialize", "JSON", e))
}

pub fn to_yaml<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_yaml::to_string(value).map_err(|e| serde_failure("serialize", "YAML", e))
}

/// Parse YAML. Cluster fixtures are read through this, and since YAML is a
/// superset of JSON it accepts JSON fixtures as well.
pub fn from_yaml<T: for<'de> serde::Deserialize<'de>>(data: &str) -> Result<T> {
    serde_yaml::from_str(data).map_err(|e| serde_failure("deserialize", "YAML", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_serialization() {
        let vpod = VPod::new(
            VPodKey::new("vpod-ns", "vpod-name"),
            1,
            vec![Placement::new("statefulset-name-0", 1)],
        );

        let json = to_json(&vpod).unwrap();
        assert!(json.contains("\"podName\":\"statefulset-name-0\""));
        assert!(json.contains("\"key\":\"vpod-ns/vpod-name\""));

        let deserialized: VPod = from_json(&json).unwrap();
        assert_eq!(deserialized, vpod);
    }

    #[test]
    fn test_yaml_placements_default_empty() {
        let yaml = "key: ns/source\nvreplicas: 2\n";
        let vpod: VPod = from_yaml(yaml).unwrap();
        assert_eq!(vpod.key, VPodKey::new("ns", "source"));
        assert!(vpod.placements.is_empty());

        assert!(to_yaml(&vpod).unwrap().contains("ns/source"));
    }

    #[test]
    fn test_from_json_invalid_key() {
        let result: Result<VPod> = from_json(r#"{"key":"broken","vreplicas":1}"#);
        assert!(matches!(result, Err(CoreError::SerializationError { .. })));
    }

    #[test]
    fn test_from_yaml_accepts_json() {
        let vpod: VPod = from_yaml(r#"{"key":"ns/source","vreplicas":3}"#).unwrap();
        assert_eq!(vpod.vreplicas, 3);

        let err = from_yaml::<VPod>("key: [").unwrap_err();
        assert!(err.to_string().contains("YAML"));
    }
}
