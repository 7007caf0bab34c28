use crate::error::{CoreError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// VPodKey uniquely identifies a VPod within the cluster
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VPodKey {
    /// Namespace of the owning resource
    pub namespace: String,
    /// Resource name
    pub name: String,
}

impl VPodKey {
    /// Create a new VPodKey
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for VPodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl FromStr for VPodKey {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('/') {
            Some((namespace, name))
                if !namespace.is_empty() && !name.is_empty() && !name.contains('/') =>
            {
                Ok(Self::new(namespace, name))
            }
            _ => Err(CoreError::invalid_vpod_key(s)),
        }
    }
}

// Serialized as "namespace/name" so keys can be used as JSON map keys
impl Serialize for VPodKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for VPodKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A number of virtual replicas of one VPod placed on one worker pod
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Placement {
    /// Name of the worker pod hosting the replicas
    pub pod_name: String,
    /// Number of virtual replicas placed on that pod
    pub vreplicas: i32,
}

impl Placement {
    /// Create a new placement
    pub fn new(pod_name: impl Into<String>, vreplicas: i32) -> Self {
        Self {
            pod_name: pod_name.into(),
            vreplicas,
        }
    }
}

/// A workload asking for virtual replicas spread over a worker pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VPod {
    pub key: VPodKey,
    /// Expected number of virtual replicas
    pub vreplicas: i32,
    /// Current placements, in the order the workload reports them
    #[serde(default)]
    pub placements: Vec<Placement>,
}

impl VPod {
    pub fn new(key: VPodKey, vreplicas: i32, placements: Vec<Placement>) -> Self {
        Self {
            key,
            vreplicas,
            placements,
        }
    }

    /// Sum of the virtual replicas over all placements, saturating at the `i32` bounds
    pub fn total_placed(&self) -> i32 {
        self.placements
            .iter()
            .fold(0i32, |total, p| total.saturating_add(p.vreplicas))
    }

    /// Reject negative replica counts
    pub fn validate(&self) -> Result<()> {
        if self.vreplicas < 0 {
            return Err(CoreError::invalid_vpod(
                self.key.to_string(),
                format!("expected vreplicas is negative ({})", self.vreplicas),
                "Set vreplicas to zero or more",
            ));
        }

        if let Some(p) = self.placements.iter().find(|p| p.vreplicas < 0) {
            return Err(CoreError::invalid_vpod(
                self.key.to_string(),
                format!(
                    "placement on {} has negative vreplicas ({})",
                    p.pod_name, p.vreplicas
                ),
                "Placements must carry zero or more vreplicas",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vpod_key_display_and_parse() {
        let key = VPodKey::new("vpod-ns-0", "vpod-name-0");
        assert_eq!(key.to_string(), "vpod-ns-0/vpod-name-0");

        let parsed: VPodKey = "vpod-ns-0/vpod-name-0".parse().unwrap();
        assert_eq!(parsed, key);
    }

    #[test]
    fn test_vpod_key_parse_rejects_malformed() {
        assert!("no-slash".parse::<VPodKey>().is_err());
        assert!("/name".parse::<VPodKey>().is_err());
        assert!("ns/".parse::<VPodKey>().is_err());
        assert!("a/b/c".parse::<VPodKey>().is_err());
    }

    #[test]
    fn test_vpod_key_as_map_key() {
        let mut map = std::collections::BTreeMap::new();
        map.insert(VPodKey::new("ns", "source"), 3);

        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"ns/source":3}"#);
    }

    #[test]
    fn test_total_placed() {
        let vpod = VPod::new(
            VPodKey::new("ns", "source"),
            8,
            vec![Placement::new("pool-0", 1), Placement::new("pool-2", 5)],
        );
        assert_eq!(vpod.total_placed(), 6);

        let empty = VPod::new(VPodKey::new("ns", "empty"), 1, vec![]);
        assert_eq!(empty.total_placed(), 0);
    }

    #[test]
    fn test_total_placed_saturates() {
        let vpod = VPod::new(
            VPodKey::new("ns", "huge"),
            1,
            vec![Placement::new("pool-0", i32::MAX), Placement::new("pool-1", 1)],
        );
        assert_eq!(vpod.total_placed(), i32::MAX);
    }

    #[test]
    fn test_validate() {
        let ok = VPod::new(VPodKey::new("ns", "a"), 1, vec![Placement::new("pool-0", 0)]);
        assert!(ok.validate().is_ok());

        let negative = VPod::new(VPodKey::new("ns", "b"), -1, vec![]);
        assert!(matches!(
            negative.validate(),
            Err(CoreError::InvalidVPod { .. })
        ));

        let bad_placement = VPod::new(VPodKey::new("ns", "c"), 1, vec![Placement::new("pool-0", -2)]);
        assert!(bad_placement.validate().is_err());
    }
}
