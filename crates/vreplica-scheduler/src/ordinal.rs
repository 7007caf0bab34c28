//! Worker pods are named `{pool}-{ordinal}`, the StatefulSet convention.

/// Extract the ordinal from a worker pod name.
///
/// Returns `None` when the name does not belong to `pool_name` or the suffix
/// is not a non-negative integer that fits an `i32`.
pub fn parse_ordinal(pool_name: &str, pod_name: &str) -> Option<i32> {
    let suffix = pod_name.strip_prefix(pool_name)?.strip_prefix('-')?;

    // Digits only: str::parse accepts a leading '+'
    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    suffix.parse::<i32>().ok()
}

/// Name of the worker pod at `ordinal`
pub fn pod_name(pool_name: &str, ordinal: i32) -> String {
    format!("{}-{}", pool_name, ordinal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ordinal() {
        assert_eq!(parse_ordinal("statefulset-name", "statefulset-name-0"), Some(0));
        assert_eq!(parse_ordinal("statefulset-name", "statefulset-name-12"), Some(12));
    }

    #[test]
    fn test_parse_ordinal_rejects_foreign_and_malformed() {
        assert_eq!(parse_ordinal("pool", "other-0"), None);
        assert_eq!(parse_ordinal("pool", "pool"), None);
        assert_eq!(parse_ordinal("pool", "pool-"), None);
        assert_eq!(parse_ordinal("pool", "pool-x"), None);
        assert_eq!(parse_ordinal("pool", "pool-+1"), None);
        assert_eq!(parse_ordinal("pool", "pool--1"), None);
        assert_eq!(parse_ordinal("pool", "pool-99999999999"), None);
        // A longer pool name sharing the prefix is not ours
        assert_eq!(parse_ordinal("pool", "pool-a-1"), None);
    }

    #[test]
    fn test_pod_name_round_trip() {
        let name = pod_name("statefulset-name", 3);
        assert_eq!(name, "statefulset-name-3");
        assert_eq!(parse_ordinal("statefulset-name", &name), Some(3));
    }
}
