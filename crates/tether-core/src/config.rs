use serde::{Deserialize, Serialize};

/// How identifiers from different paths are grouped into fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchPolicy {
    /// One fetch per (path, collection, options), shared by every document
    /// in the call.
    #[default]
    PerPath,
    /// Paths that target the same collection with identical options share
    /// one fetch.
    BySignature,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PopulateConfig {
    /// Drop identifiers with no matching document from populated arrays.
    /// When false they stay in place as raw identifiers.
    pub compact_missing: bool,
    pub batch_policy: BatchPolicy,
    /// Upper bound on fetches in flight for one population call.
    pub max_concurrent_batches: usize,
}

impl Default for PopulateConfig {
    fn default() -> Self {
        Self {
            compact_missing: true,
            batch_policy: BatchPolicy::PerPath,
            max_concurrent_batches: 8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let config: PopulateConfig =
            serde_json::from_str(r#"{ "batch_policy": "by_signature" }"#).unwrap();
        assert_eq!(config.batch_policy, BatchPolicy::BySignature);
        assert!(config.compact_missing);
        assert_eq!(config.max_concurrent_batches, 8);
    }
}
