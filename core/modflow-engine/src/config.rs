use serde::{Deserialize, Serialize};

/// Rule evaluator configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Maximum propagation depth below the root event.
    /// `None` uses the number of relationships in the graph.
    pub max_depth: Option<usize>,
    /// Budget for one root event and everything it propagates to (ms).
    pub timeout_ms: u64,
    /// Fold item-sourced increments and decrements into one mutation per
    /// target record instead of one per array element.
    pub coalesce_item_arithmetic: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_depth: None,
            timeout_ms: 30_000,
            coalesce_item_arithmetic: false,
        }
    }
}
