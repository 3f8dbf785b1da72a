#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

/// Tolerance used when deciding whether a task's maximum score already matches
/// the configured maximum mark.
pub const SCORE_EPSILON: f64 = 1e-5;

/// Weight of a test-ref or combine-ref that does not declare one.
pub const DEFAULT_WEIGHT: f64 = 1.0;

/// Maximum score a single test result can reach before weighting.
pub const TEST_MAX_SCORE: f64 = 1.0;

/// Default maximum nesting depth accepted when building grading trees.
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// Default maximum mark when neither the caller nor the environment sets one.
pub const DEFAULT_MAX_MARK: f64 = 1.0;

/// Identifier of the synthetic root of every built grading tree.
pub const ROOT_NODE_ID: &str = "root";
