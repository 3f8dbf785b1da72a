#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::warn;
use typed_builder::TypedBuilder;

use crate::constants::{DEFAULT_MAX_DEPTH, DEFAULT_MAX_MARK};

/// Per-pass knobs of the grading core.
///
/// The core never reads global configuration on its own; callers pass these
/// in, typically via [`GradingOptions::from_config`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TypedBuilder)]
#[builder(doc)]
pub struct GradingOptions {
    /// Maximum mark configured for the question in the LMS.
    #[builder(default = DEFAULT_MAX_MARK)]
    max_mark:  f64,
    /// Deepest combine nesting accepted before a task counts as malformed.
    #[builder(default = DEFAULT_MAX_DEPTH)]
    max_depth: usize,
}

impl GradingOptions {
    /// Options with the given maximum mark and the default depth limit.
    pub fn new(max_mark: f64) -> Self {
        Self::default().with_max_mark(max_mark)
    }

    /// Options taken from the environment-backed configuration.
    pub fn from_config() -> Self {
        let cfg = get();
        Self {
            max_mark:  cfg.max_mark(),
            max_depth: cfg.max_depth(),
        }
    }

    /// Maximum mark configured for the question.
    pub fn max_mark(&self) -> f64 {
        self.max_mark
    }

    /// Deepest accepted nesting.
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Returns a copy with another maximum mark. Marks that are not finite
    /// and positive are ignored.
    pub fn with_max_mark(mut self, max_mark: f64) -> Self {
        if is_valid_max_mark(max_mark) {
            self.max_mark = max_mark;
        } else {
            warn!(max_mark, kept = self.max_mark, "ignoring invalid maximum mark");
        }
        self
    }
}

impl Default for GradingOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// A maximum mark the LMS can award: finite and above zero.
pub fn is_valid_max_mark(mark: f64) -> bool {
    mark.is_finite() && mark > 0.0
}

/// Configuration shared across the crate, sourced from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigState {
    /// Default maximum mark (`PROFORMA_MAX_MARK`).
    max_mark:  f64,
    /// Tree depth limit (`PROFORMA_MAX_DEPTH`).
    max_depth: usize,
}

impl ConfigState {
    /// Reads the configuration from environment variables, falling back to
    /// defaults for missing or unusable values.
    fn new() -> Self {
        let max_mark = read_env("PROFORMA_MAX_MARK", DEFAULT_MAX_MARK, |mark: &f64| {
            is_valid_max_mark(*mark)
        });
        let max_depth = read_env("PROFORMA_MAX_DEPTH", DEFAULT_MAX_DEPTH, |depth: &usize| *depth > 0);
        Self {
            max_mark,
            max_depth,
        }
    }

    /// Default maximum mark.
    pub fn max_mark(&self) -> f64 {
        self.max_mark
    }

    /// Tree depth limit.
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }
}

/// Shared configuration handle used throughout the crate.
#[derive(Clone, Debug)]
pub struct ConfigHandle(Arc<ConfigState>);

impl std::ops::Deref for ConfigHandle {
    type Target = ConfigState;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Global storage for the lazily constructed configuration state.
static CONFIG_SLOT: OnceLock<Mutex<Option<Arc<ConfigState>>>> = OnceLock::new();

/// Returns the mutex guarding the global configuration slot.
fn slot() -> &'static Mutex<Option<Arc<ConfigState>>> {
    CONFIG_SLOT.get_or_init(|| Mutex::new(None))
}

/// Builds a fresh configuration instance and wraps it in an `Arc`.
fn build_default() -> Arc<ConfigState> {
    Arc::new(ConfigState::new())
}

/// Ensure the global configuration has been initialized and return a handle.
pub fn ensure_initialized() -> ConfigHandle {
    let mut guard = slot().lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(cfg) = guard.as_ref() {
        return ConfigHandle(Arc::clone(cfg));
    }

    let cfg = build_default();
    *guard = Some(Arc::clone(&cfg));
    ConfigHandle(cfg)
}

/// Returns the active configuration, initializing it on demand.
pub fn get() -> ConfigHandle {
    ensure_initialized()
}

/// Re-reads the environment, replacing the active configuration.
pub fn reload() -> ConfigHandle {
    let cfg = build_default();
    let mut guard = slot().lock().unwrap_or_else(PoisonError::into_inner);
    *guard = Some(Arc::clone(&cfg));
    ConfigHandle(cfg)
}

/// Parses an environment variable, falling back to `default` when it is
/// missing, unparsable, or rejected by `valid`.
fn read_env<T, V>(name: &str, default: T, valid: V) -> T
where
    T: std::str::FromStr + Copy + std::fmt::Debug,
    V: Fn(&T) -> bool,
{
    let Ok(raw) = std::env::var(name) else {
        return default;
    };
    match raw.trim().parse::<T>() {
        Ok(value) if valid(&value) => value,
        _ => {
            warn!(variable = name, value = %raw, ?default, "ignoring invalid setting");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_default_to_constants() {
        let options = GradingOptions::default();
        assert_eq!(options.max_mark(), DEFAULT_MAX_MARK);
        assert_eq!(options.max_depth(), DEFAULT_MAX_DEPTH);
        assert_eq!(GradingOptions::new(4.0).with_max_mark(2.5).max_mark(), 2.5);
    }

    #[test]
    fn invalid_settings_fall_back() {
        let valid = |mark: &f64| is_valid_max_mark(*mark);
        assert_eq!(read_env("PROFORMA_TEST_UNSET_VARIABLE", 3.0, valid), 3.0);
    }

    #[test]
    fn unusable_maximum_marks_are_ignored() {
        for mark in [0.0, -2.0, f64::NAN, f64::INFINITY] {
            assert!(!is_valid_max_mark(mark), "accepted {mark}");
            assert_eq!(GradingOptions::new(4.0).with_max_mark(mark).max_mark(), 4.0);
            assert_eq!(GradingOptions::new(mark).max_mark(), DEFAULT_MAX_MARK);
        }
        assert_eq!(GradingOptions::new(0.5).max_mark(), 0.5);
    }
}
