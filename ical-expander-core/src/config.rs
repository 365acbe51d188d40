//! Expander options.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ExpanderError, ExpanderResult};

/// Occurrences evaluated per recurring event when nothing else is configured.
pub const DEFAULT_MAX_ITERATIONS: usize = 1000;

/// Construction-time options, loadable from TOML:
///
/// ```toml
/// max_iterations = 500
/// skip_invalid_dates = true
/// convert_output = false
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExpanderOptions {
    /// Cap on occurrences evaluated per recurring event. 0 disables the cap.
    pub max_iterations: usize,
    /// Drop events whose start or end cannot be read instead of failing.
    pub skip_invalid_dates: bool,
    /// Return property maps instead of borrowed events.
    pub convert_output: bool,
}

impl Default for ExpanderOptions {
    fn default() -> Self {
        ExpanderOptions {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            skip_invalid_dates: false,
            convert_output: false,
        }
    }
}

impl ExpanderOptions {
    /// Load options from a TOML file.
    pub fn load(path: &Path) -> ExpanderResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> ExpanderResult<Self> {
        toml::from_str(content).map_err(|e| ExpanderError::Config(e.to_string()))
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_skip_invalid_dates(mut self, skip: bool) -> Self {
        self.skip_invalid_dates = skip;
        self
    }

    pub fn with_convert_output(mut self, convert: bool) -> Self {
        self.convert_output = convert;
        self
    }

    /// The cap as an optional limit.
    pub fn iteration_limit(&self) -> Option<usize> {
        (self.max_iterations != 0).then_some(self.max_iterations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ExpanderOptions::default();
        assert_eq!(options.max_iterations, 1000);
        assert!(!options.skip_invalid_dates);
        assert!(!options.convert_output);
        assert_eq!(options.iteration_limit(), Some(1000));
    }

    #[test]
    fn test_from_toml_fills_missing_fields() {
        let options = ExpanderOptions::from_toml("skip_invalid_dates = true\n").expect("Should parse");
        assert_eq!(
            options,
            ExpanderOptions::default().with_skip_invalid_dates(true)
        );
    }

    #[test]
    fn test_zero_disables_cap() {
        let options = ExpanderOptions::from_toml("max_iterations = 0\n").expect("Should parse");
        assert_eq!(options.iteration_limit(), None);
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let err = ExpanderOptions::from_toml("max_iteration = 5\n").expect_err("Should reject");
        assert!(matches!(err, ExpanderError::Config(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = ExpanderOptions::load(Path::new("/nonexistent/expander.toml"))
            .expect_err("Should fail");
        assert!(matches!(err, ExpanderError::Io(_)));
    }
}
