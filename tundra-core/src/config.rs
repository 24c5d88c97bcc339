//! Engine Configuration
//!
//! A small serde-backed settings struct. Every field has a default, so an
//! empty JSON object is a valid configuration.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Runtime settings for the engine and its interpreter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Expose the helper functions (`html`, `sum`, `sleep`, ...) to cells.
    pub helpers: bool,

    /// Maximum nesting of function calls inside one evaluation.
    /// Deeper recursion rejects the cell instead of overflowing the stack.
    pub max_call_depth: usize,

    /// Include rendered values in trace-level settle logs.
    pub trace_values: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            helpers: true,
            max_call_depth: 256,
            trace_values: false,
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_call_depth == 0 {
            return Err(ConfigError::Invalid(
                "max_call_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
