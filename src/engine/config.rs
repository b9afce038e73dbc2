//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// How a session schedules its rule × tuple units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ExecutionMode {
    /// One thread, rules in repository order, tuples in odometer order.
    #[default]
    Sequential,
    /// A fixed set of worker threads fed through a bounded queue.
    Parallel {
        /// Number of worker threads per session execution.
        workers: usize,
        /// Maximum queued units before the producer blocks.
        queue_capacity: usize,
    },
}

/// Engine-wide settings. Chosen once when the engine is built.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub mode: ExecutionMode,
}

impl EngineConfig {
    const DEFAULT_QUEUE_CAPACITY: usize = 1024;

    /// Sequential evaluation.
    #[must_use]
    pub fn sequential() -> Self {
        Self::default()
    }

    /// Parallel evaluation on `workers` threads with the default queue size.
    #[must_use]
    pub const fn parallel(workers: usize) -> Self {
        Self {
            mode: ExecutionMode::Parallel {
                workers,
                queue_capacity: Self::DEFAULT_QUEUE_CAPACITY,
            },
        }
    }

    /// Parses and validates a JSON configuration.
    ///
    /// # Errors
    /// `InvalidConfig` for malformed JSON or out-of-range values.
    pub fn from_json(json: &str) -> Result<Self, ValidationError> {
        let config: Self = serde_json::from_str(json).map_err(|e| ValidationError::InvalidConfig {
            reason: e.to_string(),
        })?;
        config.validate()
    }

    /// Checks value ranges.
    ///
    /// # Errors
    /// `InvalidConfig` when a parallel mode has zero workers or zero queue
    /// capacity.
    pub fn validate(self) -> Result<Self, ValidationError> {
        if let ExecutionMode::Parallel {
            workers,
            queue_capacity,
        } = self.mode
        {
            if workers == 0 {
                return Err(ValidationError::InvalidConfig {
                    reason: "parallel mode needs at least one worker".to_string(),
                });
            }
            if queue_capacity == 0 {
                return Err(ValidationError::InvalidConfig {
                    reason: "queue_capacity must be at least 1".to_string(),
                });
            }
        }
        Ok(self)
    }
}
