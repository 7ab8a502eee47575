//! Error taxonomy (§7): configuration, graph, and the combined top-level error.

use thiserror::Error;

/// Errors raised validating a [`crate::config::SimConfig`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("work_hours_per_day must be in 1..=24, got {0}")]
    WorkHoursOutOfRange(f64),

    #[error("work_days_per_month must be in 1..=31, got {0}")]
    WorkDaysOutOfRange(u32),

    #[error("num_workers must be >= 1, got {0}")]
    NoWorkers(u32),

    #[error("target_output must be >= 1, got {0}")]
    NoTargetOutput(u32),

    #[error("rest_time_threshold must be >= 1 minute, got {0}")]
    RestTimeThresholdTooLow(f64),

    #[error("rest_duration_time must be >= 0, got {0}")]
    NegativeRestDurationTime(f64),

    #[error("rest_load_threshold must be in 1..=10, got {0}")]
    RestLoadThresholdOutOfRange(u32),

    #[error("rest_duration_load must be >= 0, got {0}")]
    NegativeRestDurationLoad(f64),

    #[error("critical_equipment capacity for {name:?} must be >= 1, got {capacity}")]
    EquipmentCapacityZero { name: String, capacity: u32 },
}

/// Errors raised validating a [`crate::process::ProcessDefinition`] (§4.2, Invariant 1).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("process definition has no nodes")]
    EmptyGraph,

    #[error("step {step_id:?} lists unknown predecessor {predecessor:?}")]
    UnknownPredecessor { step_id: String, predecessor: String },

    #[error("duplicate step_id {0:?}")]
    DuplicateStepId(String),

    #[error("cycle detected; at least one step on the cycle is {step_id:?}")]
    Cycle { step_id: String },

    #[error(
        "step {step_id:?} is op_type M with rework_prob >= 1.0 ({rework_prob}); this never reaches a passing draw and would loop forever"
    )]
    DivergentRework { step_id: String, rework_prob: f64 },

    #[error("step {step_id:?} has required_workers == 0")]
    NoWorkersRequired { step_id: String },

    #[error("step {step_id:?} has std_duration < 0 ({std_duration})")]
    NegativeDuration { step_id: String, std_duration: f64 },

    #[error("step {step_id:?} has time_variance < 0 ({time_variance})")]
    NegativeVariance { step_id: String, time_variance: f64 },

    #[error("step {step_id:?} has rework_prob outside 0..=1 ({rework_prob})")]
    ReworkProbOutOfRange { step_id: String, rework_prob: f64 },

    #[error("step {step_id:?} has work_load_score outside 1..=10 ({work_load_score})")]
    WorkLoadScoreOutOfRange { step_id: String, work_load_score: u32 },
}

/// Top-level error returned by [`crate::simulate`] before the kernel starts.
///
/// Per §7, both variants short-circuit straight to a `Failed` [`crate::result::SimStatus`]
/// rather than panicking; everything past validation is absorbed into the result.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Graph(#[from] GraphError),
}
