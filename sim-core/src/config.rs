//! Run configuration (§3 `SimConfig`, §6.3).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Shift, staffing, and policy parameters for one simulation run.
///
/// Loadable from YAML or JSON (A.3); validated once before the kernel starts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimConfig {
    pub work_hours_per_day: f64,
    pub work_days_per_month: u32,
    pub num_workers: u32,
    pub target_output: u32,

    #[serde(default)]
    pub critical_equipment: BTreeMap<String, u32>,

    #[serde(default = "default_rest_time_threshold")]
    pub rest_time_threshold: f64,
    #[serde(default = "default_rest_duration_time")]
    pub rest_duration_time: f64,
    #[serde(default = "default_rest_load_threshold")]
    pub rest_load_threshold: u32,
    #[serde(default = "default_rest_duration_load")]
    pub rest_duration_load: f64,

    #[serde(default = "default_pipeline_mode")]
    pub pipeline_mode: bool,

    #[serde(default)]
    pub random_seed: Option<u64>,
}

fn default_rest_time_threshold() -> f64 {
    120.0
}
fn default_rest_duration_time() -> f64 {
    10.0
}
fn default_rest_load_threshold() -> u32 {
    8
}
fn default_rest_duration_load() -> f64 {
    5.0
}
fn default_pipeline_mode() -> bool {
    true
}

impl SimConfig {
    /// Parse a YAML document (also accepts JSON, a subset of YAML).
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }

    /// Parse a JSON document.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Validate range constraints from §6.3. Does not touch the process graph.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1.0..=24.0).contains(&self.work_hours_per_day) {
            return Err(ConfigError::WorkHoursOutOfRange(self.work_hours_per_day));
        }
        if !(1..=31).contains(&self.work_days_per_month) {
            return Err(ConfigError::WorkDaysOutOfRange(self.work_days_per_month));
        }
        if self.num_workers < 1 {
            return Err(ConfigError::NoWorkers(self.num_workers));
        }
        if self.target_output < 1 {
            return Err(ConfigError::NoTargetOutput(self.target_output));
        }
        if self.rest_time_threshold < 1.0 {
            return Err(ConfigError::RestTimeThresholdTooLow(self.rest_time_threshold));
        }
        if self.rest_duration_time < 0.0 {
            return Err(ConfigError::NegativeRestDurationTime(self.rest_duration_time));
        }
        if !(1..=10).contains(&self.rest_load_threshold) {
            return Err(ConfigError::RestLoadThresholdOutOfRange(self.rest_load_threshold));
        }
        if self.rest_duration_load < 0.0 {
            return Err(ConfigError::NegativeRestDurationLoad(self.rest_duration_load));
        }
        for (name, capacity) in &self.critical_equipment {
            if *capacity < 1 {
                return Err(ConfigError::EquipmentCapacityZero {
                    name: name.clone(),
                    capacity: *capacity,
                });
            }
        }
        Ok(())
    }

    /// The global deadline `T` (§5): `work_hours_per_day * work_days_per_month * 60`.
    pub fn deadline_minutes(&self) -> f64 {
        self.work_hours_per_day * self.work_days_per_month as f64 * 60.0
    }

    /// A/B comparison variant (§6.1): rest effectively disabled.
    pub fn with_rest_disabled(&self) -> Self {
        let mut cfg = self.clone();
        cfg.rest_time_threshold = f64::MAX / 2.0;
        cfg.rest_duration_time = 0.0;
        cfg.rest_duration_load = 0.0;
        cfg
    }
}
