//! Result schema (§6.5): the read-only snapshot returned from one run.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::config::SimConfig;
use crate::equipment::EquipmentStat;
use crate::event::{Event, HumanFactorsStats, QualityStats};
use crate::worker::Worker;

/// §7: configuration/graph errors short-circuit to `Failed` before the
/// kernel ever starts; every other anomaly (starvation, deadline reached)
/// is absorbed into a `Completed` result with whatever statistics accrued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SimStatus {
    Completed,
    Failed,
}

/// `time_mapping` (§6.5): how simulated minutes relate to the configured
/// shift calendar.
#[derive(Debug, Clone, Serialize)]
pub struct TimeMapping {
    pub minutes_per_day: f64,
    pub total_days: u32,
    pub total_minutes: f64,
    pub work_hours_per_day: f64,
}

impl TimeMapping {
    pub fn from_config(config: &SimConfig) -> Self {
        TimeMapping {
            minutes_per_day: config.work_hours_per_day * 60.0,
            total_days: config.work_days_per_month,
            total_minutes: config.deadline_minutes(),
            work_hours_per_day: config.work_hours_per_day,
        }
    }
}

/// `SimResult` (§6.5): everything a caller needs, whether the run
/// completed, failed validation, or was truncated at the deadline.
#[derive(Debug, Clone, Serialize)]
pub struct SimResult {
    pub sim_id: String,
    pub status: SimStatus,
    pub config: SimConfig,
    pub sim_duration: f64,
    pub engines_completed: u32,
    pub target_achievement_rate: f64,
    pub avg_cycle_time: f64,
    pub worker_stats: Vec<Worker>,
    pub equipment_stats: Vec<EquipmentStat>,
    pub quality_stats: QualityStats,
    pub human_factors_stats: HumanFactorsStats,
    pub events: Vec<Event>,
    pub time_mapping: TimeMapping,
    pub error: Option<String>,
    pub generated_at: DateTime<Utc>,
}

impl SimResult {
    /// A `Failed` result from a configuration/graph error, before the
    /// kernel starts (§7 Propagation).
    pub fn failed(config: SimConfig, error: impl std::fmt::Display) -> Self {
        SimResult {
            sim_id: Uuid::now_v7().to_string(),
            status: SimStatus::Failed,
            time_mapping: TimeMapping::from_config(&config),
            config,
            sim_duration: 0.0,
            engines_completed: 0,
            target_achievement_rate: 0.0,
            avg_cycle_time: 0.0,
            worker_stats: Vec::new(),
            equipment_stats: Vec::new(),
            quality_stats: QualityStats::default(),
            human_factors_stats: HumanFactorsStats::default(),
            events: Vec::new(),
            error: Some(error.to_string()),
            generated_at: Utc::now(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn completed(
        config: SimConfig,
        sim_duration: f64,
        engines_completed: u32,
        avg_cycle_time: f64,
        worker_stats: Vec<Worker>,
        equipment_stats: Vec<EquipmentStat>,
        quality_stats: QualityStats,
        human_factors_stats: HumanFactorsStats,
        events: Vec<Event>,
    ) -> Self {
        let target_achievement_rate = if config.target_output > 0 {
            engines_completed as f64 / config.target_output as f64
        } else {
            0.0
        };
        SimResult {
            sim_id: Uuid::now_v7().to_string(),
            status: SimStatus::Completed,
            time_mapping: TimeMapping::from_config(&config),
            config,
            sim_duration,
            engines_completed,
            target_achievement_rate,
            avg_cycle_time,
            worker_stats,
            equipment_stats,
            quality_stats,
            human_factors_stats,
            events,
            error: None,
            generated_at: Utc::now(),
        }
    }
}
