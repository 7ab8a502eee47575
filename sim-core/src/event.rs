//! Event Collector (§4.8, §6.4): an append-only timeline and the derived
//! statistics computed from it at the end of a run.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::process::{OpType, ProcessGraph};
use crate::worker::Worker;

/// Kind of timeline event (§6.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventType {
    Normal,
    Rework,
    Waiting,
    Rest,
}

/// One closed timeline event (§6.4). Emitted only when the interval it
/// describes has fully closed — never while still open.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub engine_id: u32,
    pub step_id: String,
    pub task_name: String,
    pub event_type: EventType,
    pub start_time: f64,
    pub end_time: f64,
    pub worker_ids: Vec<usize>,
    pub equipment_used: Vec<String>,
    pub rework_count: u32,
}

/// Quality statistics derived from the event log (§4.8).
#[derive(Debug, Clone, Default, Serialize)]
pub struct QualityStats {
    pub total_inspections: u32,
    pub total_reworks: u32,
    pub first_pass_rate: f64,
    pub rework_time_total: f64,
}

/// Human-factors statistics derived from the worker pool (§4.8).
#[derive(Debug, Clone, Default, Serialize)]
pub struct HumanFactorsStats {
    pub avg_fatigue_level: f64,
    pub max_fatigue_level: f64,
    pub total_rest_time: f64,
    pub total_work_time: f64,
    pub avg_tasks_completed: f64,
    pub total_high_intensity_tasks: u32,
}

/// Append-only sink for timeline events; the one place derived statistics
/// are computed (§4.8). No reader observes it until the run ends (§5).
#[derive(Debug, Default)]
pub struct EventCollector {
    events: Vec<Event>,
}

impl EventCollector {
    pub fn new() -> Self {
        EventCollector { events: Vec::new() }
    }

    pub fn push(&mut self, event: Event) {
        self.events.push(event);
    }

    /// The full event list, sorted by `start_time` then `engine_id` (§6.4).
    pub fn into_sorted(mut self) -> Vec<Event> {
        self.sort();
        self.events
    }

    /// Same ordering as [`EventCollector::into_sorted`], without consuming
    /// the collector.
    pub fn events_sorted(&self) -> Vec<Event> {
        let mut events = self.events.clone();
        events.sort_by(|a, b| a.start_time.partial_cmp(&b.start_time).unwrap().then(a.engine_id.cmp(&b.engine_id)));
        events
    }

    fn sort(&mut self) {
        self.events
            .sort_by(|a, b| a.start_time.partial_cmp(&b.start_time).unwrap().then(a.engine_id.cmp(&b.engine_id)));
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// `quality_stats` (§4.8): M-step inspection/rework counts and first-pass
    /// rate, averaged across engines.
    pub fn quality_stats(&self, graph: &ProcessGraph) -> QualityStats {
        let m_steps: HashSet<&str> = graph
            .step_ids()
            .filter(|id| graph.node(id).map_or(false, |n| n.op_type == OpType::M))
            .collect();

        let mut normal_m = 0u32;
        let mut reworks = 0u32;
        let mut rework_time_total = 0.0;
        // (engine_id, step_id) -> rework count, to compute first-pass rate.
        let mut m_executions: HashMap<(u32, String), u32> = HashMap::new();

        for e in &self.events {
            match e.event_type {
                EventType::Normal if m_steps.contains(e.step_id.as_str()) => {
                    normal_m += 1;
                    m_executions.entry((e.engine_id, e.step_id.clone())).or_insert(0);
                }
                EventType::Rework => {
                    reworks += 1;
                    rework_time_total += e.end_time - e.start_time;
                    let entry = m_executions.entry((e.engine_id, e.step_id.clone())).or_insert(0);
                    *entry += 1;
                }
                _ => {}
            }
        }

        let first_pass_rate = if m_executions.is_empty() {
            1.0
        } else {
            let zero_rework = m_executions.values().filter(|&&c| c == 0).count();
            zero_rework as f64 / m_executions.len() as f64
        };

        QualityStats {
            total_inspections: normal_m + reworks,
            total_reworks: reworks,
            first_pass_rate,
            rework_time_total,
        }
    }

    /// `human_factors_stats` (§4.8): sums and averages over the pool's
    /// workers.
    pub fn human_factors_stats(workers: &[Worker]) -> HumanFactorsStats {
        if workers.is_empty() {
            return HumanFactorsStats::default();
        }
        let n = workers.len() as f64;
        let avg_fatigue_level = workers.iter().map(|w| w.fatigue_level).sum::<f64>() / n;
        let max_fatigue_level = workers.iter().map(|w| w.fatigue_level).fold(0.0, f64::max);
        let total_rest_time = workers.iter().map(|w| w.total_rest_time).sum();
        let total_work_time = workers.iter().map(|w| w.total_work_time).sum();
        let avg_tasks_completed = workers.iter().map(|w| w.tasks_completed as f64).sum::<f64>() / n;
        let total_high_intensity_tasks = workers.iter().map(|w| w.high_intensity_count).sum();

        HumanFactorsStats {
            avg_fatigue_level,
            max_fatigue_level,
            total_rest_time,
            total_work_time,
            avg_tasks_completed,
            total_high_intensity_tasks,
        }
    }
}
