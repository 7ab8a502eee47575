//! Discrete-event simulation engine for a multi-engine assembly line (§1).
//!
//! [`simulate`] is the thin façade wiring every subsystem together, in the
//! manner of `bpmn-lite-core::engine::BpmnLiteEngine`: build the immutable
//! collaborators (kernel, pools, graph), spawn the top-level coroutine, run
//! the kernel to the deadline, then read back a result snapshot.

pub mod config;
pub mod engine_process;
pub mod equipment;
pub mod error;
pub mod event;
pub mod executor;
pub mod kernel;
pub mod pipeline;
pub mod process;
pub mod rest_policy;
pub mod result;
pub mod rng;
pub mod worker;

use std::cell::RefCell;
use std::rc::Rc;

use tracing::{debug, info, warn};

use crate::config::SimConfig;
use crate::engine_process::EngineLog;
use crate::equipment::EquipmentManager;
use crate::error::SimError;
use crate::event::EventCollector;
use crate::kernel::Kernel;
use crate::pipeline::run_pipeline_controller;
use crate::process::ProcessDefinition;
use crate::rest_policy::RestPolicy;
use crate::result::SimResult;
use crate::rng::SimRng;
use crate::worker::WorkerPool;

/// Run one simulation to completion or truncation at the deadline (§6.1).
///
/// Returns a `Failed` [`SimResult`] if `config` or `process_def` doesn't
/// validate (§7); configuration and graph errors never panic.
pub fn simulate(config: SimConfig, process_def: ProcessDefinition) -> SimResult {
    run(config, process_def, RestPolicy::Standard)
}

/// Outcome of the A/B comparison variant (§6.1): the same process run twice
/// with identical seed, once with standard rest rules and once with rest
/// effectively disabled.
#[derive(Debug, Clone)]
pub struct ComparisonResult {
    pub standard: SimResult,
    pub rest_disabled: SimResult,
}

/// Run the standard engine and the rest-disabled comparison variant against
/// the same process definition and seed (§6.1, §9 "Comparison engine").
pub fn simulate_comparison(config: SimConfig, process_def: ProcessDefinition) -> ComparisonResult {
    let standard = run(config.clone(), process_def.clone(), RestPolicy::Standard);
    let rest_disabled_config = config.with_rest_disabled();
    let rest_disabled = run(rest_disabled_config, process_def, RestPolicy::Disabled);
    ComparisonResult { standard, rest_disabled }
}

fn run(config: SimConfig, process_def: ProcessDefinition, rest_policy: RestPolicy) -> SimResult {
    if let Err(e) = config.validate() {
        warn!(error = %e, "configuration failed validation");
        return SimResult::failed(config, SimError::from(e));
    }

    if let Err(e) = process_def.validate() {
        warn!(error = %e, "process definition failed validation");
        return SimResult::failed(config, SimError::from(e));
    }

    let graph = match process_def.into_graph() {
        Ok(g) => g,
        Err(e) => {
            warn!(error = %e, "process definition failed validation");
            return SimResult::failed(config, SimError::from(e));
        }
    };

    info!(
        nodes = graph.count(),
        num_workers = config.num_workers,
        target_output = config.target_output,
        pipeline_mode = config.pipeline_mode,
        "starting simulation run"
    );

    let deadline = config.deadline_minutes();
    let kernel = Kernel::new();
    let graph = Rc::new(graph);
    let workers = WorkerPool::new(
        kernel.clone(),
        config.num_workers,
        rest_policy,
        config.rest_time_threshold,
        config.rest_duration_time,
        config.rest_load_threshold,
        config.rest_duration_load,
    );
    let equipment = EquipmentManager::new(kernel.clone(), &config.critical_equipment);
    let rng = Rc::new(RefCell::new(SimRng::from_seed(config.random_seed)));
    let collector = Rc::new(RefCell::new(EventCollector::new()));
    let cycle_log: EngineLog = Rc::new(RefCell::new(Vec::new()));

    {
        let graph = graph.clone();
        let workers = workers.clone();
        let equipment = equipment.clone();
        let rng = rng.clone();
        let collector = collector.clone();
        let cycle_log = cycle_log.clone();
        let pipeline_mode = config.pipeline_mode;
        let target_output = config.target_output;
        kernel.spawn(move |ctx| {
            run_pipeline_controller(
                ctx,
                pipeline_mode,
                target_output,
                graph,
                workers,
                equipment,
                rng,
                collector,
                cycle_log,
            )
        });
    }

    kernel.run_until(deadline);
    let sim_duration = kernel.now();

    let cycle_log = cycle_log.borrow();
    let engines_completed = cycle_log.len() as u32;
    let avg_cycle_time = if cycle_log.is_empty() {
        0.0
    } else {
        cycle_log.iter().map(|(_, start, end)| end - start).sum::<f64>() / cycle_log.len() as f64
    };

    debug!(engines_completed, sim_duration, "run finished");

    let worker_stats = workers.workers_snapshot();
    let equipment_stats = equipment.stats(sim_duration);
    let human_factors_stats = EventCollector::human_factors_stats(&worker_stats);

    let collector_ref = collector.borrow();
    let quality_stats = collector_ref.quality_stats(&graph);
    let events = collector_ref.events_sorted();
    drop(collector_ref);

    SimResult::completed(
        config,
        sim_duration,
        engines_completed,
        avg_cycle_time,
        worker_stats,
        equipment_stats,
        quality_stats,
        human_factors_stats,
        events,
    )
}
