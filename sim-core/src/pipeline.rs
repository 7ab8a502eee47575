//! Pipeline Controller (§4.7): admits engines onto the floor, either one at
//! a time or overlapped subject to worker availability.
//!
//! Same facade shape as `engine_process.rs` (itself grounded on
//! `bpmn-lite-core::engine`); the staggered multi-unit admission logic
//! itself has no direct precedent and is new here.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::engine_process::{run_engine_process, EngineLog};
use crate::equipment::EquipmentManager;
use crate::event::EventCollector;
use crate::kernel::TaskCtx;
use crate::process::ProcessGraph;
use crate::rng::SimRng;
use crate::worker::WorkerPool;

/// §9 open question: "rationale [for `target_output + 2`] is not
/// documented." Treated here as a named, configurable-in-spirit safety
/// margin rather than a hidden constant.
pub const ADMISSION_MARGIN: u32 = 2;

/// §4.7. If `pipeline_mode` is false, spawns a single Engine Process and
/// returns immediately. Otherwise runs the admission loop until the engine
/// cap is reached or the kernel deadline truncates it.
pub async fn run_pipeline_controller(
    ctx: TaskCtx,
    pipeline_mode: bool,
    target_output: u32,
    graph: Rc<ProcessGraph>,
    workers: WorkerPool,
    equipment: EquipmentManager,
    rng: Rc<RefCell<SimRng>>,
    collector: Rc<RefCell<EventCollector>>,
    cycle_log: EngineLog,
) {
    if !pipeline_mode {
        ctx.spawn(move |task_ctx| {
            run_engine_process(task_ctx, 1, graph, workers, equipment, rng, collector, cycle_log)
        });
        return;
    }

    let start_nodes = graph.start_nodes();
    let Some(w0_node) = start_nodes.first() else { return };
    let w0 = w0_node.required_workers;
    let d0 = w0_node.std_duration;
    drop(start_nodes);

    let cap = target_output + ADMISSION_MARGIN;
    let mut engine_id = 1u32;
    let mut consecutive_stalls = 0u32;

    while engine_id <= cap {
        if workers.available(ctx.now()) >= w0 {
            consecutive_stalls = 0;
            let eid = engine_id;
            let graph_h = graph.clone();
            let workers_h = workers.clone();
            let equipment_h = equipment.clone();
            let rng_h = rng.clone();
            let collector_h = collector.clone();
            let cycle_log_h = cycle_log.clone();
            ctx.spawn(move |task_ctx| {
                run_engine_process(
                    task_ctx,
                    eid,
                    graph_h,
                    workers_h,
                    equipment_h,
                    rng_h,
                    collector_h,
                    cycle_log_h,
                )
            });
            debug!(engine_id = eid, admitted_at = ctx.now(), "engine admitted to floor");
            engine_id += 1;
            ctx.sleep(0.5 * d0).await;
        } else {
            consecutive_stalls += 1;
            if consecutive_stalls >= 3 {
                warn!(
                    engine_id,
                    required_workers = w0,
                    available = workers.available(ctx.now()),
                    consecutive_stalls,
                    "pipeline admission starved waiting on worker availability"
                );
            }
            ctx.sleep(10.0).await;
        }
    }
}
