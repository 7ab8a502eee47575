//! Task Executor (§4.5): the coroutine body run once per (engine, node).
//!
//! Reshaped from `bpmn-lite-core::vm::tick_fiber`'s step-by-step instruction
//! handling into the fixed acquire → sample → sleep → emit → release →
//! rework sequence this domain calls for, instead of a general opcode loop.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::debug;

use crate::equipment::EquipmentManager;
use crate::event::{Event, EventCollector, EventType};
use crate::kernel::TaskCtx;
use crate::process::{OpType, ProcessNode};
use crate::rng::SimRng;
use crate::worker::WorkerPool;

/// Run one task to completion for `(engine_id, node)`, appending every
/// closed event to `collector` (§4.5). Resolves once the task (including
/// any rework loop) has fully finished and resources are released.
pub async fn run_task_executor(
    ctx: TaskCtx,
    engine_id: u32,
    node: Rc<ProcessNode>,
    workers: WorkerPool,
    equipment: EquipmentManager,
    rng: Rc<RefCell<SimRng>>,
    collector: Rc<RefCell<EventCollector>>,
) {
    let t0 = ctx.now();
    debug!(engine_id, step_id = %node.step_id, task_name = %node.task_name, "task started");

    let (worker_ids, equipment_used, waited) =
        acquire_all(&ctx, &node, &workers, &equipment).await;
    let t_start = ctx.now();
    if waited {
        collector.borrow_mut().push(Event {
            engine_id,
            step_id: node.step_id.clone(),
            task_name: node.task_name.clone(),
            event_type: EventType::Waiting,
            start_time: t0,
            end_time: t_start,
            worker_ids: worker_ids.clone(),
            equipment_used: equipment_used.clone(),
            rework_count: 0,
        });
    }

    let d = rng.borrow_mut().sample_duration(node.std_duration, node.time_variance);
    ctx.sleep(d).await;
    collector.borrow_mut().push(Event {
        engine_id,
        step_id: node.step_id.clone(),
        task_name: node.task_name.clone(),
        event_type: EventType::Normal,
        start_time: t_start,
        end_time: ctx.now(),
        worker_ids: worker_ids.clone(),
        equipment_used: equipment_used.clone(),
        rework_count: 0,
    });

    equipment.release(&equipment_used, d);
    let rests = workers.release(&worker_ids, d, node.work_load_score);
    push_rest_events(&collector, engine_id, &rests);
    debug!(engine_id, step_id = %node.step_id, task_name = %node.task_name, "task completed");

    if node.op_type == OpType::M {
        let mut rework_count = 0u32;
        loop {
            let draw = rng.borrow_mut().uniform();
            if draw >= node.rework_prob {
                break;
            }
            rework_count += 1;
            debug!(engine_id, step_id = %node.step_id, rework_count, "rework triggered");

            let rw_t0 = ctx.now();
            let (rw_workers, rw_equipment, rw_waited) =
                acquire_all(&ctx, &node, &workers, &equipment).await;
            let rw_start = ctx.now();
            if rw_waited {
                collector.borrow_mut().push(Event {
                    engine_id,
                    step_id: node.step_id.clone(),
                    task_name: node.task_name.clone(),
                    event_type: EventType::Waiting,
                    start_time: rw_t0,
                    end_time: rw_start,
                    worker_ids: rw_workers.clone(),
                    equipment_used: rw_equipment.clone(),
                    rework_count: 0,
                });
            }

            let d_r = rng.borrow_mut().sample_duration(node.std_duration, node.time_variance);
            ctx.sleep(d_r).await;
            collector.borrow_mut().push(Event {
                engine_id,
                step_id: node.step_id.clone(),
                task_name: node.task_name.clone(),
                event_type: EventType::Rework,
                start_time: rw_start,
                end_time: ctx.now(),
                worker_ids: rw_workers.clone(),
                equipment_used: rw_equipment.clone(),
                rework_count,
            });

            equipment.release(&rw_equipment, d_r);
            let rests = workers.release(&rw_workers, d_r, node.work_load_score);
            push_rest_events(&collector, engine_id, &rests);
            debug!(engine_id, step_id = %node.step_id, rework_count, "rework completed");
        }
    }
}

/// Log each started rest span as a REST event with empty step/task fields
/// (§4.3).
fn push_rest_events(collector: &RefCell<EventCollector>, engine_id: u32, rests: &[crate::worker::RestSpan]) {
    for rest in rests {
        collector.borrow_mut().push(Event {
            engine_id,
            step_id: String::new(),
            task_name: String::new(),
            event_type: EventType::Rest,
            start_time: rest.start,
            end_time: rest.end,
            worker_ids: vec![rest.worker_id],
            equipment_used: Vec::new(),
            rework_count: 0,
        });
    }
}

/// Workers first, then equipment in sorted-name order (§4.5 step 2, §5
/// deadlock avoidance). Returns `(worker_ids, equipment_names, waited)`
/// where `waited` is true if either acquisition suspended.
async fn acquire_all(
    ctx: &TaskCtx,
    node: &ProcessNode,
    workers: &WorkerPool,
    equipment: &EquipmentManager,
) -> (Vec<usize>, Vec<String>, bool) {
    let (worker_ids, workers_waited) = workers.acquire(ctx.id(), node.required_workers).await;
    let (equipment_used, equipment_waited) =
        equipment.acquire(ctx.id(), &node.required_tools).await;
    (worker_ids, equipment_used, workers_waited || equipment_waited)
}
