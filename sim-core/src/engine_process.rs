//! Engine Process (§4.6): drives one product unit through the DAG to
//! completion.
//!
//! Grounded on `bpmn-lite-core::engine::tick_instance`'s drive-to-completion
//! loop over a process instance, with the original ready-set polling tick
//! replaced by an explicit completion signal (see `DESIGN.md`) — no busy-wait.

use std::cell::RefCell;
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use tracing::info;

use crate::equipment::EquipmentManager;
use crate::event::EventCollector;
use crate::executor::run_task_executor;
use crate::kernel::{TaskCtx, TaskId};
use crate::process::{ProcessGraph, ProcessNode};
use crate::rng::SimRng;
use crate::worker::WorkerPool;

#[derive(Default)]
struct EngineState {
    completed: HashSet<String>,
    running: HashSet<String>,
    waiting_engine_task: Option<TaskId>,
}

/// Suspends the Engine Process until a spawned Task Executor signals a
/// completion (§9 design note: signal, not a polling tick).
struct EngineWait {
    state: Rc<RefCell<EngineState>>,
    task: TaskId,
    registered: bool,
}

impl Future for EngineWait {
    type Output = ();

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        if !this.registered {
            this.registered = true;
            this.state.borrow_mut().waiting_engine_task = Some(this.task);
            return Poll::Pending;
        }
        if this.state.borrow().waiting_engine_task == Some(this.task) {
            Poll::Pending
        } else {
            Poll::Ready(())
        }
    }
}

/// `(engine_id, started_at, completed_at)` per engine that finishes all of
/// its steps (§3 `EngineInstance`, §6.5 `avg_cycle_time`).
pub type EngineLog = Rc<RefCell<Vec<(u32, f64, f64)>>>;

/// Run engine `engine_id` through `graph` to completion, or until the kernel
/// deadline truncates it (§4.6). On success, appends
/// `(engine_id, started_at, completed_at)` to `cycle_log`; on truncation,
/// nothing is appended.
pub async fn run_engine_process(
    ctx: TaskCtx,
    engine_id: u32,
    graph: Rc<ProcessGraph>,
    workers: WorkerPool,
    equipment: EquipmentManager,
    rng: Rc<RefCell<SimRng>>,
    collector: Rc<RefCell<EventCollector>>,
    cycle_log: EngineLog,
) {
    let started_at = ctx.now();
    info!(engine_id, started_at, "engine instance started");
    let state = Rc::new(RefCell::new(EngineState::default()));

    loop {
        let ready: Vec<Rc<ProcessNode>> = {
            let st = state.borrow();
            graph
                .ready(&st.completed)
                .into_iter()
                .filter(|n| !st.running.contains(&n.step_id))
                .map(|n| Rc::new(n.clone()))
                .collect()
        };

        for node in ready {
            state.borrow_mut().running.insert(node.step_id.clone());
            let step_id = node.step_id.clone();
            let state_done = state.clone();
            let workers = workers.clone();
            let equipment = equipment.clone();
            let rng = rng.clone();
            let collector = collector.clone();
            ctx.spawn(move |task_ctx| async move {
                let kernel = task_ctx.kernel().clone();
                run_task_executor(task_ctx, engine_id, node, workers, equipment, rng, collector).await;
                let mut st = state_done.borrow_mut();
                st.running.remove(&step_id);
                st.completed.insert(step_id);
                if let Some(waiter) = st.waiting_engine_task.take() {
                    kernel.wake(waiter);
                }
            });
        }

        if state.borrow().completed.len() == graph.count() {
            break;
        }

        EngineWait { state: state.clone(), task: ctx.id(), registered: false }.await;
    }

    let completed_at = ctx.now();
    info!(
        engine_id,
        started_at,
        completed_at,
        cycle_time = completed_at - started_at,
        "engine instance completed"
    );
    cycle_log.borrow_mut().push((engine_id, started_at, completed_at));
}
