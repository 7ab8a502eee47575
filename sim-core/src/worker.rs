//! Worker Pool (§4.3): exclusive multi-worker reservations, fatigue, and
//! rest policy.
//!
//! FIFO waiter admission mirrors the `Resource` queue shape used by
//! `other_examples/quantverse-desim`, generalized from single-unit to
//! `acquire(n)` multi-unit reservations and wired to our own [`Kernel`]
//! instead of that crate's generator-based scheduler.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use serde::Serialize;
use tracing::{debug, warn};

use crate::kernel::{Kernel, TaskId};
use crate::rest_policy::RestPolicy;

pub type WorkerId = usize;

/// Waiter queue depth at which a FIFO stall is worth a `warn!` (§4.3, A.2
/// starvation signal). Not a hard limit — queueing past it just gets logged.
const QUEUE_WARN_THRESHOLD: usize = 4;

/// Per-worker state and history (§4.3).
#[derive(Debug, Clone, Serialize)]
pub struct Worker {
    pub worker_id: WorkerId,
    pub fatigue_level: f64,
    pub continuous_work_minutes: f64,
    pub high_intensity_count: u32,
    pub total_work_time: f64,
    pub total_rest_time: f64,
    pub tasks_completed: u32,
    /// `(now, fatigue_level)` appended on every fatigue change.
    pub fatigue_history: Vec<(f64, f64)>,
    resting_until: Option<f64>,
    held: bool,
}

impl Worker {
    fn new(worker_id: WorkerId) -> Self {
        Worker {
            worker_id,
            fatigue_level: 0.0,
            continuous_work_minutes: 0.0,
            high_intensity_count: 0,
            total_work_time: 0.0,
            total_rest_time: 0.0,
            tasks_completed: 0,
            fatigue_history: Vec::new(),
            resting_until: None,
            held: false,
        }
    }

    fn is_free(&self, now: f64) -> bool {
        !self.held && self.resting_until.map_or(true, |t| now >= t)
    }
}

struct Waiting {
    task: TaskId,
    n: u32,
    slot: Rc<RefCell<Option<Vec<WorkerId>>>>,
}

struct Pool {
    kernel: Kernel,
    workers: Vec<Worker>,
    queue: VecDeque<Waiting>,
    rest_policy: RestPolicy,
    rest_time_threshold: f64,
    rest_duration_time: f64,
    rest_load_threshold: u32,
    rest_duration_load: f64,
}

impl Pool {
    fn available(&self, now: f64) -> u32 {
        self.workers.iter().filter(|w| w.is_free(now)).count() as u32
    }

    /// Try to hand out `n` workers right now; head-of-line blocking means
    /// this only ever looks past the queue when it is empty (§5 strict FIFO).
    fn try_grant(&mut self, n: u32, now: f64) -> Option<Vec<WorkerId>> {
        if !self.queue.is_empty() {
            return None;
        }
        if self.available(now) < n {
            return None;
        }
        let ids: Vec<WorkerId> = self
            .workers
            .iter_mut()
            .filter(|w| w.is_free(now))
            .take(n as usize)
            .map(|w| {
                w.held = true;
                w.worker_id
            })
            .collect();
        debug!(worker_ids = ?ids, "workers granted");
        Some(ids)
    }

    fn drain_queue(&mut self, now: f64) {
        while let Some(front) = self.queue.front() {
            if self.available(now) < front.n {
                break;
            }
            let front = self.queue.pop_front().unwrap();
            let ids: Vec<WorkerId> = self
                .workers
                .iter_mut()
                .filter(|w| w.is_free(now))
                .take(front.n as usize)
                .map(|w| {
                    w.held = true;
                    w.worker_id
                })
                .collect();
            debug!(worker_ids = ?ids, "workers granted from queue");
            *front.slot.borrow_mut() = Some(ids);
            self.kernel.wake(front.task);
        }
    }

    fn release(&mut self, ids: &[WorkerId], work_duration: f64, work_load: u32, now: f64) -> Vec<RestSpan> {
        debug!(worker_ids = ?ids, work_duration, "workers released");
        let mut rests = Vec::new();
        for &id in ids {
            let w = &mut self.workers[id];
            w.held = false;
            w.total_work_time += work_duration;
            w.continuous_work_minutes += work_duration;
            w.tasks_completed += 1;
            if work_load >= self.rest_load_threshold {
                w.high_intensity_count += 1;
            }

            let fatigue_delta = 0.1 * work_load as f64 * work_duration;
            w.fatigue_level = (w.fatigue_level + fatigue_delta).clamp(0.0, 100.0);
            w.fatigue_history.push((now, w.fatigue_level));

            if self.rest_policy == RestPolicy::Disabled {
                continue;
            }

            let rule_a = w.continuous_work_minutes >= self.rest_time_threshold;
            let rule_b = work_load >= self.rest_load_threshold;
            if rule_a || rule_b {
                let rest = match (rule_a, rule_b) {
                    (true, true) => self.rest_duration_time.max(self.rest_duration_load),
                    (true, false) => self.rest_duration_time,
                    (false, true) => self.rest_duration_load,
                    (false, false) => unreachable!(),
                };
                w.resting_until = Some(now + rest);
                w.total_rest_time += rest;
                w.fatigue_level = (w.fatigue_level - 2.0 * rest).max(0.0);
                w.continuous_work_minutes = 0.0;
                w.fatigue_history.push((now + rest, w.fatigue_level));
                debug!(worker_id = id, rest_start = now, rest_end = now + rest, "worker resting");
                rests.push(RestSpan { worker_id: id, start: now, end: now + rest });
            }
        }
        self.drain_queue(now);
        rests
    }
}

/// A rest interval started for one worker, for the caller to log as a REST
/// event (§4.3, §4.8). `(step_id, task_name)` are left empty for REST events.
#[derive(Debug, Clone, Copy)]
pub struct RestSpan {
    pub worker_id: WorkerId,
    pub start: f64,
    pub end: f64,
}

/// The Worker Pool (§4.3). Cheap to clone (an `Rc` handle).
#[derive(Clone)]
pub struct WorkerPool {
    pool: Rc<RefCell<Pool>>,
}

impl WorkerPool {
    pub fn new(
        kernel: Kernel,
        num_workers: u32,
        rest_policy: RestPolicy,
        rest_time_threshold: f64,
        rest_duration_time: f64,
        rest_load_threshold: u32,
        rest_duration_load: f64,
    ) -> Self {
        let workers = (0..num_workers as usize).map(Worker::new).collect();
        WorkerPool {
            pool: Rc::new(RefCell::new(Pool {
                kernel,
                workers,
                queue: VecDeque::new(),
                rest_policy,
                rest_time_threshold,
                rest_duration_time,
                rest_load_threshold,
                rest_duration_load,
            })),
        }
    }

    /// Number of workers neither held nor resting (§4.3 `available()`).
    pub fn available(&self, now: f64) -> u32 {
        self.pool.borrow().available(now)
    }

    pub fn num_workers(&self) -> u32 {
        self.pool.borrow().workers.len() as u32
    }

    /// Reserve `n` workers, suspending the caller FIFO if not all are free
    /// right now (§4.3 `acquire(n)`). Resolves to `(ids, waited)` so the
    /// caller knows whether to emit a WAITING event.
    pub fn acquire(&self, ctx_task: TaskId, n: u32) -> WorkerAcquire {
        let now = self.pool.borrow().kernel.now();
        if let Some(ids) = self.pool.borrow_mut().try_grant(n, now) {
            return WorkerAcquire {
                pool: self.pool.clone(),
                task: ctx_task,
                n,
                slot: Rc::new(RefCell::new(Some(ids))),
                enqueued: false,
                waited: false,
            };
        }
        WorkerAcquire {
            pool: self.pool.clone(),
            task: ctx_task,
            n,
            slot: Rc::new(RefCell::new(None)),
            enqueued: false,
            waited: true,
        }
    }

    /// Release previously-acquired workers, applying fatigue and rest rules
    /// (§4.3 `release()`). A worker that starts resting isn't re-examined by
    /// `drain_queue` until the next `release()` call, so a timer coroutine is
    /// spawned per rest span to re-check the queue once the rest ends —
    /// otherwise a waiter stuck behind a resting-but-nobody-else-releasing
    /// worker would block forever.
    pub fn release(&self, ids: &[WorkerId], work_duration: f64, work_load: u32) -> Vec<RestSpan> {
        let now = self.pool.borrow().kernel.now();
        let rests = self.pool.borrow_mut().release(ids, work_duration, work_load, now);
        for rest in &rests {
            let pool = self.pool.clone();
            let kernel = self.pool.borrow().kernel.clone();
            let wake_at = rest.end;
            kernel.spawn(move |ctx| async move {
                let dt = (wake_at - ctx.now()).max(0.0);
                ctx.sleep(dt).await;
                let drain_now = pool.borrow().kernel.now();
                pool.borrow_mut().drain_queue(drain_now);
            });
        }
        rests
    }

    /// Snapshot of every worker, for `human_factors_stats` (§4.8).
    pub fn workers_snapshot(&self) -> Vec<Worker> {
        self.pool.borrow().workers.clone()
    }
}

/// Future returned by [`WorkerPool::acquire`]. Resolves to `(ids, waited)`.
pub struct WorkerAcquire {
    pool: Rc<RefCell<Pool>>,
    task: TaskId,
    n: u32,
    slot: Rc<RefCell<Option<Vec<WorkerId>>>>,
    enqueued: bool,
    waited: bool,
}

impl Future for WorkerAcquire {
    type Output = (Vec<WorkerId>, bool);

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let Some(ids) = this.slot.borrow_mut().take() {
            return Poll::Ready((ids, this.waited));
        }
        if !this.enqueued {
            this.enqueued = true;
            let mut pool = this.pool.borrow_mut();
            pool.queue.push_back(Waiting {
                task: this.task,
                n: this.n,
                slot: this.slot.clone(),
            });
            let depth = pool.queue.len();
            if depth >= QUEUE_WARN_THRESHOLD {
                warn!(queue_depth = depth, requested = this.n, "worker pool waiter queue growing long");
            }
        }
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::Kernel;

    fn pool(kernel: Kernel, n: u32) -> WorkerPool {
        WorkerPool::new(kernel, n, RestPolicy::Standard, 120.0, 10.0, 8, 5.0)
    }

    #[test]
    fn immediate_grant_when_available() {
        let kernel = Kernel::new();
        let wp = pool(kernel.clone(), 3);
        let done = Rc::new(RefCell::new(None));
        let done2 = done.clone();
        let wp2 = wp.clone();
        kernel.spawn(move |ctx| async move {
            let (ids, waited) = wp2.acquire(ctx.id(), 2).await;
            *done2.borrow_mut() = Some((ids, waited));
        });
        kernel.run_until(1.0);
        let (ids, waited) = done.borrow().clone().unwrap();
        assert_eq!(ids.len(), 2);
        assert!(!waited);
    }

    #[test]
    fn fifo_waiter_granted_on_release() {
        let kernel = Kernel::new();
        let wp = pool(kernel.clone(), 1);
        let log = Rc::new(RefCell::new(Vec::new()));

        let wp_a = wp.clone();
        let log_a = log.clone();
        kernel.spawn(move |ctx| async move {
            let (ids, _) = wp_a.acquire(ctx.id(), 1).await;
            ctx.sleep(5.0).await;
            wp_a.release(&ids, 5.0, 1);
            log_a.borrow_mut().push(("a", ctx.now()));
        });

        let wp_b = wp.clone();
        let log_b = log.clone();
        kernel.spawn(move |ctx| async move {
            let (_ids, waited) = wp_b.acquire(ctx.id(), 1).await;
            assert!(waited);
            log_b.borrow_mut().push(("b", ctx.now()));
        });

        kernel.run_until(100.0);
        assert_eq!(log.borrow().len(), 2);
        assert_eq!(log.borrow()[0].0, "a");
        assert_eq!(log.borrow()[1].0, "b");
    }

    #[test]
    fn rest_rule_a_triggers_on_threshold() {
        let kernel = Kernel::new();
        let wp = WorkerPool::new(kernel, 1, RestPolicy::Standard, 10.0, 4.0, 100, 0.0);
        wp.release(&[0], 10.0, 1);
        let w = &wp.workers_snapshot()[0];
        assert_eq!(w.continuous_work_minutes, 0.0);
        assert_eq!(w.total_rest_time, 4.0);
    }

    #[test]
    fn rest_disabled_policy_never_rests() {
        let kernel = Kernel::new();
        let wp = WorkerPool::new(kernel, 1, RestPolicy::Disabled, 1.0, 100.0, 1, 100.0);
        wp.release(&[0], 50.0, 10);
        let w = &wp.workers_snapshot()[0];
        assert_eq!(w.total_rest_time, 0.0);
    }
}
