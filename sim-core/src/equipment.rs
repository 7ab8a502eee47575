//! Equipment Manager (§4.4): named, optionally capacity-limited semaphores.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use serde::Serialize;
use tracing::{debug, warn};

use crate::kernel::{Kernel, TaskId};

/// Waiter queue depth at which a FIFO stall is worth a `warn!` (§4.4, A.2
/// starvation signal). Not a hard limit — queueing past it just gets logged.
const QUEUE_WARN_THRESHOLD: usize = 4;

struct Waiting {
    task: TaskId,
    slot: Rc<RefCell<Option<()>>>,
}

struct Semaphore {
    /// `None` means unlimited: acquisition always succeeds instantly.
    capacity: Option<u32>,
    held: u32,
    queue: VecDeque<Waiting>,
    work_time: f64,
    tasks_served: u32,
}

impl Semaphore {
    fn new(capacity: Option<u32>) -> Self {
        Semaphore {
            capacity,
            held: 0,
            queue: VecDeque::new(),
            work_time: 0.0,
            tasks_served: 0,
        }
    }

    fn has_room(&self) -> bool {
        match self.capacity {
            Some(cap) => self.held < cap,
            None => true,
        }
    }

    fn try_grant(&mut self) -> bool {
        if !self.queue.is_empty() || !self.has_room() {
            return false;
        }
        self.held += 1;
        true
    }

    fn drain_queue(&mut self, name: &str, kernel: &Kernel) {
        while self.has_room() {
            let Some(front) = self.queue.pop_front() else { break };
            self.held += 1;
            debug!(equipment = name, "equipment granted from queue");
            *front.slot.borrow_mut() = Some(());
            kernel.wake(front.task);
        }
    }

    fn release(&mut self, name: &str, duration: f64, kernel: &Kernel) {
        self.held = self.held.saturating_sub(1);
        self.work_time += duration;
        self.tasks_served += 1;
        debug!(equipment = name, duration, "equipment released");
        self.drain_queue(name, kernel);
    }
}

/// Utilization snapshot for one equipment name (§4.8 `equipment_stats`).
#[derive(Debug, Clone, Serialize)]
pub struct EquipmentStat {
    pub name: String,
    pub work_time: f64,
    pub tasks_served: u32,
    pub utilization: f64,
}

struct Manager {
    kernel: Kernel,
    semaphores: BTreeMap<String, Semaphore>,
}

/// The Equipment Manager (§4.4). Cheap to clone (an `Rc` handle).
#[derive(Clone)]
pub struct EquipmentManager {
    inner: Rc<RefCell<Manager>>,
}

impl EquipmentManager {
    pub fn new(kernel: Kernel, critical_equipment: &BTreeMap<String, u32>) -> Self {
        let mut semaphores = BTreeMap::new();
        for (name, capacity) in critical_equipment {
            semaphores.insert(name.clone(), Semaphore::new(Some(*capacity)));
        }
        EquipmentManager {
            inner: Rc::new(RefCell::new(Manager { kernel, semaphores })),
        }
    }

    fn semaphore_for<'a>(inner: &'a mut Manager, name: &str) -> &'a mut Semaphore {
        inner
            .semaphores
            .entry(name.to_string())
            .or_insert_with(|| Semaphore::new(None))
    }

    /// Request every name in `names`, visited in sorted order (with
    /// duplicates preserved) so unrelated tasks contending for overlapping
    /// equipment sets never deadlock (§4.4, §5). Each name in `names` that
    /// is unconfigured is treated as unlimited and granted instantly.
    pub fn acquire(&self, task: TaskId, names: &[String]) -> EquipmentAcquire {
        let mut sorted = names.to_vec();
        sorted.sort();
        EquipmentAcquire {
            manager: self.inner.clone(),
            task,
            remaining: sorted,
            granted: Vec::new(),
            current_wait: None,
            waited: false,
        }
    }

    /// Release previously-acquired equipment, accruing `duration` of work
    /// time on each named unit (§4.4 `release()`).
    pub fn release(&self, names: &[String], duration: f64) {
        let mut inner = self.inner.borrow_mut();
        let kernel = inner.kernel.clone();
        for name in names {
            Self::semaphore_for(&mut inner, name).release(name, duration, &kernel);
        }
    }

    /// Utilization per equipment name, `work_time / sim_duration` (§4.4, §4.8).
    pub fn stats(&self, sim_duration: f64) -> Vec<EquipmentStat> {
        self.inner
            .borrow()
            .semaphores
            .iter()
            .map(|(name, s)| EquipmentStat {
                name: name.clone(),
                work_time: s.work_time,
                tasks_served: s.tasks_served,
                utilization: if sim_duration > 0.0 { s.work_time / sim_duration } else { 0.0 },
            })
            .collect()
    }
}

/// Future returned by [`EquipmentManager::acquire`]. Resolves to `(names, waited)`
/// once every named equipment (in sorted order) has been granted.
pub struct EquipmentAcquire {
    manager: Rc<RefCell<Manager>>,
    task: TaskId,
    remaining: Vec<String>,
    granted: Vec<String>,
    current_wait: Option<Rc<RefCell<Option<()>>>>,
    waited: bool,
}

impl Future for EquipmentAcquire {
    type Output = (Vec<String>, bool);

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        loop {
            if let Some(slot) = &this.current_wait {
                if slot.borrow().is_none() {
                    return Poll::Pending;
                }
                let name = this.remaining.remove(0);
                this.granted.push(name);
                this.current_wait = None;
                continue;
            }

            let Some(name) = this.remaining.first().cloned() else {
                return Poll::Ready((std::mem::take(&mut this.granted), this.waited));
            };

            let mut inner = this.manager.borrow_mut();
            let granted_now = EquipmentManager::semaphore_for(&mut inner, &name).try_grant();

            if granted_now {
                drop(inner);
                debug!(equipment = %name, "equipment granted");
                this.remaining.remove(0);
                this.granted.push(name);
                continue;
            }

            let slot = Rc::new(RefCell::new(None));
            let sem = EquipmentManager::semaphore_for(&mut inner, &name);
            sem.queue.push_back(Waiting { task: this.task, slot: slot.clone() });
            let depth = sem.queue.len();
            drop(inner);
            if depth >= QUEUE_WARN_THRESHOLD {
                warn!(equipment = %name, queue_depth = depth, "equipment waiter queue growing long");
            }
            this.current_wait = Some(slot);
            this.waited = true;
            return Poll::Pending;
        }
    }
}
