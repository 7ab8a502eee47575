//! Clock & Scheduler Kernel (§4.1): a single-threaded, deterministic cooperative
//! event loop.
//!
//! Coroutines are plain `async` functions; this module supplies the only
//! executor they ever run under. It is deliberately not `tokio` — §5 calls for
//! a single OS thread with strict FIFO tie-breaking and no wall-clock
//! dependency, which a general-purpose multi-threaded async runtime would
//! fight rather than help (see `DESIGN.md`, "dropped dependencies").
//! The design mirrors `bpmn-lite-core`'s `Fiber`/`WaitState`/`tick_fiber`: one
//! resumable unit of work per coroutine, driven by an outer tick loop,
//! generalized here from one opcode interpreter to arbitrarily many
//! independently-scheduled `async fn` bodies.

use std::cell::RefCell;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll, Wake, Waker};

use tracing::warn;

/// Identifies a coroutine within a [`Kernel`]. Stable for the coroutine's
/// lifetime; never reused.
pub type TaskId = usize;

#[derive(Debug, Clone, Copy, PartialEq)]
struct TimeKey(f64);

impl Eq for TimeKey {}

impl PartialOrd for TimeKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

type BoxedTask = Pin<Box<dyn Future<Output = ()>>>;

struct Inner {
    now: f64,
    tasks: Vec<Option<BoxedTask>>,
    run_queue: VecDeque<TaskId>,
    /// Min-heap on (wake time, enqueue sequence) so same-instant wakes fire
    /// in FIFO order (§4.1 ordering/tie-break).
    timers: BinaryHeap<Reverse<(TimeKey, u64, TaskId)>>,
    next_seq: u64,
}

/// The scheduler kernel. Cheap to clone (an `Rc` handle); clones share the
/// same run queue, timer heap, and clock.
#[derive(Clone)]
pub struct Kernel {
    inner: Rc<RefCell<Inner>>,
}

impl Kernel {
    pub fn new() -> Self {
        Kernel {
            inner: Rc::new(RefCell::new(Inner {
                now: 0.0,
                tasks: Vec::new(),
                run_queue: VecDeque::new(),
                timers: BinaryHeap::new(),
                next_seq: 0,
            })),
        }
    }

    /// Current simulated minutes (§4.1 `now()`).
    pub fn now(&self) -> f64 {
        self.inner.borrow().now
    }

    /// Register a new coroutine; it becomes runnable immediately (§4.1
    /// `spawn(f)`). `make` receives this task's own [`TaskCtx`] so the
    /// coroutine body can sleep, acquire resources, or spawn further
    /// coroutines against its own identity.
    pub fn spawn<F, Fut>(&self, make: F) -> TaskId
    where
        F: FnOnce(TaskCtx) -> Fut,
        Fut: Future<Output = ()> + 'static,
    {
        let id = {
            let mut inner = self.inner.borrow_mut();
            let id = inner.tasks.len();
            inner.tasks.push(None);
            id
        };
        let ctx = TaskCtx { id, kernel: self.clone() };
        let fut: BoxedTask = Box::pin(make(ctx));
        let mut inner = self.inner.borrow_mut();
        inner.tasks[id] = Some(fut);
        inner.run_queue.push_back(id);
        id
    }

    /// Make `task` runnable again, appending it to the back of the run
    /// queue. Called by resource pools when a queued request is granted,
    /// and by timer firing inside [`Kernel::run_until`].
    pub fn wake(&self, task: TaskId) {
        self.inner.borrow_mut().run_queue.push_back(task);
    }

    /// Register a timed wake for `task` at `at` (absolute simulated time).
    pub(crate) fn schedule_timer(&self, task: TaskId, at: f64) {
        let mut inner = self.inner.borrow_mut();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.timers.push(Reverse((TimeKey(at), seq, task)));
    }

    fn poll_task(&self, task: TaskId) {
        let fut = {
            let mut inner = self.inner.borrow_mut();
            inner.tasks.get_mut(task).and_then(Option::take)
        };
        let Some(mut fut) = fut else { return };
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        match fut.as_mut().poll(&mut cx) {
            Poll::Ready(()) => {
                // Coroutine finished; slot stays `None` (never reused).
            }
            Poll::Pending => {
                let mut inner = self.inner.borrow_mut();
                inner.tasks[task] = Some(fut);
            }
        }
    }

    /// Advance time by repeatedly popping the earliest pending wake (§4.1
    /// `run_until(T)`). Stops when the clock reaches `t_end` or no
    /// coroutine is runnable and none is scheduled to wake. Any coroutine
    /// still suspended when the deadline is reached is simply abandoned —
    /// it never resumes and emits no further events (§4.1 Failure, §5
    /// Cancellation).
    pub fn run_until(&self, t_end: f64) {
        loop {
            let next_task = self.inner.borrow_mut().run_queue.pop_front();
            if let Some(task) = next_task {
                self.poll_task(task);
                continue;
            }

            let next_timer = self.inner.borrow_mut().timers.pop();
            match next_timer {
                Some(Reverse((TimeKey(time), _seq, task))) => {
                    if time > t_end {
                        warn!(task, wake_at = time, deadline = t_end, "coroutine truncated at deadline");
                        self.inner.borrow_mut().now = t_end;
                        break;
                    }
                    let mut inner = self.inner.borrow_mut();
                    inner.now = time;
                    inner.run_queue.push_back(task);
                }
                None => break,
            }
        }
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Kernel::new()
    }
}

/// A coroutine's view of the kernel: its own identity plus a handle back to
/// the scheduler, so it can sleep, read the clock, or spawn children.
#[derive(Clone)]
pub struct TaskCtx {
    id: TaskId,
    kernel: Kernel,
}

impl TaskCtx {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    pub fn now(&self) -> f64 {
        self.kernel.now()
    }

    /// Suspend until `now() + dt` (§4.1 `sleep(dt)`).
    pub fn sleep(&self, dt: f64) -> Sleep {
        let wake_at = self.kernel.now() + dt.max(0.0);
        Sleep {
            kernel: self.kernel.clone(),
            task: self.id,
            wake_at,
            registered: false,
        }
    }

    /// Register a child coroutine; convenience wrapper over
    /// [`Kernel::spawn`] using this task's kernel handle.
    pub fn spawn<F, Fut>(&self, make: F) -> TaskId
    where
        F: FnOnce(TaskCtx) -> Fut,
        Fut: Future<Output = ()> + 'static,
    {
        self.kernel.spawn(make)
    }
}

/// Future returned by [`TaskCtx::sleep`].
pub struct Sleep {
    kernel: Kernel,
    task: TaskId,
    wake_at: f64,
    registered: bool,
}

impl Future for Sleep {
    type Output = ();

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        if this.kernel.now() >= this.wake_at {
            return Poll::Ready(());
        }
        if !this.registered {
            this.registered = true;
            this.kernel.schedule_timer(this.task, this.wake_at);
        }
        Poll::Pending
    }
}

struct NoopWake;

impl Wake for NoopWake {
    fn wake(self: Arc<Self>) {}
    fn wake_by_ref(self: &Arc<Self>) {}
}

fn noop_waker() -> Waker {
    Waker::from(Arc::new(NoopWake))
}
