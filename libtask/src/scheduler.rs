//! The task pool.
//!
//! Work items are boxed closures returning `anyhow::Result<()>`. Every item
//! belongs to a task group: the group of the item that submitted it, or the
//! scheduler's detached root group when submitted from outside any item.
//! [`Handle::run_group`] blocks until its group drains; while blocked, the
//! calling thread runs queued items of that same group, so nested groups make
//! progress even when every pool worker is itself waiting.
//!
//! Failures never leave an item: an `Err` or a panic is classified into a
//! [`Fault`], written to the console's error stream tagged with the worker
//! id, and the item counts as finished.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, trace};

use crate::config::{PoolMode, SchedulerConfig};
use crate::console::Console;
use crate::fault::Fault;

/// A deferred unit of work. The scheduler owns it from submission until it
/// returns.
pub type WorkItem = Box<dyn FnOnce() -> anyhow::Result<()> + Send + 'static>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

thread_local! {
    /// (pool key, worker id) for pool threads.
    static WORKER: Cell<Option<(usize, usize)>> = const { Cell::new(None) };
    /// Groups of the items currently executing on this thread, innermost last.
    static GROUPS: RefCell<Vec<(usize, Arc<Group>)>> = const { RefCell::new(Vec::new()) };
}

#[derive(Default)]
struct GroupCounts {
    /// registered and not yet finished
    pending: usize,
    /// registered and still sitting in the queue
    queued: usize,
}

struct Group {
    counts: Mutex<GroupCounts>,
    changed: Condvar,
}

impl Group {
    fn new() -> Arc<Self> {
        Arc::new(Group {
            counts: Mutex::new(GroupCounts::default()),
            changed: Condvar::new(),
        })
    }

    fn registered(&self) {
        {
            let mut c = lock(&self.counts);
            c.pending += 1;
            c.queued += 1;
        }
        self.changed.notify_all();
    }

    fn dequeued(&self) {
        lock(&self.counts).queued -= 1;
    }

    fn finished(&self) {
        let mut c = lock(&self.counts);
        c.pending -= 1;
        if c.pending == 0 {
            self.changed.notify_all();
        }
    }
}

/// Lifecycle of a submitted item. There is no cancelled state: once
/// submitted an item always runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    Submitted,
    Running,
    Completed,
    Failed(Fault),
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed(_))
    }
}

struct Slot {
    state: Mutex<TaskState>,
    done: Condvar,
}

impl Slot {
    fn set(&self, state: TaskState) {
        let terminal = state.is_terminal();
        *lock(&self.state) = state;
        if terminal {
            self.done.notify_all();
        }
    }
}

struct Job {
    id: u64,
    group: Arc<Group>,
    work: WorkItem,
    slot: Option<Arc<Slot>>,
}

struct Queue {
    jobs: VecDeque<Job>,
    idle: usize,
    live: usize,
    shutdown: bool,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
}

struct Shared {
    queue: Mutex<Queue>,
    available: Condvar,
    mode: PoolMode,
    limit: usize,
    keep_alive: Duration,
    root: Arc<Group>,
    console: Arc<Console>,
    next_job: AtomicU64,
    next_worker: AtomicUsize,
    workers: Mutex<Vec<JoinHandle<()>>>,
    counters: Counters,
}

impl Shared {
    fn key(self: &Arc<Self>) -> usize {
        Arc::as_ptr(self) as usize
    }

    /// Id of the calling thread in this pool; 0 for threads that are not
    /// pool workers.
    fn worker_id(self: &Arc<Self>) -> usize {
        match WORKER.with(Cell::get) {
            Some((pool, id)) if pool == self.key() => id,
            _ => 0,
        }
    }

    fn current_group(self: &Arc<Self>) -> Arc<Group> {
        let key = self.key();
        GROUPS
            .with(|g| {
                g.borrow()
                    .iter()
                    .rev()
                    .find(|(pool, _)| *pool == key)
                    .map(|(_, group)| Arc::clone(group))
            })
            .unwrap_or_else(|| Arc::clone(&self.root))
    }

    fn enqueue(self: &Arc<Self>, group: Arc<Group>, work: WorkItem, slot: Option<Arc<Slot>>) -> u64 {
        let id = self.next_job.fetch_add(1, Ordering::Relaxed);
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);

        let spawn = {
            let mut q = lock(&self.queue);
            group.registered();
            q.jobs.push_back(Job {
                id,
                group,
                work,
                slot,
            });
            let spawn = self.mode == PoolMode::Dynamic
                && !q.shutdown
                && q.jobs.len() > q.idle
                && q.live < self.limit;
            if spawn {
                q.live += 1;
            }
            spawn
        };
        self.available.notify_one();
        if spawn {
            self.spawn_worker();
        }
        trace!("task {id} submitted");
        id
    }

    /// Caller must already have counted the worker in `Queue::live`.
    fn spawn_worker(self: &Arc<Self>) {
        let id = self.next_worker.fetch_add(1, Ordering::Relaxed) + 1;
        let shared = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name(format!("task-worker-{id}"))
            .spawn(move || shared.worker_loop(id));
        match spawned {
            Ok(handle) => {
                let mut workers = lock(&self.workers);
                workers.retain(|h| !h.is_finished());
                workers.push(handle);
            }
            Err(e) => {
                error!("failed to spawn worker {id}: {e}");
                lock(&self.queue).live -= 1;
            }
        }
    }

    fn worker_loop(self: Arc<Self>, id: usize) {
        WORKER.with(|w| w.set(Some((self.key(), id))));
        debug!("worker {id} started");
        while let Some(job) = self.next_job() {
            self.run_job(job, id);
        }
        debug!("worker {id} stopped");
    }

    fn next_job(&self) -> Option<Job> {
        let mut q = lock(&self.queue);
        loop {
            if let Some(job) = q.jobs.pop_front() {
                job.group.dequeued();
                return Some(job);
            }
            if q.shutdown {
                q.live -= 1;
                return None;
            }

            q.idle += 1;
            match self.mode {
                PoolMode::Fixed => {
                    q = self
                        .available
                        .wait(q)
                        .unwrap_or_else(PoisonError::into_inner);
                    q.idle -= 1;
                }
                PoolMode::Dynamic => {
                    let (guard, res) = self
                        .available
                        .wait_timeout(q, self.keep_alive)
                        .unwrap_or_else(PoisonError::into_inner);
                    q = guard;
                    q.idle -= 1;
                    if res.timed_out() && q.jobs.is_empty() && !q.shutdown {
                        q.live -= 1;
                        return None;
                    }
                }
            }
        }
    }

    fn take_job(&self, pred: impl Fn(&Job) -> bool) -> Option<Job> {
        let mut q = lock(&self.queue);
        let pos = q.jobs.iter().position(|job| pred(job))?;
        let job = q.jobs.remove(pos)?;
        job.group.dequeued();
        Some(job)
    }

    fn run_job(self: &Arc<Self>, job: Job, worker: usize) {
        let Job {
            id,
            group,
            work,
            slot,
        } = job;
        if let Some(slot) = &slot {
            slot.set(TaskState::Running);
        }
        trace!("task {id} running on worker {worker}");

        GROUPS.with(|g| g.borrow_mut().push((self.key(), Arc::clone(&group))));
        let outcome = panic::catch_unwind(AssertUnwindSafe(work));
        GROUPS.with(|g| g.borrow_mut().pop());

        let state = match outcome {
            Ok(Ok(())) => TaskState::Completed,
            Ok(Err(err)) => TaskState::Failed(Fault::from_error(&err)),
            Err(payload) => TaskState::Failed(Fault::from_panic(payload)),
        };
        match &state {
            TaskState::Failed(fault) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                self.console.error(fault.report(format!("thread {worker}")));
            }
            _ => {
                self.counters.completed.fetch_add(1, Ordering::Relaxed);
            }
        }

        if let Some(slot) = slot {
            slot.set(state);
        }
        group.finished();
    }

    /// Blocks until `group` has no pending items, running its queued items
    /// on the calling thread in the meantime.
    fn drain(self: &Arc<Self>, group: &Arc<Group>) {
        let worker = self.worker_id();
        loop {
            {
                let mut c = lock(&group.counts);
                while c.pending > 0 && c.queued == 0 {
                    c = group
                        .changed
                        .wait(c)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                if c.pending == 0 {
                    return;
                }
            }
            // a worker may win the race for it; then we simply wait again
            if let Some(job) = self.take_job(|j| Arc::ptr_eq(&j.group, group)) {
                self.run_job(job, worker);
            }
        }
    }
}

/// A cheap, cloneable reference to a [`Scheduler`], handed to every
/// component that submits work or writes to the console.
#[derive(Clone)]
pub struct Handle {
    shared: Arc<Shared>,
}

impl Handle {
    /// Fire-and-forget submission.
    pub fn submit<F>(&self, work: F)
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        let group = self.shared.current_group();
        self.shared.enqueue(group, Box::new(work), None);
    }

    /// Like [`Handle::submit`], but returns a handle to observe completion.
    pub fn spawn<F>(&self, work: F) -> TaskHandle
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        let slot = Arc::new(Slot {
            state: Mutex::new(TaskState::Submitted),
            done: Condvar::new(),
        });
        let group = self.shared.current_group();
        let id = self
            .shared
            .enqueue(group, Box::new(work), Some(Arc::clone(&slot)));
        TaskHandle {
            shared: Arc::clone(&self.shared),
            id,
            slot,
        }
    }

    /// Opens a task group, submits `entry` into it and blocks until every
    /// item registered in the group, transitively, has finished.
    pub fn run_group<F>(&self, entry: F)
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        let group = Group::new();
        self.shared.enqueue(Arc::clone(&group), Box::new(entry), None);
        self.shared.drain(&group);
    }

    /// Runs `body` inside the process-wide critical section.
    pub fn with_mutual_exclusion<R>(&self, body: impl FnOnce() -> R) -> R {
        self.shared.console.critical(|_| body())
    }

    pub fn console(&self) -> &Arc<Console> {
        &self.shared.console
    }

    pub fn stats(&self) -> SchedulerStats {
        let c = &self.shared.counters;
        SchedulerStats {
            submitted: c.submitted.load(Ordering::Relaxed),
            completed: c.completed.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
        }
    }

    /// Number of live pool workers.
    pub fn workers(&self) -> usize {
        lock(&self.shared.queue).live
    }

    /// Id of the calling thread, 0 outside the pool.
    pub fn worker_id(&self) -> usize {
        self.shared.worker_id()
    }

    pub fn mode(&self) -> PoolMode {
        self.shared.mode
    }
}

/// Completion handle returned by [`Handle::spawn`].
pub struct TaskHandle {
    shared: Arc<Shared>,
    id: u64,
    slot: Arc<Slot>,
}

impl TaskHandle {
    pub fn state(&self) -> TaskState {
        lock(&self.slot.state).clone()
    }

    /// Blocks until the task reaches a terminal state. A task still queued
    /// is run on the calling thread.
    pub fn wait(&self) -> TaskState {
        if let Some(job) = self.shared.take_job(|j| j.id == self.id) {
            self.shared.run_job(job, self.shared.worker_id());
        }
        let mut state = lock(&self.slot.state);
        while !state.is_terminal() {
            state = self
                .slot
                .done
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        state.clone()
    }
}

/// Owner of the worker pool. Dropping it waits for every detached item,
/// then stops and joins the workers.
pub struct Scheduler {
    handle: Handle,
}

impl Scheduler {
    pub fn new(config: &SchedulerConfig, console: Arc<Console>) -> Self {
        let limit = config.worker_limit();
        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue {
                jobs: VecDeque::new(),
                idle: 0,
                live: 0,
                shutdown: false,
            }),
            available: Condvar::new(),
            mode: config.mode,
            limit,
            keep_alive: config.keep_alive(),
            root: Group::new(),
            console,
            next_job: AtomicU64::new(0),
            next_worker: AtomicUsize::new(0),
            workers: Mutex::new(Vec::new()),
            counters: Counters::default(),
        });

        if config.mode == PoolMode::Fixed {
            lock(&shared.queue).live = limit;
            for _ in 0..limit {
                shared.spawn_worker();
            }
        }
        debug!("scheduler started: mode={:?}, limit={limit}", config.mode);

        Scheduler {
            handle: Handle { shared },
        }
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn run_group<F>(&self, entry: F)
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.handle.run_group(entry)
    }

    pub fn submit<F>(&self, work: F)
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.handle.submit(work)
    }

    /// Same as dropping the scheduler.
    pub fn shutdown(self) {}
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        let shared = &self.handle.shared;
        shared.drain(&shared.root);

        lock(&shared.queue).shutdown = true;
        shared.available.notify_all();

        let workers: Vec<_> = lock(&shared.workers).drain(..).collect();
        let me = thread::current().id();
        for worker in workers {
            if worker.thread().id() != me {
                let _ = worker.join();
            }
        }
        let stats = self.handle.stats();
        debug!(
            "scheduler stopped: submitted={}, completed={}, failed={}",
            stats.submitted, stats.completed, stats.failed
        );
    }
}
