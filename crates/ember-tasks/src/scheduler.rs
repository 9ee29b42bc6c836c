// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The task scheduler and the handle that subsystems use to reach it.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};
use std::thread::{self, JoinHandle, ThreadId};

use crossbeam_channel::{Receiver, Sender};

use crate::batch::BatchTracker;
use crate::config::SchedulerConfig;
use crate::context::TaskContext;
use crate::counter::WorkCounter;
use crate::error::SchedulerError;
use crate::frame::{FrameGate, FrameSummary};
use crate::join::{panic_message, PanicPayload};
use crate::pool::{self, Completion, Job, PoolKind, WorkerPool};
use crate::stats::{SchedulerStats, StatsRecorder};
use crate::task::{Task, TaskClass};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Running,
    Stopped,
}

#[derive(Debug)]
struct SchedulerShared {
    main_thread: ThreadId,
    lifecycle: RwLock<Lifecycle>,
    main_tx: Sender<Job>,
    main_rx: Receiver<Job>,
    pools: [WorkerPool; 3],
    /// Background jobs between enqueue and completion.
    background: WorkCounter,
    frame_gate: FrameGate,
    stats: StatsRecorder,
}

/// A cheap, cloneable handle to a running [`TaskScheduler`].
///
/// Subsystems receive a handle at construction time and use it to submit
/// work; there is no global scheduler instance.
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    shared: Arc<SchedulerShared>,
}

impl SchedulerHandle {
    /// Queues `task` under `class` and returns immediately.
    ///
    /// # Panics
    ///
    /// Panics if the scheduler has been shut down.
    pub fn schedule_task(&self, class: TaskClass, task: Task) {
        // Held until the job is queued so shutdown cannot stop the pools
        // between the check and the enqueue.
        let lifecycle = self.lifecycle();
        if *lifecycle == Lifecycle::Stopped {
            drop(lifecycle);
            panic!("a {class} task was scheduled after the task scheduler shut down");
        }

        self.shared.stats.record_scheduled(class, 1);
        log::trace!("Scheduling a {class} task.");
        self.dispatch(Job {
            class,
            task,
            completion: Completion::Detached,
        });
        drop(lifecycle);
    }

    /// Queues every task in `tasks` under `class`, then runs `continuation` as
    /// a new `class` task once all of them have finished.
    ///
    /// The continuation runs exactly once, even for an empty batch or when
    /// members panic.
    ///
    /// # Panics
    ///
    /// Panics if the scheduler has been shut down.
    pub fn schedule_tasks(
        &self,
        class: TaskClass,
        tasks: impl IntoIterator<Item = Task>,
        continuation: Task,
    ) {
        let tasks: Vec<Task> = tasks.into_iter().collect();
        let lifecycle = self.lifecycle();
        if *lifecycle == Lifecycle::Stopped {
            drop(lifecycle);
            panic!("a {class} batch was scheduled after the task scheduler shut down");
        }

        log::trace!("Scheduling a batch of {} {class} tasks.", tasks.len());
        if tasks.is_empty() {
            self.shared.stats.record_scheduled(class, 1);
            self.dispatch(Job {
                class,
                task: continuation,
                completion: Completion::Detached,
            });
            return;
        }

        self.shared
            .stats
            .record_scheduled(class, tasks.len() as u64);
        let tracker = Arc::new(BatchTracker::new(class, tasks.len(), continuation));
        for task in tasks {
            self.dispatch(Job {
                class,
                task,
                completion: Completion::Batch(Arc::clone(&tracker)),
            });
        }
        drop(lifecycle);
    }

    /// Returns `true` when called from the thread that owns the scheduler and
    /// drains its main-thread queue.
    pub fn is_main_thread(&self) -> bool {
        thread::current().id() == self.shared.main_thread
    }

    /// Index of the frame currently being executed.
    pub fn current_frame(&self) -> u64 {
        self.shared.frame_gate.current_frame()
    }

    /// Returns `true` until the scheduler has been shut down.
    pub fn is_running(&self) -> bool {
        self.read_lifecycle() == Lifecycle::Running
    }

    /// Main-thread tasks waiting for the next drain.
    pub fn pending_main_thread_tasks(&self) -> usize {
        self.shared.main_rx.len()
    }

    /// A snapshot of the per-class counters.
    pub fn stats(&self) -> SchedulerStats {
        self.shared.stats.snapshot()
    }

    pub(crate) fn pool(&self, kind: PoolKind) -> &WorkerPool {
        &self.shared.pools[kind.index()]
    }

    pub(crate) fn record_children(&self, class: TaskClass, count: usize) {
        self.shared.stats.record_scheduled(class, count as u64);
    }

    pub(crate) fn record_completed(&self, class: TaskClass, panicked: bool) {
        self.shared.stats.record_completed(class, panicked);
    }

    /// Queues a child job on its parent's pool. Stats were already recorded
    /// by the parent's context.
    pub(crate) fn enqueue_child(&self, job: Job) {
        self.dispatch(job);
    }

    /// Queues a batch continuation.
    pub(crate) fn enqueue_continuation(&self, class: TaskClass, task: Task) {
        let lifecycle = self.lifecycle();
        if *lifecycle == Lifecycle::Stopped {
            log::warn!("Dropping a {class} batch continuation: the scheduler has shut down.");
            return;
        }
        self.shared.stats.record_scheduled(class, 1);
        self.dispatch(Job {
            class,
            task,
            completion: Completion::Detached,
        });
        drop(lifecycle);
    }

    /// Runs a job on the current thread and reports its completion.
    pub(crate) fn execute(&self, job: Job) {
        let Job {
            class,
            task,
            completion,
        } = job;
        debug_assert_eq!(
            class.is_background(),
            !self.is_main_thread(),
            "{class} task executed on the wrong thread"
        );

        let context = TaskContext::new(class, self.clone());
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| task.run(&context)));
        self.shared.stats.record_completed(class, outcome.is_err());

        match completion {
            Completion::Detached => log_task_panic(class, outcome),
            Completion::Batch(tracker) => {
                log_task_panic(class, outcome);
                tracker.notify_completed(self);
            }
            Completion::Child(join) => join.complete(outcome),
        }

        // Anything the task queued is already visible to the frame gate.
        if class.is_background() {
            if class == TaskClass::GameLogic {
                self.shared.frame_gate.leave();
            }
            self.shared.background.leave();
        }
    }

    fn dispatch(&self, job: Job) {
        match PoolKind::for_class(job.class) {
            None => {
                if self.shared.main_tx.send(job).is_err() {
                    log::error!("The main-thread queue is disconnected; job dropped.");
                }
            }
            Some(kind) => {
                self.shared.background.enter();
                if job.class == TaskClass::GameLogic {
                    self.shared.frame_gate.enter();
                }
                self.pool(kind).submit(job);
            }
        }
    }

    fn lifecycle(&self) -> RwLockReadGuard<'_, Lifecycle> {
        self.shared
            .lifecycle
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn read_lifecycle(&self) -> Lifecycle {
        *self
            .shared
            .lifecycle
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn log_task_panic(class: TaskClass, outcome: Result<(), PanicPayload>) {
    if let Err(payload) = outcome {
        log::error!(
            "A {class} task panicked: {}",
            panic_message(payload.as_ref())
        );
    }
}

/// Owns the worker threads and the main-thread side of the scheduler.
///
/// The thread that creates the scheduler becomes its main thread: only that
/// thread may drain main-thread tasks or complete frames. Dropping the
/// scheduler shuts it down.
///
/// # Example
///
/// ```rust
/// use ember_tasks::{SchedulerConfig, Task, TaskClass, TaskScheduler};
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// let mut scheduler = TaskScheduler::new(SchedulerConfig::uniform(2)).unwrap();
/// let handle = scheduler.handle();
/// let presented = Arc::new(AtomicUsize::new(0));
///
/// let counter = Arc::clone(&presented);
/// let main = handle.clone();
/// handle.schedule_task(
///     TaskClass::GameLogic,
///     Task::new(move |ctx| {
///         assert!(!ctx.is_main_thread());
///         main.schedule_task(
///             TaskClass::MainThread,
///             Task::simple(move || {
///                 counter.fetch_add(1, Ordering::SeqCst);
///             }),
///         );
///     }),
/// );
///
/// scheduler.complete_frame();
/// assert_eq!(presented.load(Ordering::SeqCst), 1);
/// scheduler.shutdown();
/// ```
#[derive(Debug)]
pub struct TaskScheduler {
    handle: SchedulerHandle,
    workers: Vec<(PoolKind, JoinHandle<()>)>,
}

impl TaskScheduler {
    /// Validates `config` and starts every worker pool.
    ///
    /// If a worker thread cannot be spawned, the workers already started are
    /// stopped before the error is returned.
    pub fn new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        config.validate()?;

        let (main_tx, main_rx) = crossbeam_channel::unbounded();
        let shared = SchedulerShared {
            main_thread: thread::current().id(),
            lifecycle: RwLock::new(Lifecycle::Running),
            main_tx,
            main_rx,
            pools: PoolKind::ALL.map(WorkerPool::new),
            background: WorkCounter::new(),
            frame_gate: FrameGate::new(),
            stats: StatsRecorder::default(),
        };
        let mut scheduler = Self {
            handle: SchedulerHandle {
                shared: Arc::new(shared),
            },
            workers: Vec::new(),
        };

        for (kind, count) in [
            (PoolKind::Small, config.small_task_workers),
            (PoolKind::Large, config.large_task_workers),
            (PoolKind::File, config.file_task_workers),
        ] {
            for index in 0..count {
                let worker = pool::spawn_worker(
                    kind,
                    index,
                    &config.thread_name_prefix,
                    scheduler.handle.clone(),
                )?;
                scheduler.workers.push((kind, worker));
            }
        }

        log::info!(
            "Task scheduler started: {} small, {} large and {} file workers.",
            config.small_task_workers,
            config.large_task_workers,
            config.file_task_workers
        );
        Ok(scheduler)
    }

    /// Returns a handle for submitting work.
    pub fn handle(&self) -> SchedulerHandle {
        self.handle.clone()
    }

    /// Number of live worker threads across all pools.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Runs every queued main-thread task, including tasks queued while this
    /// pass is running, and returns how many ran.
    ///
    /// Unlike [`complete_frame`](Self::complete_frame) this does not wait for
    /// game-logic tasks.
    ///
    /// # Panics
    ///
    /// Panics when called from any thread other than the main thread.
    pub fn execute_main_thread_tasks(&self) -> usize {
        self.assert_main_thread("execute_main_thread_tasks");
        let mut executed = 0;
        while let Ok(job) = self.handle.shared.main_rx.try_recv() {
            self.handle.execute(job);
            executed += 1;
        }
        executed
    }

    /// Completes the current frame.
    ///
    /// Drains the main-thread queue until it is empty and every game-logic
    /// task is done, so game-logic work scheduled during this frame, and any
    /// main-thread work it schedules, runs before the frame index advances.
    /// There is no timeout: a game-logic task that never returns stalls the
    /// frame.
    ///
    /// # Panics
    ///
    /// Panics when called from any thread other than the main thread.
    pub fn complete_frame(&self) -> FrameSummary {
        self.assert_main_thread("complete_frame");
        let shared = &self.handle.shared;
        shared
            .frame_gate
            .complete_frame(&shared.main_rx, |job| self.handle.execute(job))
    }

    /// Waits for all background work, stops every worker and joins them.
    ///
    /// Tasks may keep scheduling background work while the scheduler drains.
    /// Main-thread tasks still queued afterwards are dropped. Calling this
    /// more than once is harmless.
    pub fn shutdown(&mut self) {
        let shared = Arc::clone(&self.handle.shared);
        if !self.handle.is_running() {
            return;
        }

        log::info!("Shutting down task scheduler...");
        loop {
            shared.background.wait_idle();
            let mut lifecycle = shared
                .lifecycle
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if shared.background.outstanding() == 0 {
                *lifecycle = Lifecycle::Stopped;
                break;
            }
        }

        for (kind, _) in &self.workers {
            self.handle.pool(*kind).terminate_one();
        }
        for (kind, worker) in self.workers.drain(..) {
            if worker.join().is_err() {
                log::error!("A {} pool worker thread panicked.", kind.name());
            }
        }

        let discarded = shared.main_rx.try_iter().count();
        if discarded > 0 {
            log::warn!("Discarded {discarded} main-thread tasks at shutdown.");
        }
        log::info!("Task scheduler shut down.");
    }

    fn assert_main_thread(&self, operation: &str) {
        assert!(
            self.handle.is_main_thread(),
            "TaskScheduler::{operation} must be called from the main thread"
        );
    }
}

impl Drop for TaskScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
