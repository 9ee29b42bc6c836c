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

//! The context handed to a running task.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::join::ChildJoin;
use crate::pool::{self, Completion, Job, PoolKind};
use crate::scheduler::SchedulerHandle;
use crate::task::{Task, TaskClass};

/// The handle a [`Task`] receives while it runs.
///
/// It is only ever lent out for the duration of a single call, so it cannot be
/// kept after the task returns. Child tasks started through it run with the
/// same [`TaskClass`] and thread affinity as the task that owns it.
#[derive(Debug)]
pub struct TaskContext {
    class: TaskClass,
    scheduler: SchedulerHandle,
}

impl TaskContext {
    pub(crate) fn new(class: TaskClass, scheduler: SchedulerHandle) -> Self {
        Self { class, scheduler }
    }

    /// The class of the running task.
    pub fn class(&self) -> TaskClass {
        self.class
    }

    /// The scheduler running this task, for scheduling independent follow-up work.
    pub fn scheduler(&self) -> &SchedulerHandle {
        &self.scheduler
    }

    /// Shorthand for [`SchedulerHandle::is_main_thread`].
    pub fn is_main_thread(&self) -> bool {
        self.scheduler.is_main_thread()
    }

    /// Runs `task` as a child of the current task and returns once it has finished.
    ///
    /// Everything the child did is visible to the caller when this returns. A
    /// panic inside the child is re-raised here.
    pub fn process_child_task(&self, task: Task) {
        self.process_child_tasks(vec![task]);
    }

    /// Runs every task in `tasks` as a child of the current task and returns
    /// once all of them have finished.
    ///
    /// On a background class the calling thread runs the first child itself,
    /// queues the rest on its own pool and keeps executing queued work from
    /// that pool until its children are done. Main-thread children run inline,
    /// one after the other.
    ///
    /// If a background child panics, its already queued siblings still run to
    /// completion before the first panic is re-raised on the calling thread.
    /// Main-thread children stop at the first panic, which is re-raised at once.
    pub fn process_child_tasks(&self, tasks: impl IntoIterator<Item = Task>) {
        let tasks: Vec<Task> = tasks.into_iter().collect();
        if tasks.is_empty() {
            return;
        }

        let join = Arc::new(ChildJoin::new(tasks.len()));

        match PoolKind::for_class(self.class) {
            None => {
                assert!(
                    self.scheduler.is_main_thread(),
                    "main-thread child tasks must be started from the main thread"
                );
                // Like a plain nested call: children after a panicking one
                // never start.
                let mut tasks = tasks.into_iter();
                for task in tasks.by_ref() {
                    self.scheduler.record_children(self.class, 1);
                    if !self.run_inline(task, &join) {
                        break;
                    }
                }
                for _ in tasks {
                    join.complete(Ok(()));
                }
            }
            Some(kind) => {
                self.scheduler.record_children(self.class, tasks.len());
                let mut tasks = tasks.into_iter();
                let first = tasks.next();
                for task in tasks {
                    self.scheduler.enqueue_child(Job {
                        class: self.class,
                        task,
                        completion: Completion::Child(Arc::clone(&join)),
                    });
                }
                if let Some(first) = first {
                    self.run_inline(first, &join);
                }
                pool::help_until_complete(&self.scheduler, kind, &join);
            }
        }

        join.finish();
    }

    /// Runs one child on the calling thread. Returns `false` if it panicked.
    fn run_inline(&self, task: Task, join: &ChildJoin) -> bool {
        let context = TaskContext::new(self.class, self.scheduler.clone());
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| task.run(&context)));
        let succeeded = outcome.is_ok();
        self.scheduler.record_completed(self.class, !succeeded);
        join.complete(outcome);
        succeeded
    }
}
