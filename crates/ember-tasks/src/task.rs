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

//! Task classes and the boxed closures that make up a unit of work.

use std::fmt;

use crate::context::TaskContext;

/// Number of [`TaskClass`] variants.
pub(crate) const CLASS_COUNT: usize = 5;

/// The class a [`Task`] is scheduled under.
///
/// The class decides which queue holds the task and which thread runs it, and
/// therefore what [`SchedulerHandle::is_main_thread`](crate::SchedulerHandle::is_main_thread)
/// reports inside it. A task keeps its class for its whole lifetime, and child
/// tasks inherit the class of their parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskClass {
    /// Runs on the thread that owns the frame loop, during a main-thread drain.
    MainThread,
    /// Short background work. Shares the small pool with [`TaskClass::GameLogic`].
    Small,
    /// Long-running background work, kept on its own pool so it never starves small tasks.
    Large,
    /// Background work that must finish within the frame it was scheduled in.
    GameLogic,
    /// Blocking file work.
    File,
}

impl TaskClass {
    /// Every task class, in declaration order.
    pub const ALL: [TaskClass; CLASS_COUNT] = [
        TaskClass::MainThread,
        TaskClass::Small,
        TaskClass::Large,
        TaskClass::GameLogic,
        TaskClass::File,
    ];

    /// Every class executed by a worker pool rather than the main thread.
    pub const BACKGROUND: [TaskClass; 4] = [
        TaskClass::Small,
        TaskClass::Large,
        TaskClass::GameLogic,
        TaskClass::File,
    ];

    /// Returns `true` for every class that runs off the main thread.
    pub fn is_background(self) -> bool {
        self != TaskClass::MainThread
    }

    /// A short, lowercase name used in logs and thread names.
    pub fn name(self) -> &'static str {
        match self {
            TaskClass::MainThread => "main-thread",
            TaskClass::Small => "small",
            TaskClass::Large => "large",
            TaskClass::GameLogic => "game-logic",
            TaskClass::File => "file",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            TaskClass::MainThread => 0,
            TaskClass::Small => 1,
            TaskClass::Large => 2,
            TaskClass::GameLogic => 3,
            TaskClass::File => 4,
        }
    }
}

impl fmt::Display for TaskClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

type TaskFn = Box<dyn FnOnce(&TaskContext) + Send + 'static>;

/// A single schedulable unit of work.
///
/// Everything a task touches is captured by value and must be `Send + 'static`:
/// state shared with other tasks has to be wrapped explicitly in an `Arc`, an
/// atomic or a lock.
///
/// # Example
///
/// ```rust
/// use ember_tasks::{Task, TaskClass};
///
/// let with_context = Task::new(|ctx| assert_eq!(ctx.class(), TaskClass::Small));
/// let simple = Task::simple(|| println!("no context needed"));
/// # drop((with_context, simple));
/// ```
pub struct Task {
    body: TaskFn,
}

impl Task {
    /// Creates a task whose closure receives the [`TaskContext`] it runs with.
    pub fn new<F>(body: F) -> Self
    where
        F: FnOnce(&TaskContext) + Send + 'static,
    {
        Self {
            body: Box::new(body),
        }
    }

    /// Creates a task that ignores its context.
    pub fn simple<F>(body: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::new(move |_| body())
    }

    /// Consumes the task and runs its closure.
    pub(crate) fn run(self, context: &TaskContext) {
        (self.body)(context)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task").finish_non_exhaustive()
    }
}
