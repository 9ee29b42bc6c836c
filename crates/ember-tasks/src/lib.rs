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

//! # Ember Tasks
//!
//! Fork-join task scheduler for the engine's frame loop.
//!
//! Work is submitted as a [`Task`] tagged with a [`TaskClass`]. Main-thread
//! tasks run only when the owning thread drains them; every other class runs
//! on a fixed worker pool. Game-logic tasks are bound to the frame that
//! scheduled them: [`TaskScheduler::complete_frame`] does not return before
//! they, and the main-thread work they queue, have run.
//!
//! A running task can fan out synchronously with
//! [`TaskContext::process_child_tasks`], or asynchronously with
//! [`SchedulerHandle::schedule_tasks`] and a continuation.

#![warn(missing_docs)]

mod batch;
mod config;
mod context;
mod counter;
mod error;
mod frame;
mod join;
mod pool;
mod scheduler;
mod stats;
mod task;

pub use config::{SchedulerConfig, MAX_WORKERS_PER_POOL};
pub use context::TaskContext;
pub use error::SchedulerError;
pub use frame::FrameSummary;
pub use scheduler::{SchedulerHandle, TaskScheduler};
pub use stats::{ClassStats, SchedulerStats};
pub use task::{Task, TaskClass};
