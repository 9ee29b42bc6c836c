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

//! Errors reported while building a [`TaskScheduler`](crate::TaskScheduler).
//!
//! Misuse of a running scheduler (scheduling after shutdown, draining the
//! main-thread queue from another thread) is a programming error and panics
//! instead of surfacing here.

use std::io;

use thiserror::Error;

/// An error raised while validating a configuration or starting worker threads.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A worker pool was configured without any threads.
    #[error("the {pool} pool needs at least one worker thread")]
    NoWorkers {
        /// The pool that was left empty.
        pool: &'static str,
    },
    /// A worker pool asked for more threads than the scheduler allows.
    #[error("the {pool} pool requested {requested} worker threads, above the limit of {limit}")]
    TooManyWorkers {
        /// The pool that was oversized.
        pool: &'static str,
        /// The number of threads requested.
        requested: usize,
        /// The maximum number of threads per pool.
        limit: usize,
    },
    /// The worker thread name prefix was empty.
    #[error("worker thread name prefix must not be empty")]
    EmptyThreadNamePrefix,
    /// The operating system refused to spawn a worker thread.
    #[error("failed to spawn worker thread '{name}'")]
    ThreadSpawn {
        /// The name the thread would have had.
        name: String,
        /// The underlying OS error.
        #[source]
        source: io::Error,
    },
}
