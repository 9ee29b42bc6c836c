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

//! Worker pool sizing for the scheduler.

use std::num::NonZeroUsize;
use std::thread;

use serde::{Deserialize, Serialize};

use crate::error::SchedulerError;

/// Upper bound on the number of threads in any one pool.
pub const MAX_WORKERS_PER_POOL: usize = 64;

/// Configuration for a [`TaskScheduler`](crate::TaskScheduler).
///
/// Missing fields fall back to [`SchedulerConfig::default`] when deserialized,
/// so a config file only needs to name the values it overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Threads serving `Small` and `GameLogic` tasks.
    pub small_task_workers: usize,
    /// Threads serving `Large` tasks.
    pub large_task_workers: usize,
    /// Threads serving `File` tasks.
    pub file_task_workers: usize,
    /// Prefix for worker thread names, e.g. `ember-small-0`.
    pub thread_name_prefix: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        let cores = thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1);
        Self {
            // One core is left to the main thread.
            small_task_workers: cores.saturating_sub(1).clamp(1, MAX_WORKERS_PER_POOL),
            large_task_workers: (cores / 2).clamp(1, MAX_WORKERS_PER_POOL),
            file_task_workers: 1,
            thread_name_prefix: "ember".to_string(),
        }
    }
}

impl SchedulerConfig {
    /// Checks that every pool has a usable size and that threads can be named.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        for (pool, requested) in [
            ("small", self.small_task_workers),
            ("large", self.large_task_workers),
            ("file", self.file_task_workers),
        ] {
            if requested == 0 {
                return Err(SchedulerError::NoWorkers { pool });
            }
            if requested > MAX_WORKERS_PER_POOL {
                return Err(SchedulerError::TooManyWorkers {
                    pool,
                    requested,
                    limit: MAX_WORKERS_PER_POOL,
                });
            }
        }

        if self.thread_name_prefix.trim().is_empty() {
            return Err(SchedulerError::EmptyThreadNamePrefix);
        }

        Ok(())
    }

    /// Returns a configuration with `count` threads in every pool.
    ///
    /// Handy for tests that want deterministic, small pools.
    pub fn uniform(count: usize) -> Self {
        Self {
            small_task_workers: count,
            large_task_workers: count,
            file_task_workers: count,
            ..Self::default()
        }
    }
}
