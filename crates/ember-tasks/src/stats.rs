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

//! Per-class task counters.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::task::{TaskClass, CLASS_COUNT};

/// Counters for a single task class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassStats {
    /// Tasks handed to the scheduler, children and continuations included.
    pub scheduled: u64,
    /// Tasks whose closure has returned or panicked.
    pub completed: u64,
    /// Completed tasks whose closure panicked.
    pub panicked: u64,
}

impl ClassStats {
    /// Tasks scheduled but not completed yet.
    pub fn in_flight(&self) -> u64 {
        self.scheduled.saturating_sub(self.completed)
    }
}

/// A point-in-time snapshot of the scheduler's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    classes: [ClassStats; CLASS_COUNT],
}

impl SchedulerStats {
    /// Returns the counters recorded for `class`.
    pub fn class(&self, class: TaskClass) -> ClassStats {
        self.classes[class.index()]
    }

    /// Sums the counters of every class.
    pub fn total(&self) -> ClassStats {
        self.classes
            .iter()
            .fold(ClassStats::default(), |acc, stats| ClassStats {
                scheduled: acc.scheduled + stats.scheduled,
                completed: acc.completed + stats.completed,
                panicked: acc.panicked + stats.panicked,
            })
    }
}

#[derive(Debug, Default)]
struct ClassCounters {
    scheduled: AtomicU64,
    completed: AtomicU64,
    panicked: AtomicU64,
}

/// Live counters updated by the scheduler.
#[derive(Debug, Default)]
pub(crate) struct StatsRecorder {
    classes: [ClassCounters; CLASS_COUNT],
}

impl StatsRecorder {
    pub(crate) fn record_scheduled(&self, class: TaskClass, count: u64) {
        self.classes[class.index()]
            .scheduled
            .fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_completed(&self, class: TaskClass, panicked: bool) {
        let counters = &self.classes[class.index()];
        if panicked {
            counters.panicked.fetch_add(1, Ordering::Relaxed);
        }
        // Publishes `panicked` and the job's `scheduled` increment to
        // snapshots that acquire `completed`.
        counters.completed.fetch_add(1, Ordering::Release);
    }

    pub(crate) fn snapshot(&self) -> SchedulerStats {
        let mut stats = SchedulerStats::default();
        for class in TaskClass::ALL {
            let counters = &self.classes[class.index()];
            // Every scheduled increment happens before the matching completion,
            // so acquiring `completed` first keeps `completed <= scheduled`.
            let completed = counters.completed.load(Ordering::Acquire);
            let panicked = counters.panicked.load(Ordering::Relaxed);
            let scheduled = counters.scheduled.load(Ordering::Relaxed);
            stats.classes[class.index()] = ClassStats {
                scheduled,
                completed,
                panicked,
            };
        }
        stats
    }
}
