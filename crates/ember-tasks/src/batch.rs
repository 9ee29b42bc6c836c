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

//! Countdown that schedules a continuation once a batch has finished.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::scheduler::SchedulerHandle;
use crate::task::{Task, TaskClass};

/// Tracks the members of a batch submitted through
/// [`SchedulerHandle::schedule_tasks`].
///
/// Each member reports completion exactly once, whether its closure returned
/// or panicked. The member that takes the count from one to zero schedules the
/// continuation as a fresh task of the batch's class, so the continuation gets
/// the same thread affinity as the members.
#[derive(Debug)]
pub(crate) struct BatchTracker {
    class: TaskClass,
    remaining: AtomicUsize,
    continuation: Mutex<Option<Task>>,
}

impl BatchTracker {
    pub(crate) fn new(class: TaskClass, members: usize, continuation: Task) -> Self {
        debug_assert!(members > 0, "empty batches schedule their continuation directly");
        Self {
            class,
            remaining: AtomicUsize::new(members),
            continuation: Mutex::new(Some(continuation)),
        }
    }

    /// Records one finished member, scheduling the continuation after the last.
    pub(crate) fn notify_completed(&self, scheduler: &SchedulerHandle) {
        let previous = self.remaining.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "more batch completions than members");
        if previous != 1 {
            return;
        }

        let continuation = self
            .continuation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(continuation) = continuation {
            log::trace!("Batch of {} tasks complete, scheduling continuation.", self.class);
            scheduler.enqueue_continuation(self.class, continuation);
        }
    }

    #[cfg(test)]
    pub(crate) fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }
}
