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

//! Worker pools backing the background task classes.
//!
//! Each pool owns one unbounded MPMC queue. Worker threads block on it; a
//! worker whose task is waiting on children keeps draining the same queue
//! until its children are done (see [`help_until_complete`]).

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{select, Receiver, Sender};

use crate::batch::BatchTracker;
use crate::error::SchedulerError;
use crate::join::ChildJoin;
use crate::scheduler::SchedulerHandle;
use crate::task::{Task, TaskClass};

/// Identifies one of the scheduler's worker pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum PoolKind {
    /// Serves `Small` and `GameLogic` tasks.
    Small,
    /// Serves `Large` tasks.
    Large,
    /// Serves `File` tasks.
    File,
}

impl PoolKind {
    pub(crate) const ALL: [PoolKind; 3] = [PoolKind::Small, PoolKind::Large, PoolKind::File];

    /// The pool executing `class`, or `None` for main-thread tasks.
    pub(crate) fn for_class(class: TaskClass) -> Option<PoolKind> {
        match class {
            TaskClass::MainThread => None,
            TaskClass::Small | TaskClass::GameLogic => Some(PoolKind::Small),
            TaskClass::Large => Some(PoolKind::Large),
            TaskClass::File => Some(PoolKind::File),
        }
    }

    pub(crate) fn name(self) -> &'static str {
        match self {
            PoolKind::Small => "small",
            PoolKind::Large => "large",
            PoolKind::File => "file",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            PoolKind::Small => 0,
            PoolKind::Large => 1,
            PoolKind::File => 2,
        }
    }
}

/// What to do once a job's closure has finished.
#[derive(Debug)]
pub(crate) enum Completion {
    /// Independently scheduled task; panics are logged and swallowed.
    Detached,
    /// Member of a batch; counts towards its continuation.
    Batch(Arc<BatchTracker>),
    /// Child of a waiting parent; panics are handed back to the parent.
    Child(Arc<ChildJoin>),
}

/// A task together with its class and completion hook.
#[derive(Debug)]
pub(crate) struct Job {
    pub(crate) class: TaskClass,
    pub(crate) task: Task,
    pub(crate) completion: Completion,
}

#[derive(Debug)]
pub(crate) enum PoolMessage {
    Run(Job),
    Terminate,
}

/// The queue shared by every worker of one pool.
#[derive(Debug)]
pub(crate) struct WorkerPool {
    kind: PoolKind,
    sender: Sender<PoolMessage>,
    receiver: Receiver<PoolMessage>,
}

impl WorkerPool {
    pub(crate) fn new(kind: PoolKind) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self {
            kind,
            sender,
            receiver,
        }
    }

    /// Queues a job and wakes one idle worker.
    pub(crate) fn submit(&self, job: Job) {
        // The pool holds its own receiver, so the channel cannot disconnect.
        if self.sender.send(PoolMessage::Run(job)).is_err() {
            log::error!("The {} pool queue is disconnected; job dropped.", self.kind.name());
        }
    }

    /// Asks exactly one worker to exit once the jobs queued before it are done.
    pub(crate) fn terminate_one(&self) {
        let _ = self.sender.send(PoolMessage::Terminate);
    }

    pub(crate) fn receiver(&self) -> &Receiver<PoolMessage> {
        &self.receiver
    }

    /// Number of messages waiting in the queue.
    #[cfg(test)]
    pub(crate) fn pending(&self) -> usize {
        self.receiver.len()
    }
}

/// Spawns worker number `index` of the `kind` pool.
pub(crate) fn spawn_worker(
    kind: PoolKind,
    index: usize,
    prefix: &str,
    scheduler: SchedulerHandle,
) -> Result<JoinHandle<()>, SchedulerError> {
    let name = format!("{prefix}-{}-{index}", kind.name());
    thread::Builder::new()
        .name(name.clone())
        .spawn(move || worker_loop(kind, scheduler))
        .map_err(|source| SchedulerError::ThreadSpawn { name, source })
}

fn worker_loop(kind: PoolKind, scheduler: SchedulerHandle) {
    let receiver = scheduler.pool(kind).receiver().clone();
    let current = thread::current();
    let name = current.name().unwrap_or(kind.name());
    log::debug!("Worker '{name}' started.");

    while let Ok(message) = receiver.recv() {
        match message {
            PoolMessage::Run(job) => scheduler.execute(job),
            PoolMessage::Terminate => break,
        }
    }

    log::debug!("Worker '{name}' stopped.");
}

/// Runs queued jobs of the `kind` pool on the calling worker until `join`
/// reports that every child has completed.
///
/// Terminate messages picked up while helping are held back and re-sent once
/// the join is done, so the worker count they address stays exact and the
/// children queued behind them are still drained.
pub(crate) fn help_until_complete(scheduler: &SchedulerHandle, kind: PoolKind, join: &ChildJoin) {
    let pool = scheduler.pool(kind);
    let mut held_terminations = 0_usize;

    while !join.is_complete() {
        select! {
            recv(join.done()) -> _ => {},
            recv(pool.receiver()) -> message => match message {
                Ok(PoolMessage::Run(job)) => scheduler.execute(job),
                Ok(PoolMessage::Terminate) => held_terminations += 1,
                Err(_) => {
                    let _ = join.done().recv();
                }
            },
        }
    }

    for _ in 0..held_terminations {
        pool.terminate_one();
    }
}
