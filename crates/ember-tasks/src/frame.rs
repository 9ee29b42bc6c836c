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

//! Frame gate: keeps game-logic work and its main-thread offspring inside the
//! frame that scheduled them.

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{select, Receiver};

use crate::counter::WorkCounter;
use crate::pool::Job;

/// What a call to [`TaskScheduler::complete_frame`](crate::TaskScheduler::complete_frame) did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSummary {
    /// Index of the frame that just completed.
    pub frame: u64,
    /// Main-thread tasks executed while completing it.
    pub main_thread_tasks: usize,
}

/// Counts in-flight game-logic tasks and owns the frame index.
#[derive(Debug)]
pub(crate) struct FrameGate {
    game_logic: WorkCounter,
    frame: AtomicU64,
}

impl FrameGate {
    pub(crate) fn new() -> Self {
        Self {
            game_logic: WorkCounter::new(),
            frame: AtomicU64::new(0),
        }
    }

    /// Called when a game-logic task is queued.
    pub(crate) fn enter(&self) {
        self.game_logic.enter();
    }

    /// Called once a game-logic task and everything it scheduled on
    /// completion has been queued.
    pub(crate) fn leave(&self) {
        self.game_logic.leave();
    }

    #[cfg(test)]
    pub(crate) fn outstanding(&self) -> usize {
        self.game_logic.outstanding()
    }

    pub(crate) fn current_frame(&self) -> u64 {
        self.frame.load(Ordering::Acquire)
    }

    /// Drains `main_queue` with `run` until it is empty and no game-logic
    /// task is in flight, then closes the current frame.
    ///
    /// Jobs queued while draining, including those queued by game-logic
    /// tasks that are still running, are executed before this returns.
    pub(crate) fn complete_frame(
        &self,
        main_queue: &Receiver<Job>,
        mut run: impl FnMut(Job),
    ) -> FrameSummary {
        let mut executed = 0;

        loop {
            while let Ok(job) = main_queue.try_recv() {
                run(job);
                executed += 1;
            }

            if self.game_logic.outstanding() == 0 {
                if main_queue.is_empty() {
                    break;
                }
                continue;
            }

            select! {
                recv(main_queue) -> job => {
                    if let Ok(job) = job {
                        run(job);
                        executed += 1;
                    }
                },
                recv(self.game_logic.idle_signal()) -> _ => {},
            }
        }

        let frame = self.frame.fetch_add(1, Ordering::AcqRel);
        log::trace!("Frame {frame} complete after {executed} main-thread tasks.");
        FrameSummary {
            frame,
            main_thread_tasks: executed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::Completion;
    use crate::task::{Task, TaskClass};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn main_job() -> Job {
        Job {
            class: TaskClass::MainThread,
            task: Task::simple(|| {}),
            completion: Completion::Detached,
        }
    }

    #[test]
    fn test_idle_frame_advances_index() {
        let gate = FrameGate::new();
        let (_tx, rx) = crossbeam_channel::unbounded::<Job>();

        let first = gate.complete_frame(&rx, |_| {});
        let second = gate.complete_frame(&rx, |_| {});

        assert_eq!(first.frame, 0);
        assert_eq!(second.frame, 1);
        assert_eq!(gate.current_frame(), 2);
        assert_eq!(first.main_thread_tasks, 0);
    }

    #[test]
    fn test_frame_waits_for_game_logic_and_its_main_thread_work() {
        let gate = Arc::new(FrameGate::new());
        let (tx, rx) = crossbeam_channel::unbounded::<Job>();

        gate.enter();
        let game_logic = {
            let gate = Arc::clone(&gate);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(30));
                tx.send(main_job()).expect("main queue closed");
                gate.leave();
            })
        };

        let summary = gate.complete_frame(&rx, |_| {});

        assert_eq!(summary.main_thread_tasks, 1);
        assert_eq!(gate.outstanding(), 0);
        game_logic.join().expect("game logic thread panicked");
    }
}
