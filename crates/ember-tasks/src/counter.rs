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

//! Outstanding-work counter with an idle wake-up signal.

use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_channel::{Receiver, Sender};

/// Counts units of work between enqueue and completion.
///
/// Every transition to zero leaves a token in a one-slot channel. Waiters
/// re-check [`outstanding`](Self::outstanding) after each token, so a stale
/// token only costs one extra check and a wake-up can never be lost.
#[derive(Debug)]
pub(crate) struct WorkCounter {
    count: AtomicUsize,
    idle_tx: Sender<()>,
    idle_rx: Receiver<()>,
}

impl WorkCounter {
    pub(crate) fn new() -> Self {
        let (idle_tx, idle_rx) = crossbeam_channel::bounded(1);
        Self {
            count: AtomicUsize::new(0),
            idle_tx,
            idle_rx,
        }
    }

    /// Registers one more unit of outstanding work.
    pub(crate) fn enter(&self) {
        self.count.fetch_add(1, Ordering::AcqRel);
    }

    /// Marks one unit as finished, signalling idleness on the last one.
    pub(crate) fn leave(&self) {
        let previous = self.count.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "WorkCounter::leave called without enter");
        if previous == 1 {
            // A full slot already carries a pending wake-up.
            let _ = self.idle_tx.try_send(());
        }
    }

    pub(crate) fn outstanding(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// The channel that receives a token whenever the count drops to zero.
    pub(crate) fn idle_signal(&self) -> &Receiver<()> {
        &self.idle_rx
    }

    /// Blocks until no work is outstanding.
    pub(crate) fn wait_idle(&self) {
        while self.outstanding() > 0 {
            if self.idle_rx.recv().is_err() {
                return;
            }
        }
    }
}
