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

//! Completion tracking for synchronously joined child tasks.

use std::any::Any;
use std::panic;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use crossbeam_channel::{Receiver, Sender};

/// The payload of a caught panic.
pub(crate) type PanicPayload = Box<dyn Any + Send + 'static>;

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "<non-string panic payload>"
    }
}

/// Shared state between a parent task and the children it is waiting on.
///
/// Children may finish on any worker of the parent's pool. The first panic
/// among them is kept and re-raised on the parent's thread by
/// [`finish`](Self::finish) once every child is done.
#[derive(Debug)]
pub(crate) struct ChildJoin {
    remaining: AtomicUsize,
    panic: Mutex<Option<PanicPayload>>,
    done_tx: Sender<()>,
    done_rx: Receiver<()>,
}

impl ChildJoin {
    pub(crate) fn new(children: usize) -> Self {
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        if children == 0 {
            let _ = done_tx.try_send(());
        }
        Self {
            remaining: AtomicUsize::new(children),
            panic: Mutex::new(None),
            done_tx,
            done_rx,
        }
    }

    /// Records the outcome of one child.
    pub(crate) fn complete(&self, outcome: Result<(), PanicPayload>) {
        if let Err(payload) = outcome {
            let mut slot = self.panic.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.is_none() {
                *slot = Some(payload);
            } else {
                log::error!(
                    "Additional child task panic discarded: {}",
                    panic_message(payload.as_ref())
                );
            }
        }

        let previous = self.remaining.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "more child completions than children");
        if previous == 1 {
            let _ = self.done_tx.try_send(());
        }
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.remaining.load(Ordering::Acquire) == 0
    }

    /// Receives a single token once the last child has completed.
    pub(crate) fn done(&self) -> &Receiver<()> {
        &self.done_rx
    }

    /// Re-raises the first child panic, if any, on the calling thread.
    pub(crate) fn finish(&self) {
        debug_assert!(self.is_complete());
        let payload = self
            .panic
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(payload) = payload {
            panic::resume_unwind(payload);
        }
    }
}
