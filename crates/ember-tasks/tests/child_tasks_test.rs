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

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ember_tasks::{SchedulerConfig, Task, TaskClass, TaskContext, TaskScheduler};

const TIMEOUT: Duration = Duration::from_secs(10);
const FAN_OUT: usize = 5;

/// Builds `FAN_OUT` children that record whether they saw the parent's class
/// and thread affinity.
fn children(class: TaskClass, matching: &Arc<AtomicUsize>) -> Vec<Task> {
    (0..FAN_OUT)
        .map(|_| {
            let matching = Arc::clone(matching);
            Task::new(move |ctx| {
                if ctx.class() == class && ctx.is_main_thread() == (class == TaskClass::MainThread) {
                    matching.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect()
}

#[test]
fn test_background_children_finish_before_the_parent_resumes() {
    let scheduler = TaskScheduler::new(SchedulerConfig::uniform(2)).unwrap();
    let handle = scheduler.handle();
    let (tx, rx) = crossbeam_channel::unbounded();

    for class in TaskClass::BACKGROUND {
        let tx = tx.clone();
        handle.schedule_task(
            class,
            Task::new(move |ctx| {
                let matching = Arc::new(AtomicUsize::new(0));
                ctx.process_child_tasks(children(class, &matching));
                // Children are done and their writes are visible here.
                tx.send((class, matching.load(Ordering::SeqCst))).unwrap();
            }),
        );
    }

    for _ in TaskClass::BACKGROUND {
        let (class, matching) = rx.recv_timeout(TIMEOUT).unwrap();
        assert_eq!(matching, FAN_OUT, "{class} children ran with the wrong affinity");
    }
}

#[test]
fn test_main_thread_children_run_inline() {
    let scheduler = TaskScheduler::new(SchedulerConfig::uniform(1)).unwrap();
    let handle = scheduler.handle();
    let matching = Arc::new(AtomicUsize::new(0));
    let after_join = Arc::new(AtomicUsize::new(0));

    let (count, observed) = (Arc::clone(&matching), Arc::clone(&after_join));
    handle.schedule_task(
        TaskClass::MainThread,
        Task::new(move |ctx| {
            ctx.process_child_tasks(children(TaskClass::MainThread, &count));
            observed.store(count.load(Ordering::SeqCst), Ordering::SeqCst);
        }),
    );

    // Children never reach the main-thread queue.
    assert_eq!(scheduler.execute_main_thread_tasks(), 1);
    assert_eq!(matching.load(Ordering::SeqCst), FAN_OUT);
    assert_eq!(after_join.load(Ordering::SeqCst), FAN_OUT);
    assert_eq!(
        handle.stats().class(TaskClass::MainThread).completed,
        FAN_OUT as u64 + 1
    );
}

#[test]
fn test_single_child_is_synchronous() {
    let scheduler = TaskScheduler::new(SchedulerConfig::uniform(1)).unwrap();
    let handle = scheduler.handle();
    let (tx, rx) = crossbeam_channel::unbounded();

    handle.schedule_task(
        TaskClass::Large,
        Task::new(move |ctx| {
            let value = Arc::new(AtomicUsize::new(0));
            let written = Arc::clone(&value);
            ctx.process_child_task(Task::simple(move || written.store(42, Ordering::SeqCst)));
            tx.send(value.load(Ordering::SeqCst)).unwrap();
        }),
    );

    assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), 42);
}

fn nest(ctx: &TaskContext, depth: usize, leaves: Arc<AtomicUsize>) {
    if depth == 0 {
        leaves.fetch_add(1, Ordering::SeqCst);
        return;
    }
    let tasks = (0..FAN_OUT).map(|_| {
        let leaves = Arc::clone(&leaves);
        Task::new(move |ctx| nest(ctx, depth - 1, leaves))
    });
    ctx.process_child_tasks(tasks);
}

#[test]
fn test_three_levels_of_nesting_on_single_worker_pools() {
    // One worker per pool: nested joins only make progress because waiting
    // parents keep executing queued children.
    let scheduler = TaskScheduler::new(SchedulerConfig::uniform(1)).unwrap();
    let handle = scheduler.handle();
    let (tx, rx) = crossbeam_channel::unbounded();

    for class in [TaskClass::Small, TaskClass::GameLogic, TaskClass::Large] {
        let tx = tx.clone();
        handle.schedule_task(
            class,
            Task::new(move |ctx| {
                let leaves = Arc::new(AtomicUsize::new(0));
                nest(ctx, 3, Arc::clone(&leaves));
                tx.send((class, leaves.load(Ordering::SeqCst))).unwrap();
            }),
        );
    }

    for _ in 0..3 {
        let (class, leaves) = rx.recv_timeout(TIMEOUT).unwrap();
        assert_eq!(leaves, FAN_OUT * FAN_OUT * FAN_OUT, "{class} nesting lost work");
    }
}

#[test]
fn test_nested_main_thread_children() {
    let scheduler = TaskScheduler::new(SchedulerConfig::uniform(1)).unwrap();
    let handle = scheduler.handle();
    let leaves = Arc::new(AtomicUsize::new(0));

    let root = Arc::clone(&leaves);
    handle.schedule_task(
        TaskClass::MainThread,
        Task::new(move |ctx| nest(ctx, 3, root)),
    );

    scheduler.execute_main_thread_tasks();
    assert_eq!(leaves.load(Ordering::SeqCst), 125);
}

#[test]
fn test_child_panic_is_raised_in_the_parent() {
    let scheduler = TaskScheduler::new(SchedulerConfig::uniform(2)).unwrap();
    let handle = scheduler.handle();
    let (tx, rx) = crossbeam_channel::unbounded();

    handle.schedule_task(
        TaskClass::Small,
        Task::new(move |ctx| {
            let finished = Arc::new(AtomicUsize::new(0));
            let mut tasks: Vec<Task> = (0..4)
                .map(|_| {
                    let finished = Arc::clone(&finished);
                    Task::simple(move || {
                        finished.fetch_add(1, Ordering::SeqCst);
                    })
                })
                .collect();
            tasks.insert(2, Task::simple(|| panic!("child failed")));

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| ctx.process_child_tasks(tasks)));
            let message = outcome
                .err()
                .and_then(|payload| payload.downcast_ref::<&str>().map(|s| s.to_string()));
            tx.send((message, finished.load(Ordering::SeqCst))).unwrap();
        }),
    );

    let (message, finished) = rx.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(message.as_deref(), Some("child failed"));
    assert_eq!(finished, 4, "siblings of a panicking child still run");
}

#[test]
fn test_unhandled_child_panic_is_contained_like_any_task_panic() {
    let scheduler = TaskScheduler::new(SchedulerConfig::uniform(1)).unwrap();
    let handle = scheduler.handle();
    let (tx, rx) = crossbeam_channel::unbounded();

    handle.schedule_task(
        TaskClass::Large,
        Task::new(|ctx| ctx.process_child_task(Task::simple(|| panic!("deep failure")))),
    );
    handle.schedule_task(TaskClass::Large, Task::simple(move || tx.send(()).unwrap()));

    rx.recv_timeout(TIMEOUT).expect("the pool survives");
    // The child and the parent that re-raised its panic.
    assert_eq!(handle.stats().class(TaskClass::Large).panicked, 2);
}

#[test]
fn test_main_thread_single_child_is_synchronous() {
    let scheduler = TaskScheduler::new(SchedulerConfig::uniform(1)).unwrap();
    let handle = scheduler.handle();
    let observed = Arc::new(AtomicUsize::new(0));

    let seen_after_call = Arc::clone(&observed);
    handle.schedule_task(
        TaskClass::MainThread,
        Task::new(move |ctx| {
            let flag = Arc::new(AtomicUsize::new(0));
            let child_flag = Arc::clone(&flag);
            ctx.process_child_task(Task::new(move |child| {
                if child.class() == TaskClass::MainThread && child.is_main_thread() {
                    child_flag.store(1, Ordering::SeqCst);
                }
            }));
            // The flag must already be set when the call returns.
            seen_after_call.store(flag.load(Ordering::SeqCst), Ordering::SeqCst);
        }),
    );

    assert_eq!(scheduler.execute_main_thread_tasks(), 1);
    assert_eq!(observed.load(Ordering::SeqCst), 1);
}

#[test]
fn test_three_level_nested_batch_finishes_before_its_continuation() {
    // --- 1. ARRANGE ---
    let scheduler = TaskScheduler::new(SchedulerConfig::uniform(1)).unwrap();
    let handle = scheduler.handle();
    let leaves = Arc::new(AtomicUsize::new(0));
    let (tx, rx) = crossbeam_channel::unbounded();

    // Each batch member fans out to FAN_OUT children of FAN_OUT leaves each.
    let members: Vec<Task> = (0..FAN_OUT)
        .map(|_| {
            let leaves = Arc::clone(&leaves);
            Task::new(move |ctx| nest(ctx, 2, leaves))
        })
        .collect();

    // --- 2. ACT ---
    let observed = Arc::clone(&leaves);
    handle.schedule_tasks(
        TaskClass::Small,
        members,
        Task::new(move |ctx| {
            tx.send((observed.load(Ordering::SeqCst), ctx.class(), ctx.is_main_thread()))
                .unwrap();
        }),
    );

    // --- 3. ASSERT ---
    let (count, class, on_main) = rx.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(count, FAN_OUT * FAN_OUT * FAN_OUT);
    assert_eq!(class, TaskClass::Small);
    assert!(!on_main);
}

#[test]
fn test_main_thread_children_stop_at_the_first_panic() {
    let scheduler = TaskScheduler::new(SchedulerConfig::uniform(1)).unwrap();
    let handle = scheduler.handle();
    let ran = Arc::new(AtomicUsize::new(0));
    let raised = Arc::new(AtomicUsize::new(0));

    let (counter, parent_raised) = (Arc::clone(&ran), Arc::clone(&raised));
    handle.schedule_task(
        TaskClass::MainThread,
        Task::new(move |ctx| {
            let before = Arc::clone(&counter);
            let after = Arc::clone(&counter);
            let tasks = vec![
                Task::simple(move || {
                    before.fetch_add(1, Ordering::SeqCst);
                }),
                Task::simple(|| panic!("main-thread child failed")),
                Task::simple(move || {
                    after.fetch_add(1, Ordering::SeqCst);
                }),
            ];
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| ctx.process_child_tasks(tasks)));
            if outcome.is_err() {
                parent_raised.fetch_add(1, Ordering::SeqCst);
            }
        }),
    );

    assert_eq!(scheduler.execute_main_thread_tasks(), 1);
    assert_eq!(raised.load(Ordering::SeqCst), 1);
    assert_eq!(ran.load(Ordering::SeqCst), 1, "the child after the panic must not start");

    let main = handle.stats().class(TaskClass::MainThread);
    // The parent and the two children that started.
    assert_eq!(main.scheduled, 3);
    assert_eq!(main.completed, 3);
    assert_eq!(main.panicked, 1);
}
