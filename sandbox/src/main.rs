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

// Ember Sandbox
// Headless frame loop exercising every task class of the scheduler.

mod particles;

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use ember_tasks::{SchedulerConfig, SchedulerHandle, Task, TaskClass, TaskScheduler};

use particles::ParticleField;

const DT: f32 = 1.0 / 60.0;
const PARTICLES_PER_CHUNK: usize = 512;
const ASSET_LOAD_INTERVAL: u64 = 10;
const ASSETS_PER_LOAD: usize = 4;
const ANALYSIS_INTERVAL: u64 = 30;

#[derive(Debug, Parser)]
#[command(version, about = "Headless frame loop driving the ember task scheduler")]
struct Args {
    /// Number of frames to simulate.
    #[arg(long, default_value_t = 120)]
    frames: u64,

    /// Number of simulated particles.
    #[arg(long, default_value_t = 10_000)]
    particles: usize,

    /// TOML file with scheduler settings.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Overrides the number of small/game-logic workers.
    #[arg(long)]
    small_workers: Option<usize>,

    /// Overrides the number of large-task workers.
    #[arg(long)]
    large_workers: Option<usize>,

    /// Overrides the number of file workers.
    #[arg(long)]
    file_workers: Option<usize>,
}

/// Loads the scheduler configuration, then applies command-line overrides.
fn load_config(args: &Args) -> Result<SchedulerConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file at '{}'", path.display()))?;
            toml::from_str(&text)
                .with_context(|| format!("Failed to parse TOML from '{}'", path.display()))?
        }
        None => SchedulerConfig::default(),
    };

    if let Some(count) = args.small_workers {
        config.small_task_workers = count;
    }
    if let Some(count) = args.large_workers {
        config.large_task_workers = count;
    }
    if let Some(count) = args.file_workers {
        config.file_task_workers = count;
    }
    Ok(config)
}

/// State owned by the main thread and updated by main-thread tasks.
#[derive(Debug, Default)]
struct World {
    presented_frames: u64,
    mean_energy: f32,
    extent: f32,
    loaded_assets: usize,
    loaded_bytes: usize,
}

type SharedWorld = Arc<Mutex<World>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Integrates the particle field on the game-logic pool and hands the result
/// to the main thread within the same frame.
fn schedule_simulation(handle: &SchedulerHandle, field: &ParticleField, world: &SharedWorld) {
    let field = field.clone();
    let world = Arc::clone(world);
    handle.schedule_task(
        TaskClass::GameLogic,
        Task::new(move |ctx| {
            ctx.process_child_tasks(field.integration_tasks(DT));
            let mean_energy = field.mean_energy();
            let extent = field.extent();

            ctx.scheduler().schedule_task(
                TaskClass::MainThread,
                Task::new(move |ctx| {
                    let mut world = lock(&world);
                    world.presented_frames += 1;
                    world.mean_energy = mean_energy;
                    world.extent = extent;
                    log::trace!("Presented frame {}.", ctx.scheduler().current_frame());
                }),
            );
        }),
    );
}

/// Reads a batch of fake assets on the file pool. The continuation hands the
/// results to the main thread, possibly several frames later.
fn schedule_asset_loads(
    handle: &SchedulerHandle,
    frame: u64,
    world: &SharedWorld,
    loads_in_flight: &Arc<AtomicUsize>,
) {
    let loaded: Arc<Mutex<Vec<Vec<u8>>>> = Arc::default();
    let reads: Vec<Task> = (0..ASSETS_PER_LOAD)
        .map(|index| {
            let loaded = Arc::clone(&loaded);
            Task::simple(move || {
                // Stand-in for blocking I/O.
                thread::sleep(Duration::from_millis(3));
                let bytes = format!("asset-{frame}-{index}").repeat(64).into_bytes();
                lock(&loaded).push(bytes);
            })
        })
        .collect();

    loads_in_flight.fetch_add(1, Ordering::SeqCst);
    let world = Arc::clone(world);
    let loads_in_flight = Arc::clone(loads_in_flight);
    handle.schedule_tasks(
        TaskClass::File,
        reads,
        Task::new(move |ctx| {
            let assets = std::mem::take(&mut *lock(&loaded));
            ctx.scheduler().schedule_task(
                TaskClass::MainThread,
                Task::simple(move || {
                    let bytes: usize = assets.iter().map(Vec::len).sum();
                    let mut world = lock(&world);
                    world.loaded_assets += assets.len();
                    world.loaded_bytes += bytes;
                    log::debug!("Loaded {} assets ({bytes} bytes) requested in frame {frame}.", assets.len());
                    loads_in_flight.fetch_sub(1, Ordering::SeqCst);
                }),
            );
        }),
    );
}

/// Computes field statistics on the large pool without holding up the frame.
fn schedule_analysis(handle: &SchedulerHandle, frame: u64, field: &ParticleField) {
    let field = field.clone();
    handle.schedule_task(
        TaskClass::Large,
        Task::simple(move || {
            log::info!(
                "Frame {frame}: mean energy {:.2}, extent {:.1}.",
                field.mean_energy(),
                field.extent()
            );
        }),
    );
}

fn average_frame_time(total: Duration, frames: u64) -> Duration {
    if frames == 0 {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(total.as_secs_f64() / frames as f64)
}

fn main() -> Result<()> {
    use env_logger::{Builder, Env};

    Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = load_config(&args)?;
    let mut scheduler =
        TaskScheduler::new(config).context("Failed to start the task scheduler")?;
    let handle = scheduler.handle();

    let field = ParticleField::new(args.particles, PARTICLES_PER_CHUNK);
    let world = SharedWorld::default();
    let loads_in_flight = Arc::new(AtomicUsize::new(0));
    log::info!(
        "Simulating {} particles in {} chunks for {} frames.",
        field.len(),
        field.chunk_count(),
        args.frames
    );

    let mut total_frame_time = Duration::ZERO;
    let mut slowest_frame = Duration::ZERO;
    for _ in 0..args.frames {
        let started = Instant::now();
        let frame = handle.current_frame();

        schedule_simulation(&handle, &field, &world);
        if frame % ASSET_LOAD_INTERVAL == 0 {
            schedule_asset_loads(&handle, frame, &world, &loads_in_flight);
        }
        if frame % ANALYSIS_INTERVAL == 0 {
            schedule_analysis(&handle, frame, &field);
        }

        let summary = scheduler.complete_frame();
        let elapsed = started.elapsed();
        total_frame_time += elapsed;
        slowest_frame = slowest_frame.max(elapsed);
        log::trace!(
            "Frame {} ran {} main-thread tasks in {:?}.",
            summary.frame,
            summary.main_thread_tasks,
            elapsed
        );
    }

    // Asset loads may still be on their way to the main thread.
    while loads_in_flight.load(Ordering::SeqCst) > 0 {
        if scheduler.execute_main_thread_tasks() == 0 {
            thread::sleep(Duration::from_millis(1));
        }
    }
    scheduler.shutdown();

    let world = lock(&world);
    if args.frames > 0 {
        log::info!(
            "Average frame time {:?}, slowest {slowest_frame:?}.",
            average_frame_time(total_frame_time, args.frames)
        );
    }
    log::info!(
        "Presented {} frames, mean energy {:.2}, extent {:.1}, loaded {} assets ({} bytes).",
        world.presented_frames,
        world.mean_energy,
        world.extent,
        world.loaded_assets,
        world.loaded_bytes
    );
    let stats = handle.stats();
    for class in TaskClass::ALL {
        let class_stats = stats.class(class);
        log::info!(
            "{class:>12}: {} scheduled, {} completed, {} panicked.",
            class_stats.scheduled,
            class_stats.completed,
            class_stats.panicked
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_apply_on_top_of_defaults() {
        let args = Args::parse_from(["sandbox", "--small-workers", "3", "--file-workers", "2"]);
        let config = load_config(&args).unwrap();
        assert_eq!(config.small_task_workers, 3);
        assert_eq!(config.file_task_workers, 2);
        assert_eq!(
            config.large_task_workers,
            SchedulerConfig::default().large_task_workers
        );
    }

    #[test]
    fn test_average_frame_time_handles_large_frame_counts() {
        assert_eq!(average_frame_time(Duration::from_secs(1), 0), Duration::ZERO);
        assert_eq!(
            average_frame_time(Duration::from_secs(2), 4),
            Duration::from_millis(500)
        );
        let frames = 1_u64 << 32;
        assert!(average_frame_time(Duration::from_secs(1), frames) < Duration::from_micros(1));
    }

    #[test]
    fn test_partial_toml_keeps_remaining_defaults() {
        let config: SchedulerConfig = toml::from_str("file_task_workers = 4").unwrap();
        assert_eq!(config.file_task_workers, 4);
        assert_eq!(config.thread_name_prefix, "ember");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let args = Args::parse_from(["sandbox", "--config", "does/not/exist.toml"]);
        let error = load_config(&args).unwrap_err();
        assert!(error.to_string().contains("does/not/exist.toml"));
    }
}
