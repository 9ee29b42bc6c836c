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

//! A small particle field split into chunks that can be integrated in parallel.

use std::sync::{Arc, Mutex, PoisonError};

use ember_tasks::Task;

/// Half extent of the square the particles bounce around in.
pub const BOUNDS: f32 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    pub position: [f32; 2],
    pub velocity: [f32; 2],
}

impl Particle {
    fn integrate(&mut self, dt: f32) {
        for axis in 0..2 {
            self.position[axis] += self.velocity[axis] * dt;
            if self.position[axis].abs() > BOUNDS {
                self.position[axis] = self.position[axis].clamp(-BOUNDS, BOUNDS);
                self.velocity[axis] = -self.velocity[axis];
            }
        }
    }

    fn speed_squared(&self) -> f32 {
        self.velocity[0] * self.velocity[0] + self.velocity[1] * self.velocity[1]
    }
}

type Chunk = Arc<Mutex<Vec<Particle>>>;

/// Particles stored in independently lockable chunks.
#[derive(Debug, Clone)]
pub struct ParticleField {
    chunks: Vec<Chunk>,
}

impl ParticleField {
    /// Lays out `count` particles on a spiral, `chunk_size` per chunk.
    pub fn new(count: usize, chunk_size: usize) -> Self {
        let particles: Vec<Particle> = (0..count)
            .map(|i| {
                let angle = i as f32 * 0.618_034 * std::f32::consts::TAU;
                let radius = (i % 97) as f32;
                Particle {
                    position: [radius * angle.cos(), radius * angle.sin()],
                    velocity: [angle.sin() * 20.0, -angle.cos() * 20.0],
                }
            })
            .collect();

        let chunks = particles
            .chunks(chunk_size.max(1))
            .map(|chunk| Arc::new(Mutex::new(chunk.to_vec())))
            .collect();
        Self { chunks }
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn len(&self) -> usize {
        self.chunks.iter().map(|chunk| lock(chunk).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.iter().all(|chunk| lock(chunk).is_empty())
    }

    /// One task per chunk, each advancing its particles by `dt`.
    pub fn integration_tasks(&self, dt: f32) -> Vec<Task> {
        self.chunks
            .iter()
            .map(|chunk| {
                let chunk = Arc::clone(chunk);
                Task::simple(move || {
                    for particle in lock(&chunk).iter_mut() {
                        particle.integrate(dt);
                    }
                })
            })
            .collect()
    }

    /// Mean kinetic energy per particle, assuming unit mass.
    pub fn mean_energy(&self) -> f32 {
        let (sum, count) = self.chunks.iter().fold((0.0, 0usize), |(sum, count), chunk| {
            let chunk = lock(chunk);
            let energy: f32 = chunk.iter().map(|p| 0.5 * p.speed_squared()).sum();
            (sum + energy, count + chunk.len())
        });
        if count == 0 {
            0.0
        } else {
            sum / count as f32
        }
    }

    /// Largest distance of any particle from the origin.
    pub fn extent(&self) -> f32 {
        self.chunks
            .iter()
            .map(|chunk| {
                lock(chunk)
                    .iter()
                    .map(|p| p.position[0].hypot(p.position[1]))
                    .fold(0.0, f32::max)
            })
            .fold(0.0, f32::max)
    }
}

fn lock(chunk: &Chunk) -> std::sync::MutexGuard<'_, Vec<Particle>> {
    chunk.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_particles_are_split_into_chunks() {
        let field = ParticleField::new(250, 100);
        assert_eq!(field.chunk_count(), 3);
        assert_eq!(field.len(), 250);
        assert_eq!(field.integration_tasks(0.1).len(), 3);
        assert!(!field.is_empty());
        assert!(ParticleField::new(0, 100).is_empty());
    }

    #[test]
    fn test_particles_bounce_off_the_bounds() {
        let mut particle = Particle {
            position: [BOUNDS - 1.0, 0.0],
            velocity: [10.0, 0.0],
        };
        particle.integrate(1.0);
        assert_eq!(particle.position[0], BOUNDS);
        assert_eq!(particle.velocity[0], -10.0);
    }
}
