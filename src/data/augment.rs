// ============================================================
// Layer 4 — Trajectory Augmentation
// ============================================================
// Stochastic perturbation of whole records, applied every time
// the training dataset hands a record out.
//
// GaussianJitter adds zero-mean noise to positions and
// velocities of the ego states and neighbours. Each draw is
// clamped to ±3σ and the resulting speed is capped, so a noisy
// sample is still something a real agent could have done.
// Time-step count, row widths and auxiliary features are left
// untouched.

use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

use crate::domain::traits::Augmenter;
use crate::domain::trajectory::{TrajectoryRecord, POSITION_DIM, STATE_DIM};

#[derive(Debug, Clone)]
pub struct GaussianJitter {
    position_sigma: f32,
    velocity_sigma: f32,
    /// Upper bound on the speed of any perturbed state (m/s).
    max_speed:      f32,
}

impl GaussianJitter {
    pub fn new(position_sigma: f32, velocity_sigma: f32, max_speed: f32) -> Self {
        Self {
            position_sigma: position_sigma.max(0.0),
            velocity_sigma: velocity_sigma.max(0.0),
            max_speed,
        }
    }

    fn jitter_row(&self, row: &mut [f32], pos: &Option<Normal<f32>>, vel: &Option<Normal<f32>>, rng: &mut StdRng) {
        let kinematic = row.len().min(STATE_DIM);
        for (i, v) in row.iter_mut().take(kinematic).enumerate() {
            let (dist, sigma) = if i < POSITION_DIM {
                (pos, self.position_sigma)
            } else {
                (vel, self.velocity_sigma)
            };
            if let Some(d) = dist {
                let bound = 3.0 * sigma;
                *v += d.sample(rng).clamp(-bound, bound);
            }
        }
        if kinematic == STATE_DIM {
            let speed = (row[3] * row[3] + row[4] * row[4] + row[5] * row[5]).sqrt();
            if speed > self.max_speed && speed > 0.0 {
                let k = self.max_speed / speed;
                row[3] *= k;
                row[4] *= k;
                row[5] *= k;
            }
        }
    }
}

impl Default for GaussianJitter {
    fn default() -> Self {
        Self::new(0.05, 0.1, 70.0)
    }
}

impl Augmenter for GaussianJitter {
    fn augment(&self, record: &TrajectoryRecord, rng: &mut StdRng) -> TrajectoryRecord {
        // Normal::new only fails for a negative or non-finite sigma.
        let pos = Normal::new(0.0, self.position_sigma).ok().filter(|_| self.position_sigma > 0.0);
        let vel = Normal::new(0.0, self.velocity_sigma).ok().filter(|_| self.velocity_sigma > 0.0);

        let mut out = record.clone();
        for row in out.states.iter_mut().chain(out.neighbors.iter_mut()) {
            self.jitter_row(row, &pos, &vel, rng);
        }
        out
    }

    fn name(&self) -> &'static str {
        "gaussian_jitter"
    }
}
