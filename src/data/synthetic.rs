// ============================================================
// Layer 4 — Synthetic Trajectory Generator
// ============================================================
// Produces kinematically plausible records for smoke runs and
// tests, without needing a recorded dataset.
//
// Ego motion follows a constant turn rate and constant
// longitudinal acceleration model sampled per record:
//
//   heading_{t+1} = heading_t + yaw_rate * dt
//   speed_{t+1}   = clamp(speed_t + accel * dt, 0, max_speed)
//   pos_{t+1}     = pos_t + vel_t * dt
//
// Neighbours are placed around the ego's last observed
// position, map elements are lane-centre points ahead of it
// (x y z + lane id + zero padding). Any per-step columns
// beyond the kinematic six carry the current speed.

use std::f32::consts::PI;

use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use crate::config::PipelineConfig;
use crate::domain::error::PipelineResult;
use crate::domain::traits::TrajectorySource;
use crate::domain::trajectory::{RecordShape, TrajectoryRecord, STATE_DIM};

const MAX_SPEED: f32 = 30.0;

#[derive(Debug, Clone)]
pub struct SyntheticGenerator {
    count:     usize,
    shape:     RecordShape,
    neighbors: usize,
    map_len:   usize,
    dt:        f32,
    seed:      u64,
}

impl SyntheticGenerator {
    pub fn new(count: usize, cfg: &PipelineConfig) -> Self {
        Self {
            count,
            shape:     cfg.record_shape(),
            neighbors: cfg.max_neighbors.min(4),
            map_len:   cfg.max_map_elements.min(8),
            dt:        0.1,
            seed:      cfg.seed,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_dt(mut self, dt: f32) -> Self {
        self.dt = dt;
        self
    }

    fn record(&self, index: usize, rng: &mut StdRng) -> TrajectoryRecord {
        let mut heading  = rng.gen_range(-PI..PI);
        let mut speed    = rng.gen_range(2.0..15.0f32);
        let yaw_rate     = rng.gen_range(-0.3..0.3f32);
        let accel        = rng.gen_range(-1.0..1.0f32);
        let mut position = [rng.gen_range(-50.0..50.0f32), rng.gen_range(-50.0..50.0f32), 0.0];

        let steps = self.shape.total_steps();
        let mut states = Vec::with_capacity(steps);
        for _ in 0..steps {
            let (vx, vy) = (speed * heading.cos(), speed * heading.sin());
            let mut row = vec![position[0], position[1], position[2], vx, vy, 0.0];
            row.resize(self.shape.input_size, speed);
            states.push(row);

            position[0] += vx * self.dt;
            position[1] += vy * self.dt;
            heading     += yaw_rate * self.dt;
            speed        = (speed + accel * self.dt).clamp(0.0, MAX_SPEED);
        }

        let anchor = &states[self.shape.history_steps.saturating_sub(1)];
        let (ax, ay, a_heading) = (anchor[0], anchor[1], anchor[4].atan2(anchor[3]));

        // Normal::new only fails for a negative or non-finite sigma.
        let offset = Normal::new(0.0f32, 8.0).ok();
        let neighbors = (0..self.neighbors)
            .map(|_| {
                let (dx, dy) = match &offset {
                    Some(n) => (n.sample(rng), n.sample(rng)),
                    None    => (0.0, 0.0),
                };
                let v = rng.gen_range(0.0..12.0f32);
                let h = rng.gen_range(-PI..PI);
                vec![ax + dx, ay + dy, 0.0, v * h.cos(), v * h.sin(), 0.0]
            })
            .collect();

        let map = (0..self.map_len)
            .map(|i| {
                let ahead = 5.0 * i as f32;
                let mut row = vec![ax + ahead * a_heading.cos(), ay + ahead * a_heading.sin(), 0.0];
                row.resize(self.shape.map_feature_size, 0.0);
                if self.shape.map_feature_size > 3 {
                    row[3] = (i % 2) as f32;
                }
                row
            })
            .collect();

        TrajectoryRecord::new(format!("synthetic-{index:05}"), states).with_context(neighbors, map)
    }
}

impl TrajectorySource for SyntheticGenerator {
    fn load_all(&self) -> PipelineResult<Vec<TrajectoryRecord>> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let records: Vec<_> = (0..self.count).map(|i| self.record(i, &mut rng)).collect();
        tracing::debug!(
            "Generated {} synthetic records ({} steps of {} features)",
            records.len(),
            self.shape.total_steps(),
            self.shape.input_size.max(STATE_DIM)
        );
        Ok(records)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> PipelineConfig {
        PipelineConfig { history_steps: 5, prediction_steps: 3, ..PipelineConfig::default() }
    }

    #[test]
    fn test_records_pass_validation() {
        let cfg = cfg();
        let records = SyntheticGenerator::new(6, &cfg).load_all().unwrap();
        assert_eq!(records.len(), 6);
        for r in &records {
            r.validate(&cfg.record_shape()).unwrap();
            assert!(!r.neighbors.is_empty());
            assert!(!r.map.is_empty());
        }
    }

    #[test]
    fn test_positions_follow_velocities() {
        let records = SyntheticGenerator::new(1, &cfg()).with_dt(0.5).load_all().unwrap();
        let s = &records[0].states;
        for w in s.windows(2) {
            assert!((w[1][0] - (w[0][0] + w[0][3] * 0.5)).abs() < 1e-3);
            assert!((w[1][1] - (w[0][1] + w[0][4] * 0.5)).abs() < 1e-3);
        }
    }

    #[test]
    fn test_extra_features_are_filled() {
        let cfg = PipelineConfig { input_size: 8, ..cfg() };
        let records = SyntheticGenerator::new(2, &cfg).load_all().unwrap();
        assert!(records.iter().all(|r| r.states.iter().all(|row| row.len() == 8)));
    }

    #[test]
    fn test_same_seed_same_records() {
        let a = SyntheticGenerator::new(3, &cfg()).with_seed(5).load_all().unwrap();
        let b = SyntheticGenerator::new(3, &cfg()).with_seed(5).load_all().unwrap();
        assert_eq!(a, b);
    }
}
