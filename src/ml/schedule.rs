// Learning-rate schedule, indexed by global optimizer step.
//
//   step < warmup : peak * (step + 1) / warmup
//   afterwards    : floor + (peak - floor) * ½(1 + cos(π · progress))
//
// where progress runs 0 → 1 over the remaining steps and
// floor = 10% of the peak.

use std::f64::consts::PI;

const FLOOR_RATIO: f64 = 0.1;

#[derive(Debug, Clone, Copy)]
pub struct WarmupCosine {
    peak:         f64,
    warmup_steps: usize,
    total_steps:  usize,
}

impl WarmupCosine {
    pub fn new(peak: f64, warmup_steps: usize, total_steps: usize) -> Self {
        Self { peak, warmup_steps, total_steps: total_steps.max(1) }
    }

    pub fn lr(&self, step: usize) -> f64 {
        if step < self.warmup_steps {
            return self.peak * (step + 1) as f64 / self.warmup_steps as f64;
        }
        let floor = self.peak * FLOOR_RATIO;
        let decay_steps = self.total_steps.saturating_sub(self.warmup_steps).max(1);
        let progress = ((step - self.warmup_steps) as f64 / decay_steps as f64).min(1.0);
        floor + (self.peak - floor) * 0.5 * (1.0 + (PI * progress).cos())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warmup_ramps_linearly_to_peak() {
        let s = WarmupCosine::new(1e-3, 10, 100);
        assert!((s.lr(0) - 1e-4).abs() < 1e-12);
        assert!((s.lr(4) - 5e-4).abs() < 1e-12);
        assert!((s.lr(9) - 1e-3).abs() < 1e-12);
    }

    #[test]
    fn test_decay_is_monotone_and_ends_at_floor() {
        let s = WarmupCosine::new(1e-3, 10, 100);
        let mut prev = s.lr(10);
        assert!((prev - 1e-3).abs() < 1e-12);
        for step in 11..=100 {
            let lr = s.lr(step);
            assert!(lr <= prev);
            prev = lr;
        }
        assert!((s.lr(100) - 1e-4).abs() < 1e-12);
        // past the end it stays at the floor
        assert!((s.lr(500) - 1e-4).abs() < 1e-12);
    }

    #[test]
    fn test_no_warmup_starts_at_peak() {
        let s = WarmupCosine::new(0.01, 0, 20);
        assert!((s.lr(0) - 0.01).abs() < 1e-12);
    }
}
