// ============================================================
// Layer 4 — Train/Validation Splitter
// ============================================================
// Shuffles records and splits them into a training set (updates
// weights) and a held-out validation set (frozen evaluation).
//
// Recordings are usually stored in capture order, so neighbouring
// records come from the same scene; shuffling first keeps one
// scene from landing entirely in one side of the split.
//
// The shuffle is seeded from the run config so the same seed
// always yields the same split.

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

/// Shuffle `samples` with a seeded RNG and split into (train, validation).
///
/// `train_fraction` is the share kept for training, e.g. 0.8.
/// When there are at least two samples and the fraction is below 1.0,
/// each side gets at least one sample.
pub fn split_train_val<T>(mut samples: Vec<T>, train_fraction: f64, seed: u64) -> (Vec<T>, Vec<T>) {
    let mut rng = StdRng::seed_from_u64(seed);
    samples.shuffle(&mut rng);

    let total    = samples.len();
    let mut split_at = ((total as f64) * train_fraction).round() as usize;
    split_at = split_at.min(total);
    if total >= 2 && train_fraction < 1.0 {
        split_at = split_at.clamp(1, total - 1);
    }

    let val = samples.split_off(split_at);

    tracing::debug!(
        "Dataset split: {} training, {} validation ({}% / {}%)",
        samples.len(),
        val.len(),
        (samples.len() * 100) / total.max(1),
        (val.len()     * 100) / total.max(1),
    );

    (samples, val)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correct_split_sizes() {
        let items: Vec<usize> = (0..100).collect();
        let (train, val)      = split_train_val(items, 0.8, 1);
        assert_eq!(train.len(), 80);
        assert_eq!(val.len(),   20);
    }

    #[test]
    fn test_all_items_preserved() {
        let items: Vec<usize> = (0..50).collect();
        let (train, val)      = split_train_val(items, 0.7, 2);
        let mut all: Vec<usize> = train.into_iter().chain(val).collect();
        all.sort();
        assert_eq!(all, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_same_seed_same_split() {
        let a = split_train_val((0..30).collect::<Vec<usize>>(), 0.8, 9);
        let b = split_train_val((0..30).collect::<Vec<usize>>(), 0.8, 9);
        assert_eq!(a, b);
    }

    #[test]
    fn test_tiny_dataset_keeps_a_validation_sample() {
        let (train, val) = split_train_val(vec![1, 2, 3], 0.9, 0);
        assert_eq!(train.len(), 2);
        assert_eq!(val.len(), 1);
    }

    #[test]
    fn test_empty_dataset() {
        let items: Vec<usize> = Vec::new();
        let (train, val)      = split_train_val(items, 0.8, 0);
        assert!(train.is_empty());
        assert!(val.is_empty());
    }
}
