use log::debug;
use rand::{Rng, seq::SliceRandom, seq::index};
use serde::{Deserialize, Serialize};

use super::InMemoryDataset;
use crate::{MlErr, Result};

/// How the train indices of a split are drawn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitPolicy {
    /// Shuffles every index and cuts the permutation in two.
    #[default]
    ShuffleContiguous,
    /// Samples the train indices without replacement, validation keeps the
    /// remaining ones in their original order.
    RandomSubset,
}

/// The index sets of a train/validation partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub train: Vec<usize>,
    pub val: Vec<usize>,
}

impl Split {
    /// Materializes both sides of the split out of `dataset`.
    ///
    /// # Panics
    /// If the split was computed for a bigger dataset.
    pub fn apply(&self, dataset: &InMemoryDataset) -> (InMemoryDataset, InMemoryDataset) {
        (dataset.subset(&self.train), dataset.subset(&self.val))
    }
}

/// Returns the amount of train samples out of `n` for a train `fraction`,
/// `floor(n * fraction)`.
///
/// # Returns
/// An error if `fraction` is not a finite number in `[0, 1]`.
pub fn train_count(n: usize, fraction: f64) -> Result<usize> {
    if !fraction.is_finite() || !(0.0..=1.0).contains(&fraction) {
        return Err(MlErr::invalid_config(
            "train_fraction",
            format!("must be in [0, 1], got {fraction}"),
        ));
    }

    Ok(((n as f64) * fraction).floor() as usize)
}

/// Partitions the indices `0..n` into `n_train` train indices and `n - n_train`
/// validation indices.
///
/// # Arguments
/// * `n` - The size of the dataset.
/// * `n_train` - The amount of train samples.
/// * `policy` - How the train indices are drawn.
/// * `rng` - The source of randomness.
///
/// # Returns
/// An error if `n_train` exceeds `n`.
pub fn split_indices<R: Rng>(
    n: usize,
    n_train: usize,
    policy: SplitPolicy,
    rng: &mut R,
) -> Result<Split> {
    if n_train > n {
        return Err(MlErr::invalid_config(
            "train_count",
            format!("{n_train} train samples requested out of {n}"),
        ));
    }

    let split = match policy {
        SplitPolicy::ShuffleContiguous => {
            let mut idx: Vec<usize> = (0..n).collect();
            idx.shuffle(rng);
            let val = idx.split_off(n_train);
            Split { train: idx, val }
        }
        SplitPolicy::RandomSubset => {
            let train = index::sample(rng, n, n_train).into_vec();
            let mut taken = vec![false; n];
            train.iter().for_each(|&i| taken[i] = true);
            let val = (0..n).filter(|&i| !taken[i]).collect();
            Split { train, val }
        }
    };

    debug!(
        "dataset split: {} training, {} validation",
        split.train.len(),
        split.val.len()
    );

    Ok(split)
}

/// Splits `dataset` into `(train, validation)` by a train `fraction`.
pub fn train_val_split<R: Rng>(
    dataset: &InMemoryDataset,
    fraction: f64,
    policy: SplitPolicy,
    rng: &mut R,
) -> Result<(InMemoryDataset, InMemoryDataset)> {
    let n_train = train_count(dataset.len(), fraction)?;
    let split = split_indices(dataset.len(), n_train, policy, rng)?;
    Ok(split.apply(dataset))
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    const POLICIES: [SplitPolicy; 2] = [SplitPolicy::ShuffleContiguous, SplitPolicy::RandomSubset];

    fn assert_partition(split: &Split, n: usize) {
        let mut all: Vec<usize> = split.train.iter().chain(&split.val).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..n).collect::<Vec<_>>());
    }

    #[test]
    fn correct_split_sizes() {
        assert_eq!(train_count(100, 0.8).unwrap(), 80);
        assert_eq!(train_count(10, 0.75).unwrap(), 7);
        assert_eq!(train_count(10, 0.0).unwrap(), 0);
        assert_eq!(train_count(10, 1.0).unwrap(), 10);
    }

    #[test]
    fn splits_are_disjoint_and_cover_everything() {
        let mut rng = StdRng::seed_from_u64(13);

        for policy in POLICIES {
            for (n, fraction) in [(100, 0.8), (37, 0.5), (5, 0.99), (1, 0.3)] {
                let n_train = train_count(n, fraction).unwrap();
                let split = split_indices(n, n_train, policy, &mut rng).unwrap();

                assert_eq!(split.train.len(), n_train);
                assert_eq!(split.train.len() + split.val.len(), n);
                assert_partition(&split, n);
            }
        }
    }

    #[test]
    fn random_subset_keeps_validation_ordered() {
        let mut rng = StdRng::seed_from_u64(42);
        let split = split_indices(30, 10, SplitPolicy::RandomSubset, &mut rng).unwrap();
        assert!(split.val.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn split_is_reproducible() {
        for policy in POLICIES {
            let a = split_indices(50, 40, policy, &mut StdRng::seed_from_u64(3)).unwrap();
            let b = split_indices(50, 40, policy, &mut StdRng::seed_from_u64(3)).unwrap();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn invalid_requests_fail() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(split_indices(10, 11, SplitPolicy::ShuffleContiguous, &mut rng).is_err());
        assert!(train_count(10, -0.1).is_err());
        assert!(train_count(10, 1.5).is_err());
        assert!(train_count(10, f64::NAN).is_err());
    }

    #[test]
    fn split_moves_samples() {
        let ds = InMemoryDataset::new((0..10).map(|i| i as f32).collect(), vec![0.0; 10]).unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        let (train, val) =
            train_val_split(&ds, 0.8, SplitPolicy::ShuffleContiguous, &mut rng).unwrap();

        assert_eq!(train.len(), 8);
        assert_eq!(val.len(), 2);

        let mut xs: Vec<f32> = train.xs().iter().chain(val.xs()).copied().collect();
        xs.sort_by(f32::total_cmp);
        assert_eq!(xs, ds.xs());
    }
}
