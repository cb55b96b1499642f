use std::num::NonZeroUsize;
use std::ops::Range;

use comms::World;
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};

/// Splits `total` samples among `num_workers` and returns the shard for `worker_id`.
///
/// Properties:
/// - Ranges are contiguous, disjoint and cover `[0..total)`.
/// - Sizes differ by at most 1 (balanced partition), the first shards get the extra samples.
pub fn shard_range(total: usize, worker_id: usize, num_workers: NonZeroUsize) -> Range<usize> {
    let num_workers = num_workers.get();
    debug_assert!(worker_id < num_workers);

    let base = total / num_workers;
    let rem = total % num_workers;

    let start = worker_id * base + worker_id.min(rem);
    let extra = usize::from(worker_id < rem);
    start..start + base + extra
}

/// Hands every worker a disjoint, balanced shard of a dataset, reshuffled
/// every epoch.
///
/// The permutation only depends on `seed + epoch`, so every worker computes the
/// same one and their shards partition the dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DistributedSampler {
    world: World,
    shuffle: bool,
    seed: u64,
    epoch: u64,
}

impl DistributedSampler {
    /// Creates a new `DistributedSampler`.
    ///
    /// # Arguments
    /// * `world` - The worker this sampler draws for.
    /// * `shuffle` - Whether to permute the dataset before sharding.
    /// * `seed` - The base seed of the permutation, shared by every worker.
    pub fn new(world: World, shuffle: bool, seed: u64) -> Self {
        Self {
            world,
            shuffle,
            seed,
            epoch: 0,
        }
    }

    /// Sets the epoch the next `indices` call draws for.
    pub fn set_epoch(&mut self, epoch: u64) {
        self.epoch = epoch;
    }

    #[inline]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    #[inline]
    pub fn world(&self) -> World {
        self.world
    }

    fn num_workers(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.world.size()).unwrap_or(NonZeroUsize::MIN)
    }

    /// Returns the length of the biggest shard of a `total` sized dataset.
    pub fn max_shard_len(&self, total: usize) -> usize {
        shard_range(total, 0, self.num_workers()).len()
    }

    /// Returns this worker's dataset indices for the current epoch.
    pub fn indices(&self, total: usize) -> Vec<usize> {
        let mut perm: Vec<usize> = (0..total).collect();
        if self.shuffle {
            let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(self.epoch));
            perm.shuffle(&mut rng);
        }

        let range = shard_range(total, self.world.rank(), self.num_workers());
        perm.drain(range).collect()
    }
}
