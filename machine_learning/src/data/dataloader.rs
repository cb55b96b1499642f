use std::num::NonZeroUsize;

use rand::{rngs::StdRng, seq::SliceRandom};

use super::dataset::{Batch, InMemoryDataset};
use super::shard::DistributedSampler;

/// The order a loader walks its dataset in.
#[derive(Debug, Clone)]
enum Order {
    Sequential,
    Shuffled(StdRng),
    Sharded(DistributedSampler),
}

/// Hands out a dataset as owned batches, one pass at a time.
#[derive(Debug, Clone)]
pub struct DataLoader {
    dataset: InMemoryDataset,
    batch_size: NonZeroUsize,
    order: Order,
}

impl DataLoader {
    /// Creates a loader that walks the dataset in its stored order.
    pub fn sequential(dataset: InMemoryDataset, batch_size: NonZeroUsize) -> Self {
        Self {
            dataset,
            batch_size,
            order: Order::Sequential,
        }
    }

    /// Creates a loader that draws a new permutation of the dataset from `rng`
    /// on every pass.
    pub fn shuffled(dataset: InMemoryDataset, batch_size: NonZeroUsize, rng: StdRng) -> Self {
        Self {
            dataset,
            batch_size,
            order: Order::Shuffled(rng),
        }
    }

    /// Creates a loader that only walks this worker's shard of the dataset.
    ///
    /// Every worker of the sampler's world gets the same amount of batches per
    /// pass, the ones with a shorter shard finish with empty batches.
    pub fn sharded(
        dataset: InMemoryDataset,
        batch_size: NonZeroUsize,
        sampler: DistributedSampler,
    ) -> Self {
        Self {
            dataset,
            batch_size,
            order: Order::Sharded(sampler),
        }
    }

    /// Forwards the epoch to the sampler of a sharded loader, no-op otherwise.
    pub fn set_epoch(&mut self, epoch: u64) {
        if let Order::Sharded(sampler) = &mut self.order {
            sampler.set_epoch(epoch);
        }
    }

    #[inline]
    pub fn dataset(&self) -> &InMemoryDataset {
        &self.dataset
    }

    #[inline]
    pub fn batch_size(&self) -> NonZeroUsize {
        self.batch_size
    }

    #[inline]
    pub fn is_sharded(&self) -> bool {
        matches!(self.order, Order::Sharded(_))
    }

    /// Returns the amount of batches in a pass.
    pub fn len(&self) -> usize {
        let samples = match &self.order {
            Order::Sharded(sampler) => sampler.max_shard_len(self.dataset.len()),
            _ => self.dataset.len(),
        };

        samples.div_ceil(self.batch_size.get())
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Starts a new pass over the dataset.
    ///
    /// # Returns
    /// A finite iterator of `len()` batches.
    pub fn batches(&mut self) -> Batches<'_> {
        let total = self.dataset.len();
        let remaining = self.len();

        let indices = match &mut self.order {
            Order::Sequential => (0..total).collect(),
            Order::Shuffled(rng) => {
                let mut perm: Vec<usize> = (0..total).collect();
                perm.shuffle(rng);
                perm
            }
            Order::Sharded(sampler) => sampler.indices(total),
        };

        Batches {
            dataset: &self.dataset,
            indices,
            batch_size: self.batch_size.get(),
            cursor: 0,
            remaining,
        }
    }
}

/// A single pass of a `DataLoader`.
#[derive(Debug)]
pub struct Batches<'a> {
    dataset: &'a InMemoryDataset,
    indices: Vec<usize>,
    batch_size: usize,
    cursor: usize,
    remaining: usize,
}

impl Iterator for Batches<'_> {
    type Item = Batch;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let start = self.cursor.min(self.indices.len());
        let end = (start + self.batch_size).min(self.indices.len());
        self.cursor = end;

        let chunk = &self.indices[start..end];
        let xs = self.dataset.xs();
        let ys = self.dataset.ys();

        Some(Batch {
            xs: chunk.iter().map(|&i| xs[i]).collect(),
            ys: chunk.iter().map(|&i| ys[i]).collect(),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Batches<'_> {}
