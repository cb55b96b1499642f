use std::num::NonZeroUsize;

use crate::{CommErr, Result};

/// The identity of a worker inside a group of replicas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct World {
    rank: usize,
    size: NonZeroUsize,
}

impl World {
    /// Creates a new `World`.
    ///
    /// # Arguments
    /// * `rank` - The index of this worker.
    /// * `size` - The total amount of workers.
    ///
    /// # Returns
    /// An error if `rank` is not smaller than `size`.
    pub fn new(rank: usize, size: NonZeroUsize) -> Result<Self> {
        if rank >= size.get() {
            return Err(CommErr::RankOutOfRange {
                rank,
                size: size.get(),
            });
        }

        Ok(Self { rank, size })
    }

    /// Builds a `World` whose rank is already known to be in range.
    pub(crate) fn ranked(rank: usize, size: NonZeroUsize) -> Self {
        debug_assert!(rank < size.get());
        Self { rank, size }
    }

    /// The world of a single, non distributed, worker.
    pub fn solo() -> Self {
        Self {
            rank: 0,
            size: NonZeroUsize::MIN,
        }
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.rank
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size.get()
    }

    /// Whether more than one replica takes part in training.
    #[inline]
    pub fn is_distributed(&self) -> bool {
        self.size.get() > 1
    }
}
