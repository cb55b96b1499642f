use std::{
    num::NonZeroUsize,
    sync::{Arc, Barrier},
};

use log::trace;
use parking_lot::Mutex;

use crate::{CommErr, ProcessGroup, Result, World};

/// The state of the collective currently in flight.
#[derive(Default)]
struct Round {
    acc: Vec<f32>,
    /// Buffer length of the first worker to enter the round.
    len: usize,
    contributed: usize,
    read: usize,
    poisoned: bool,
}

struct Shared {
    barrier: Barrier,
    round: Mutex<Round>,
}

/// A group of simulated workers living in the same process, each one driven by
/// its own thread.
///
/// Collectives accumulate into a shared buffer and use a barrier to separate
/// the write and read phases of every round. The last reader of a round resets
/// it before the closing barrier, so a fast worker can never enter the next
/// round while a slow one is still reading.
pub struct LocalGroup {
    world: World,
    shared: Arc<Shared>,
}

impl LocalGroup {
    /// Creates the connected handles of a new group.
    ///
    /// # Arguments
    /// * `size` - The amount of workers in the group.
    ///
    /// # Returns
    /// One handle per rank, ordered by rank.
    pub fn new(size: NonZeroUsize) -> Vec<Self> {
        let shared = Arc::new(Shared {
            barrier: Barrier::new(size.get()),
            round: Mutex::new(Round::default()),
        });

        (0..size.get())
            .map(|rank| Self {
                world: World::ranked(rank, size),
                shared: Arc::clone(&shared),
            })
            .collect()
    }

    /// Runs the read phase of a round, resetting it once everyone has read.
    fn finish_round<F>(&self, read: F) -> bool
    where
        F: FnOnce(&Round),
    {
        let mut round = self.shared.round.lock();
        read(&round);

        round.read += 1;
        if round.read == self.world.size() {
            round.contributed = 0;
            round.read = 0;
        }

        round.poisoned
    }
}

impl ProcessGroup for LocalGroup {
    fn world(&self) -> World {
        self.world
    }

    fn all_reduce_sum(&mut self, buf: &mut [f32]) -> Result<()> {
        {
            let mut round = self.shared.round.lock();
            if round.contributed == 0 {
                round.acc.clear();
                round.acc.resize(buf.len(), 0.0);
            }

            if round.acc.len() == buf.len() {
                round.acc.iter_mut().zip(buf.iter()).for_each(|(a, b)| *a += b);
            } else {
                round.poisoned = true;
            }

            round.contributed += 1;
        }

        self.shared.barrier.wait();
        let poisoned = self.finish_round(|round| {
            if !round.poisoned {
                buf.copy_from_slice(&round.acc);
            }
        });
        self.shared.barrier.wait();

        trace!(rank = self.world.rank(), len = buf.len(); "all-reduce done");

        if poisoned {
            return Err(CommErr::Poisoned);
        }

        Ok(())
    }

    fn broadcast(&mut self, buf: &mut [f32], root: usize) -> Result<()> {
        if root >= self.world.size() {
            return Err(CommErr::RankOutOfRange {
                rank: root,
                size: self.world.size(),
            });
        }

        let rank = self.world.rank();
        {
            let mut round = self.shared.round.lock();
            if round.contributed == 0 {
                round.len = buf.len();
            } else if round.len != buf.len() {
                round.poisoned = true;
            }

            round.contributed += 1;
            if rank == root {
                round.acc.clear();
                round.acc.extend_from_slice(buf);
            }
        }

        self.shared.barrier.wait();

        let mut expected = buf.len();
        let poisoned = self.finish_round(|round| {
            expected = round.acc.len();
            if !round.poisoned && rank != root {
                buf.copy_from_slice(&round.acc);
            }
        });

        self.shared.barrier.wait();

        if expected != buf.len() {
            return Err(CommErr::LengthMismatch {
                got: buf.len(),
                expected,
            });
        }

        if poisoned {
            return Err(CommErr::Poisoned);
        }

        Ok(())
    }

    fn barrier(&mut self) -> Result<()> {
        self.shared.barrier.wait();
        Ok(())
    }

    fn destroy(self) -> Result<()> {
        self.shared.barrier.wait();
        Ok(())
    }
}
