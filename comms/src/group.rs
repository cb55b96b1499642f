use crate::{Result, World};

/// A handle to a group of replicas that step through collectives together.
///
/// Every worker owns one handle. Collectives block until every member of the
/// group has entered the same operation with a buffer of the same length, so
/// all workers must call them in the same order.
pub trait ProcessGroup: Send {
    /// Returns this worker's place in the group.
    fn world(&self) -> World;

    /// Sums `buf` element-wise across the group.
    ///
    /// # Arguments
    /// * `buf` - This worker's contribution, overwritten with the group sum.
    ///
    /// # Returns
    /// An error if the buffer lengths disagree or the transport fails. Every
    /// worker receives a bit-identical result on success.
    fn all_reduce_sum(&mut self, buf: &mut [f32]) -> Result<()>;

    /// Copies the `root` worker's buffer into every other worker's buffer.
    ///
    /// # Arguments
    /// * `buf` - Source on `root`, destination everywhere else.
    /// * `root` - The rank whose buffer is broadcast.
    fn broadcast(&mut self, buf: &mut [f32], root: usize) -> Result<()>;

    /// Blocks until every worker reaches the barrier.
    fn barrier(&mut self) -> Result<()>;

    /// Leaves the group. Collective: returns once every worker has left.
    fn destroy(self) -> Result<()>
    where
        Self: Sized;
}
