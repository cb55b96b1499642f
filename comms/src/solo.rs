use crate::{CommErr, ProcessGroup, Result, World};

/// The group of a non distributed run, every collective is the identity.
#[derive(Debug, Clone, Copy, Default)]
pub struct SoloGroup;

impl SoloGroup {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessGroup for SoloGroup {
    fn world(&self) -> World {
        World::solo()
    }

    fn all_reduce_sum(&mut self, _buf: &mut [f32]) -> Result<()> {
        Ok(())
    }

    fn broadcast(&mut self, _buf: &mut [f32], root: usize) -> Result<()> {
        if root != 0 {
            return Err(CommErr::RankOutOfRange {
                rank: root,
                size: 1,
            });
        }

        Ok(())
    }

    fn barrier(&mut self) -> Result<()> {
        Ok(())
    }

    fn destroy(self) -> Result<()> {
        Ok(())
    }
}
