use ndarray::ArrayView2;

use crate::{MlErr, Result};

/// A single supervised sample (x, y).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub x: f32,
    pub y: f32,
}

/// An ordered, immutable set of scalar samples.
///
/// May be empty: a split with a train fraction of 1 leaves nothing for
/// validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InMemoryDataset {
    xs: Vec<f32>,
    ys: Vec<f32>,
}

impl InMemoryDataset {
    /// Creates a new dataset from owned buffers.
    ///
    /// # Returns
    /// An error if `xs` and `ys` differ in length.
    pub fn new(xs: Vec<f32>, ys: Vec<f32>) -> Result<Self> {
        if xs.len() != ys.len() {
            return Err(MlErr::SizeMismatch {
                what: "dataset targets",
                got: ys.len(),
                expected: xs.len(),
            });
        }

        Ok(Self { xs, ys })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.xs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.xs.is_empty()
    }

    /// Returns the sample at `idx`, if any.
    #[inline]
    pub fn get(&self, idx: usize) -> Option<Sample> {
        Some(Sample {
            x: *self.xs.get(idx)?,
            y: *self.ys.get(idx)?,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = Sample> + '_ {
        self.xs.iter().zip(&self.ys).map(|(&x, &y)| Sample { x, y })
    }

    #[inline]
    pub fn xs(&self) -> &[f32] {
        &self.xs
    }

    #[inline]
    pub fn ys(&self) -> &[f32] {
        &self.ys
    }

    /// Gathers the samples at `indices`, in that order.
    ///
    /// # Panics
    /// If an index is out of bounds.
    pub fn subset(&self, indices: &[usize]) -> Self {
        Self {
            xs: indices.iter().map(|&i| self.xs[i]).collect(),
            ys: indices.iter().map(|&i| self.ys[i]).collect(),
        }
    }
}

/// An owned group of samples processed together in one step.
///
/// Batches handed out by a sharded loader may be empty: a worker whose shard
/// ran out still has to take part in the collective step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    pub xs: Vec<f32>,
    pub ys: Vec<f32>,
}

impl Batch {
    #[inline]
    pub fn len(&self) -> usize {
        self.xs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.xs.is_empty()
    }

    /// Views inputs and targets as `(n, 1)` matrices.
    pub fn views(&self) -> Result<(ArrayView2<'_, f32>, ArrayView2<'_, f32>)> {
        let shape = |len| (len, 1);
        let size_err = |what, got| MlErr::SizeMismatch {
            what,
            got,
            expected: self.xs.len(),
        };

        let x = ArrayView2::from_shape(shape(self.xs.len()), &self.xs)
            .map_err(|_| size_err("batch inputs", self.xs.len()))?;
        let y = ArrayView2::from_shape(shape(self.ys.len()), &self.ys)
            .map_err(|_| size_err("batch targets", self.ys.len()))?;

        if x.nrows() != y.nrows() {
            return Err(size_err("batch targets", y.nrows()));
        }

        Ok((x, y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dataset_basic() {
        let ds = InMemoryDataset::new(vec![1.0, 2.0], vec![3.0, 5.0]).unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.get(0), Some(Sample { x: 1.0, y: 3.0 }));
        assert_eq!(ds.get(1), Some(Sample { x: 2.0, y: 5.0 }));
        assert_eq!(ds.get(2), None);
    }

    #[test]
    fn dataset_rejects_length_mismatch() {
        assert!(matches!(
            InMemoryDataset::new(vec![1.0, 2.0], vec![3.0]),
            Err(MlErr::SizeMismatch {
                got: 1,
                expected: 2,
                ..
            })
        ));
    }

    #[test]
    fn subset_keeps_given_order() {
        let ds = InMemoryDataset::new(vec![0.0, 1.0, 2.0, 3.0], vec![10.0, 11.0, 12.0, 13.0])
            .unwrap();
        let sub = ds.subset(&[3, 0]);
        assert_eq!(sub.xs(), &[3.0, 0.0]);
        assert_eq!(sub.ys(), &[13.0, 10.0]);
    }

    #[test]
    fn batch_views_are_columns() {
        let b = Batch {
            xs: vec![1.0, 2.0, 3.0],
            ys: vec![4.0, 5.0, 6.0],
        };
        let (x, y) = b.views().unwrap();
        assert_eq!(x.dim(), (3, 1));
        assert_eq!(y[[2, 0]], 6.0);
    }
}
