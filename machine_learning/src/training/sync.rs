use comms::ProcessGroup;

use crate::Result;

/// What a gradient synchronization learned about the global batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlobalBatch {
    /// Samples across every worker's batch.
    pub samples: f32,
    /// Sum of every sample's loss across workers.
    pub loss_sum: f32,
}

/// Averages gradients across workers, weighting each by its batch size.
///
/// Every worker contributes `[n·g…, n, n·loss]` to one all-reduce, so the
/// result is the gradient of the union of the local batches no matter how
/// unevenly the shards ended.
#[derive(Debug, Clone)]
pub struct GradSync {
    buf: Vec<f32>,
}

impl GradSync {
    /// Creates a new `GradSync` for gradients of `size` parameters.
    pub fn new(size: usize) -> Self {
        Self {
            buf: vec![0.0; size + 2],
        }
    }

    /// Replaces the local gradient `grad` with the global one.
    ///
    /// # Arguments
    /// * `group` - The process group shared by every worker.
    /// * `grad` - This worker's gradient, mean over its `samples`.
    /// * `samples` - The size of this worker's batch, may be zero.
    /// * `loss` - This worker's batch loss, ignored if `samples` is zero.
    ///
    /// # Returns
    /// The global batch size and loss sum. When the global batch is empty
    /// `grad` is left zeroed.
    pub fn sync<G: ProcessGroup>(
        &mut self,
        group: &mut G,
        grad: &mut [f32],
        samples: usize,
        loss: f32,
    ) -> Result<GlobalBatch> {
        let n = samples as f32;
        let (g, tail) = self.buf.split_at_mut(grad.len());

        g.iter_mut().zip(grad.iter()).for_each(|(b, &g)| *b = n * g);
        tail[0] = n;
        tail[1] = if samples == 0 { 0.0 } else { n * loss };

        group.all_reduce_sum(&mut self.buf)?;

        let (g, tail) = self.buf.split_at(grad.len());
        let global = GlobalBatch {
            samples: tail[0],
            loss_sum: tail[1],
        };

        if global.samples > 0.0 {
            grad.iter_mut()
                .zip(g)
                .for_each(|(d, &s)| *d = s / global.samples);
        } else {
            grad.fill(0.0);
        }

        Ok(global)
    }
}
