use comms::{ProcessGroup, World};
use log::{debug, info};
use ndarray::{ArrayView2, Axis};

use super::{EpochReport, GradSync, Mode, TrainerState};
use crate::{
    MlErr, Result,
    arch::{Model, StateDict, loss::LossFn},
    data::{Batch, DataLoader},
    optimization::Optimizer,
};

/// Fits a model replica on this worker's data, keeping it identical to every
/// other replica of the process group.
///
/// The parameters and their gradient are owned here, the model only borrows
/// them on every pass.
pub struct Trainer<M, L, O, G> {
    model: M,
    loss_fn: L,
    optimizer: O,
    group: G,

    params: Vec<f32>,
    grad: Vec<f32>,
    sync: GradSync,

    loaders: Option<(DataLoader, DataLoader)>,
    mode: Mode,
    state: TrainerState,
    total_epochs: usize,
    step: usize,
}

impl<M, L, O, G> Trainer<M, L, O, G>
where
    M: Model,
    L: LossFn,
    O: Optimizer,
    G: ProcessGroup,
{
    /// Creates a new `Trainer`.
    ///
    /// The parameters of rank 0 are broadcast to every worker, so all the
    /// replicas start from the same point.
    ///
    /// # Arguments
    /// * `model` - The model to fit.
    /// * `loss_fn` - The objective.
    /// * `optimizer` - The update rule.
    /// * `group` - The process group this worker belongs to.
    /// * `params` - The initial parameters, `model.size()` of them.
    ///
    /// # Returns
    /// An error if the parameters don't fit the model or the broadcast fails.
    pub fn new(
        model: M,
        loss_fn: L,
        optimizer: O,
        mut group: G,
        mut params: Vec<f32>,
    ) -> Result<Self> {
        let size = model.size();
        if params.len() != size {
            return Err(MlErr::SizeMismatch {
                what: "initial parameters",
                got: params.len(),
                expected: size,
            });
        }

        if group.world().is_distributed() {
            group.broadcast(&mut params, 0)?;
            debug!(rank = group.world().rank(); "parameters broadcast from rank 0");
        }

        Ok(Self {
            model,
            loss_fn,
            optimizer,
            group,
            params,
            grad: vec![0.0; size],
            sync: GradSync::new(size),
            loaders: None,
            mode: Mode::Train,
            state: TrainerState::Idle,
            total_epochs: 0,
            step: 0,
        })
    }

    /// Sets the loaders the `train` loop draws its batches from.
    pub fn set_loaders(&mut self, train: DataLoader, val: DataLoader) {
        self.loaders = Some((train, val));
    }

    /// Takes one optimization step on `batch`.
    ///
    /// On a distributed world every worker must call this the same amount of
    /// times, an empty batch still takes part in the gradient synchronization.
    ///
    /// # Returns
    /// The batch loss, `None` if the batch was empty, or `MlErr::NonFiniteLoss`
    /// if the loss of any worker diverged.
    pub fn train_step(&mut self, batch: &Batch) -> Result<Option<f32>> {
        self.mode = Mode::Train;
        self.grad.fill(0.0);

        let loss = if batch.is_empty() {
            None
        } else {
            Some(self.local_gradient(batch)?)
        };

        let loss_sum = if self.group.world().is_distributed() {
            let global = self.sync.sync(
                &mut self.group,
                &mut self.grad,
                batch.len(),
                loss.unwrap_or_default(),
            )?;

            (global.samples > 0.0).then_some(global.loss_sum)
        } else {
            loss
        };

        let Some(loss_sum) = loss_sum else {
            self.step += 1;
            return Ok(None);
        };

        if !loss_sum.is_finite() {
            return Err(MlErr::NonFiniteLoss {
                epoch: self.total_epochs,
                batch: self.step,
            });
        }

        self.optimizer.update_params(&mut self.params, &self.grad);
        self.grad.fill(0.0);
        self.step += 1;
        Ok(loss)
    }

    /// Runs a tracked forward pass and backpropagates the loss of `batch`
    /// into `self.grad`.
    fn local_gradient(&mut self, batch: &Batch) -> Result<f32> {
        let (x, y) = batch.views()?;

        let y_pred = self.model.forward(&self.params, x, true)?;
        let loss = self.loss_fn.loss(y_pred.view(), y);
        let d = self.loss_fn.loss_prime(y_pred.view(), y);
        self.model.backward(&self.params, &mut self.grad, d.view())?;

        Ok(loss)
    }

    /// Evaluates the loss of `batch` without touching the parameters.
    ///
    /// # Returns
    /// The batch loss, `None` if the batch was empty.
    pub fn val_step(&mut self, batch: &Batch) -> Result<Option<f32>> {
        self.mode = Mode::Eval;

        if batch.is_empty() {
            return Ok(None);
        }

        let (x, y) = batch.views()?;
        let y_pred = self.model.forward(&self.params, x, false)?;
        Ok(Some(self.loss_fn.loss(y_pred.view(), y)))
    }

    /// Trains for `n_epochs` epochs, validating after each one.
    ///
    /// # Returns
    /// One report per epoch, or `MlErr::LoadersNotSet` if `set_loaders` was
    /// never called. A failed epoch leaves the trainer in the state it failed in.
    pub fn train(&mut self, n_epochs: usize) -> Result<Vec<EpochReport>> {
        let (mut train, mut val) = self.loaders.take().ok_or(MlErr::LoadersNotSet)?;

        let result: Result<Vec<_>> = (0..n_epochs)
            .map(|_| self.epoch(&mut train, &mut val))
            .collect();

        self.loaders = Some((train, val));
        if result.is_ok() {
            self.state = TrainerState::Done;
        }
        result
    }

    fn epoch(&mut self, train: &mut DataLoader, val: &mut DataLoader) -> Result<EpochReport> {
        let epoch = self.total_epochs;

        if self.group.world().is_distributed() {
            train.set_epoch(epoch as u64);
            val.set_epoch(epoch as u64);
        }

        self.state = TrainerState::Training { epoch };
        self.step = 0;
        let mut train_losses = Vec::with_capacity(train.len());
        for batch in train.batches() {
            train_losses.extend(self.train_step(&batch)?);
        }

        self.state = TrainerState::Validating { epoch };
        let mut val_losses = Vec::with_capacity(val.len());
        for batch in val.batches() {
            val_losses.extend(self.val_step(&batch)?);
        }

        self.total_epochs += 1;

        let report = EpochReport {
            epoch: self.total_epochs,
            train_loss: mean(&train_losses).unwrap_or_default(),
            val_loss: mean(&val_losses),
        };

        info!(rank = self.group.world().rank(); "{report}");
        Ok(report)
    }

    /// Predicts the target of every input in `xs`.
    ///
    /// Runs in evaluation mode and goes back to training mode afterwards.
    pub fn predict(&mut self, xs: &[f32]) -> Result<Vec<f32>> {
        self.mode = Mode::Eval;

        let result = self.forward_untracked(xs);

        self.mode = Mode::Train;
        result
    }

    fn forward_untracked(&mut self, xs: &[f32]) -> Result<Vec<f32>> {
        if xs.is_empty() {
            return Ok(Vec::new());
        }

        let x = ArrayView2::from_shape((xs.len(), 1), xs).map_err(|_| MlErr::SizeMismatch {
            what: "prediction inputs",
            got: xs.len(),
            expected: xs.len(),
        })?;

        let y = self.model.forward(&self.params, x, false)?;
        Ok(y.index_axis(Axis(1), 0).to_vec())
    }

    #[inline]
    pub fn params(&self) -> &[f32] {
        &self.params
    }

    /// Returns the named parameters of the model.
    pub fn state_dict(&self) -> Result<StateDict> {
        self.model.state_dict(&self.params)
    }

    #[inline]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    #[inline]
    pub fn state(&self) -> TrainerState {
        self.state
    }

    /// Returns the amount of epochs completed across every `train` call.
    #[inline]
    pub fn total_epochs(&self) -> usize {
        self.total_epochs
    }

    #[inline]
    pub fn world(&self) -> World {
        self.group.world()
    }

    /// Gives back the process group, so it can be torn down.
    pub fn into_group(self) -> G {
        self.group
    }
}

fn mean(values: &[f32]) -> Option<f32> {
    if values.is_empty() {
        return None;
    }

    Some(values.iter().sum::<f32>() / values.len() as f32)
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use comms::SoloGroup;

    use super::*;
    use crate::{
        arch::{Linear, loss::Mse},
        data::InMemoryDataset,
        optimization::GradientDescent,
    };

    type SoloTrainer = Trainer<Linear, Mse, GradientDescent, SoloGroup>;

    fn trainer(params: Vec<f32>) -> SoloTrainer {
        let optimizer = GradientDescent::new(0.1).unwrap();
        Trainer::new(Linear::new((1, 1)), Mse, optimizer, SoloGroup, params).unwrap()
    }

    fn line(n: usize) -> InMemoryDataset {
        let xs: Vec<f32> = (0..n).map(|i| i as f32 / n as f32).collect();
        let ys = xs.iter().map(|x| 1.0 + 2.0 * x).collect();
        InMemoryDataset::new(xs, ys).unwrap()
    }

    fn batch(xs: &[f32], ys: &[f32]) -> Batch {
        Batch {
            xs: xs.to_vec(),
            ys: ys.to_vec(),
        }
    }

    #[test]
    fn train_step_moves_against_the_gradient() {
        let mut t = trainer(vec![0.0, 0.0]);
        let loss = t.train_step(&batch(&[1.0], &[2.0])).unwrap();

        // y_pred = 0, d = 2 (0 - 2) = -4 => dw = -4, db = -4
        assert_eq!(loss, Some(4.0));
        assert_eq!(t.params(), &[0.4, 0.4]);
        assert_eq!(t.mode(), Mode::Train);
    }

    #[test]
    fn empty_batch_is_a_no_op() {
        let mut t = trainer(vec![0.3, -0.2]);
        assert_eq!(t.train_step(&Batch::default()).unwrap(), None);
        assert_eq!(t.params(), &[0.3, -0.2]);
    }

    #[test]
    fn val_step_is_idempotent_and_keeps_params() {
        let mut t = trainer(vec![0.5, 0.5]);
        let b = batch(&[0.0, 1.0], &[1.0, 3.0]);

        let first = t.val_step(&b).unwrap();
        let second = t.val_step(&b).unwrap();

        assert_eq!(first, second);
        assert_eq!(t.params(), &[0.5, 0.5]);
        assert_eq!(t.mode(), Mode::Eval);
    }

    #[test]
    fn non_finite_loss_aborts() {
        let mut t = trainer(vec![0.0, 0.0]);
        let err = t.train_step(&batch(&[1.0], &[f32::INFINITY])).unwrap_err();
        assert!(matches!(err, MlErr::NonFiniteLoss { epoch: 0, batch: 0 }));
    }

    #[test]
    fn train_needs_loaders() {
        let mut t = trainer(vec![0.0, 0.0]);
        assert!(matches!(t.train(1), Err(MlErr::LoadersNotSet)));
    }

    #[test]
    fn train_walks_the_state_machine_and_keeps_counting() {
        let bs = NonZeroUsize::new(4).unwrap();
        let mut t = trainer(vec![0.0, 0.0]);
        t.set_loaders(
            DataLoader::sequential(line(16), bs),
            DataLoader::sequential(line(4), bs),
        );
        assert_eq!(t.state(), TrainerState::Idle);

        let reports = t.train(3).unwrap();
        assert_eq!(reports.iter().map(|r| r.epoch).collect::<Vec<_>>(), [1, 2, 3]);
        assert!(reports.iter().all(|r| r.val_loss.is_some()));
        assert!(reports[2].train_loss < reports[0].train_loss);
        assert_eq!(t.state(), TrainerState::Done);

        let reports = t.train(2).unwrap();
        assert_eq!(reports[1].epoch, 5);
        assert_eq!(t.total_epochs(), 5);
    }

    #[test]
    fn failed_epoch_keeps_its_state() {
        let bs = NonZeroUsize::new(4).unwrap();
        let diverging = InMemoryDataset::new(vec![1.0, 2.0], vec![f32::INFINITY, 1.0]).unwrap();

        let mut t = trainer(vec![0.0, 0.0]);
        t.set_loaders(
            DataLoader::sequential(diverging, bs),
            DataLoader::sequential(line(4), bs),
        );

        let err = t.train(1).unwrap_err();
        assert!(matches!(err, MlErr::NonFiniteLoss { epoch: 0, batch: 0 }));
        assert_eq!(t.state(), TrainerState::Training { epoch: 0 });
        assert_eq!(t.total_epochs(), 0);
    }

    #[test]
    fn empty_validation_reports_no_loss() {
        let bs = NonZeroUsize::new(4).unwrap();
        let mut t = trainer(vec![0.0, 0.0]);
        t.set_loaders(
            DataLoader::sequential(line(8), bs),
            DataLoader::sequential(InMemoryDataset::default(), bs),
        );

        let reports = t.train(1).unwrap();
        assert_eq!(reports[0].val_loss, None);
    }

    #[test]
    fn predict_restores_train_mode() {
        let mut t = trainer(vec![2.0, 1.0]);
        let ys = t.predict(&[0.0, 1.0, 2.0]).unwrap();

        assert_eq!(ys, vec![1.0, 3.0, 5.0]);
        assert_eq!(t.mode(), Mode::Train);
        assert!(t.predict(&[]).unwrap().is_empty());
    }

    #[test]
    fn mismatched_params_are_rejected() {
        let optimizer = GradientDescent::new(0.1).unwrap();
        let t = Trainer::new(Linear::new((1, 1)), Mse, optimizer, SoloGroup, vec![0.0]);
        assert!(t.is_err());
    }
}
