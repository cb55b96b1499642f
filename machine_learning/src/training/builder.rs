use comms::{ProcessGroup, World};
use log::info;
use rand::{SeedableRng, rngs::StdRng};

use super::Trainer;
use crate::{
    Result,
    arch::{Linear, Model, loss::Mse},
    config::TrainConfig,
    data::{DataLoader, DistributedSampler, InMemoryDataset, LinearSynth, train_val_split},
    optimization::GradientDescent,
};

/// The trainer of a single feature linear regression.
pub type LinearTrainer<G> = Trainer<Linear, Mse, GradientDescent, G>;

/// Builds ready to train `Trainer`s out of a `TrainConfig`.
#[derive(Debug, Clone, Default)]
pub struct TrainerBuilder {
    config: TrainConfig,
}

impl TrainerBuilder {
    /// Creates a new `TrainerBuilder`.
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    #[inline]
    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    /// Builds the trainer of the worker that owns `group`.
    ///
    /// Every worker draws the same dataset and split from the configured
    /// seeds, then keeps only its shard of each side.
    ///
    /// # Arguments
    /// * `group` - The process group of this worker.
    ///
    /// # Returns
    /// A trainer with its loaders set, or an error if the configuration is
    /// invalid for the group's world or the initial broadcast fails.
    pub fn build<G: ProcessGroup>(&self, group: G) -> Result<LinearTrainer<G>> {
        let world = group.world();
        self.config.validate(world)?;

        let dataset = self.generate()?;
        let (train, val) = self.split(&dataset)?;
        let (train, val) = self.loaders(world, train, val)?;

        let model = Linear::new((1, 1));
        let mut rng = StdRng::seed_from_u64(self.config.init_seed);
        let params = model.init_params(&mut rng)?;

        let lr = self.config.learning_rate(world)?;
        let optimizer = GradientDescent::new(lr)?;

        info!(
            rank = world.rank(), world_size = world.size(), learning_rate = lr;
            "trainer built"
        );

        let mut trainer = Trainer::new(model, Mse::new(), optimizer, group, params)?;
        trainer.set_loaders(train, val);
        Ok(trainer)
    }

    fn generate(&self) -> Result<InMemoryDataset> {
        let data = &self.config.data;
        let synth = LinearSynth::new(
            data.n_samples,
            data.true_bias,
            data.true_slope,
            data.noise_scale,
        )?;

        synth.generate(&mut StdRng::seed_from_u64(data.seed))
    }

    fn split(&self, dataset: &InMemoryDataset) -> Result<(InMemoryDataset, InMemoryDataset)> {
        let split = &self.config.split;
        let mut rng = StdRng::seed_from_u64(split.seed);
        train_val_split(dataset, split.train_fraction, split.policy, &mut rng)
    }

    fn loaders(
        &self,
        world: World,
        train: InMemoryDataset,
        val: InMemoryDataset,
    ) -> Result<(DataLoader, DataLoader)> {
        let loader = &self.config.loader;
        let batch_size = self.config.batch_size()?;

        if world.is_distributed() {
            let sampler = DistributedSampler::new(world, loader.shuffle, loader.seed);
            return Ok((
                DataLoader::sharded(train, batch_size, sampler),
                DataLoader::sharded(val, batch_size, sampler),
            ));
        }

        let train = match loader.shuffle {
            true => DataLoader::shuffled(train, batch_size, StdRng::seed_from_u64(loader.seed)),
            false => DataLoader::sequential(train, batch_size),
        };

        Ok((train, DataLoader::sequential(val, batch_size)))
    }
}
