use std::num::NonZeroUsize;

use comms::World;
use serde::{Deserialize, Serialize};

use crate::{
    MlErr, Result,
    data::{SplitPolicy, train_count},
};

/// How the synthetic dataset is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub n_samples: usize,
    pub true_bias: f32,
    pub true_slope: f32,
    pub noise_scale: f32,
    pub seed: u64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            n_samples: 100,
            true_bias: 1.0,
            true_slope: 2.0,
            noise_scale: 0.1,
            seed: 42,
        }
    }
}

/// How the dataset is split into train and validation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    pub train_fraction: f64,
    pub policy: SplitPolicy,
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            train_fraction: 0.8,
            policy: SplitPolicy::default(),
            seed: 42,
        }
    }
}

/// How both splits are batched.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    pub batch_size: usize,
    pub shuffle: bool,
    pub seed: u64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: 16,
            shuffle: true,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub learning_rate: f32,
    /// Multiplies the learning rate by the world size.
    pub scale_by_world: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            scale_by_world: true,
        }
    }
}

/// Every knob of a training run.
///
/// `Default` reproduces the reference run: 100 samples of `y = 1 + 2x` with a
/// 0.1 noise scale, an 80/20 split, batches of 16 and 50 epochs of gradient
/// descent at 0.1 times the world size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub data: DataConfig,
    pub split: SplitConfig,
    pub loader: LoaderConfig,
    pub optimizer: OptimizerConfig,
    pub epochs: usize,
    pub init_seed: u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            data: DataConfig::default(),
            split: SplitConfig::default(),
            loader: LoaderConfig::default(),
            optimizer: OptimizerConfig::default(),
            epochs: 50,
            init_seed: 13,
        }
    }
}

impl TrainConfig {
    /// Checks every invariant of the configuration for a run over `world`.
    ///
    /// # Returns
    /// The first violation found, as `MlErr::InvalidConfig`.
    pub fn validate(&self, world: World) -> Result<()> {
        if self.data.n_samples == 0 {
            return Err(MlErr::invalid_config("n_samples", "must be positive"));
        }

        if self.epochs == 0 {
            return Err(MlErr::invalid_config("epochs", "must be positive"));
        }

        self.batch_size()?;
        self.learning_rate(world)?;

        let n_train = self.train_count()?;
        if n_train < world.size() {
            return Err(MlErr::invalid_config(
                "train_fraction",
                format!(
                    "{n_train} training samples can't feed {} workers",
                    world.size()
                ),
            ));
        }

        Ok(())
    }

    /// Returns the amount of training samples of the split.
    pub fn train_count(&self) -> Result<usize> {
        train_count(self.data.n_samples, self.split.train_fraction)
    }

    pub fn batch_size(&self) -> Result<NonZeroUsize> {
        NonZeroUsize::new(self.loader.batch_size)
            .ok_or_else(|| MlErr::invalid_config("batch_size", "must be positive"))
    }

    /// Returns the learning rate the optimizer of a worker in `world` uses.
    pub fn learning_rate(&self, world: World) -> Result<f32> {
        let base = self.optimizer.learning_rate;
        if !base.is_finite() || base <= 0.0 {
            return Err(MlErr::invalid_config(
                "learning_rate",
                format!("must be positive and finite, got {base}"),
            ));
        }

        Ok(match self.optimizer.scale_by_world {
            true => base * world.size() as f32,
            false => base,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world(size: usize) -> World {
        World::new(0, NonZeroUsize::new(size).unwrap()).unwrap()
    }

    #[test]
    fn default_is_valid() {
        let config = TrainConfig::default();
        config.validate(world(1)).unwrap();
        config.validate(world(4)).unwrap();
        assert_eq!(config.train_count().unwrap(), 80);
    }

    #[test]
    fn learning_rate_scales_with_the_world() {
        let mut config = TrainConfig::default();
        assert_eq!(config.learning_rate(world(4)).unwrap(), 0.4);

        config.optimizer.scale_by_world = false;
        assert_eq!(config.learning_rate(world(4)).unwrap(), 0.1);
    }

    #[test]
    fn invalid_values_fail_fast() {
        let tweaks: [fn(&mut TrainConfig); 6] = [
            |c| c.data.n_samples = 0,
            |c| c.split.train_fraction = 1.2,
            |c| c.loader.batch_size = 0,
            |c| c.optimizer.learning_rate = 0.0,
            |c| c.epochs = 0,
            |c| c.data.n_samples = 2,
        ];

        for tweak in tweaks {
            let mut config = TrainConfig::default();
            tweak(&mut config);
            assert!(matches!(
                config.validate(world(4)),
                Err(MlErr::InvalidConfig { .. })
            ));
        }
    }

    #[test]
    fn missing_fields_take_defaults() {
        let config: TrainConfig = serde_json::from_str(r#"{"epochs": 3}"#).unwrap();
        assert_eq!(config.epochs, 3);
        assert_eq!(config.data, DataConfig::default());
    }
}
