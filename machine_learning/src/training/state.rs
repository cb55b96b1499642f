use std::fmt::{self, Display};

use serde::Serialize;

/// Whether the model is being fitted or only evaluated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mode {
    #[default]
    Train,
    Eval,
}

/// Where a `Trainer` is in its lifecycle.
///
/// `Idle -> (Training -> Validating)* -> Done`, a later `train` call starts
/// over from `Done` and keeps counting epochs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TrainerState {
    #[default]
    Idle,
    Training {
        epoch: usize,
    },
    Validating {
        epoch: usize,
    },
    Done,
}

/// The outcome of a single epoch on one worker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EpochReport {
    /// 1-based number of the epoch, counted across `train` calls.
    pub epoch: usize,
    /// Mean of the batch losses of the train phase.
    pub train_loss: f32,
    /// Mean of the batch losses of the validation phase, `None` when this
    /// worker had nothing to validate on.
    pub val_loss: Option<f32>,
}

impl Display for EpochReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03} train loss: {:.6}", self.epoch, self.train_loss)?;
        match self.val_loss {
            Some(val_loss) => write!(f, ", val loss: {val_loss:.6}"),
            None => write!(f, ", val loss: -"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_display() {
        let report = EpochReport {
            epoch: 1,
            train_loss: 0.5,
            val_loss: Some(0.25),
        };
        assert_eq!(report.to_string(), "001 train loss: 0.500000, val loss: 0.250000");

        let report = EpochReport {
            val_loss: None,
            ..report
        };
        assert_eq!(report.to_string(), "001 train loss: 0.500000, val loss: -");
    }
}
