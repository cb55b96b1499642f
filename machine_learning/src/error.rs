use std::{
    error::Error,
    fmt::{self, Display},
};

use comms::CommErr;

/// The result type used in the entire machine learning module.
pub type Result<T> = std::result::Result<T, MlErr>;

/// The machine learning module's error type.
#[derive(Debug)]
pub enum MlErr {
    InvalidConfig {
        field: &'static str,
        reason: String,
    },
    SizeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    GradientNotTracked,
    LoadersNotSet,
    NonFiniteLoss {
        epoch: usize,
        batch: usize,
    },
    Comm(CommErr),
}

impl MlErr {
    pub(crate) fn invalid_config(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }
}

impl Display for MlErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MlErr::InvalidConfig { field, reason } => {
                write!(f, "invalid configuration for `{field}`: {reason}")
            }
            MlErr::SizeMismatch {
                what,
                got,
                expected,
            } => write!(
                f,
                "There's a size mismatch in {what}, got {got} and expected {expected}"
            ),
            MlErr::GradientNotTracked => write!(
                f,
                "backward called without a forward pass that tracked gradients"
            ),
            MlErr::LoadersNotSet => write!(f, "the trainer has no data loaders set"),
            MlErr::NonFiniteLoss { epoch, batch } => {
                write!(f, "the loss diverged at epoch {epoch}, batch {batch}")
            }
            MlErr::Comm(e) => write!(f, "collective communication failed: {e}"),
        }
    }
}

impl Error for MlErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MlErr::Comm(e) => Some(e),
            _ => None,
        }
    }
}

impl From<CommErr> for MlErr {
    fn from(value: CommErr) -> Self {
        Self::Comm(value)
    }
}
