mod builder;
mod state;
mod sync;
mod trainer;

pub use builder::{LinearTrainer, TrainerBuilder};
pub use state::{EpochReport, Mode, TrainerState};
pub use sync::{GlobalBatch, GradSync};
pub use trainer::Trainer;
