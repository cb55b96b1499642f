mod dataloader;
mod dataset;
mod shard;
mod split;
mod synthetic;

pub use dataloader::{Batches, DataLoader};
pub use dataset::{Batch, InMemoryDataset, Sample};
pub use shard::{DistributedSampler, shard_range};
pub use split::{Split, SplitPolicy, split_indices, train_count, train_val_split};
pub use synthetic::LinearSynth;
