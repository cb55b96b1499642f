use std::num::NonZeroUsize;

use anyhow::Context;
use comms::{ConnectPolicy, LocalGroup, ProcessGroup, SoloGroup, TcpGroup, World};
use log::{info, warn};
use machine_learning::{
    arch::StateDict,
    config::TrainConfig,
    training::{EpochReport, TrainerBuilder},
};
use serde::Serialize;
use tokio::task::{self, JoinSet};

use crate::env::LaunchEnv;

/// How the workers of a run are laid out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Launch {
    /// A single worker, no collectives.
    Single,
    /// This process is one worker of a group spread over many processes.
    Tcp { world: World, master: String },
    /// Every worker of the group runs as a thread of this process.
    Simulated { size: NonZeroUsize },
}

/// The final state of a single worker.
#[derive(Debug, Serialize)]
pub struct Replica {
    pub rank: usize,
    pub epochs: usize,
    pub last: Option<EpochReport>,
    pub state_dict: StateDict,
}

impl Launch {
    /// Decides the layout of the run out of the launch environment.
    pub fn resolve(env: &LaunchEnv) -> anyhow::Result<Self> {
        if env.world_size.get() == 1 {
            return Ok(Self::Single);
        }

        let Some(master) = env.master.clone() else {
            if env.local_rank != 0 {
                warn!("LOCAL_RANK ignored, simulating every worker in this process");
            }
            return Ok(Self::Simulated {
                size: env.world_size,
            });
        };

        let world = World::new(env.local_rank, env.world_size)?;
        Ok(Self::Tcp { world, master })
    }

    /// Trains every worker this process is responsible for.
    ///
    /// # Returns
    /// The final replicas, ordered by rank.
    pub async fn run(self, config: TrainConfig) -> anyhow::Result<Vec<Replica>> {
        match self {
            Self::Single => {
                let replica = task::spawn_blocking(move || train_replica(config, SoloGroup))
                    .await
                    .context("single worker panicked")??;
                Ok(vec![replica])
            }
            Self::Tcp { world, master } => {
                let replica = task::spawn_blocking(move || {
                    info!(rank = world.rank(); "joining the group at {master}");
                    let group = TcpGroup::init(world, master.as_str(), ConnectPolicy::default())
                        .context("rendezvous failed")?;
                    train_replica(config, group)
                })
                .await
                .context("tcp worker panicked")??;
                Ok(vec![replica])
            }
            Self::Simulated { size } => {
                info!(world_size = size.get(); "simulating every worker in process");

                let mut workers = JoinSet::new();
                for group in LocalGroup::new(size) {
                    workers.spawn_blocking(move || train_replica(config, group));
                }

                let mut replicas = Vec::with_capacity(size.get());
                while let Some(joined) = workers.join_next().await {
                    replicas.push(joined.context("simulated worker panicked")??);
                }

                replicas.sort_by_key(|r| r.rank);
                Ok(replicas)
            }
        }
    }
}

/// Builds, trains and tears down a single worker.
fn train_replica<G: ProcessGroup>(config: TrainConfig, group: G) -> anyhow::Result<Replica> {
    let rank = group.world().rank();

    let mut trainer = TrainerBuilder::new(config)
        .build(group)
        .with_context(|| format!("building the trainer of rank {rank}"))?;

    let reports = trainer
        .train(config.epochs)
        .with_context(|| format!("training rank {rank}"))?;

    let replica = Replica {
        rank,
        epochs: trainer.total_epochs(),
        last: reports.last().copied(),
        state_dict: trainer.state_dict()?,
    };

    trainer.into_group().destroy()?;
    info!(rank = rank; "worker done");

    Ok(replica)
}
