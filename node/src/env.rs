use std::{env, num::NonZeroUsize};

use anyhow::{Context, bail};

const WORLD_SIZE: &str = "WORLD_SIZE";
const LOCAL_RANK: &str = "LOCAL_RANK";
const MASTER_ADDR: &str = "MASTER_ADDR";
const MASTER_PORT: &str = "MASTER_PORT";

const DEFAULT_MASTER_PORT: u16 = 29500;

/// The launch parameters a process finds in its environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchEnv {
    pub world_size: NonZeroUsize,
    pub local_rank: usize,
    /// `host:port` of rank 0, only for multi process runs.
    pub master: Option<String>,
}

impl LaunchEnv {
    /// Reads the launch parameters from the process environment.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Reads the launch parameters through `lookup`, absent variables fall
    /// back to a single process run.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let world_size = parse_or(&lookup, WORLD_SIZE, 1)?;
        let Some(world_size) = NonZeroUsize::new(world_size) else {
            bail!("{WORLD_SIZE} must be positive");
        };

        let local_rank = parse_or(&lookup, LOCAL_RANK, 0)?;
        if local_rank >= world_size.get() {
            bail!("{LOCAL_RANK} {local_rank} out of range for a world of {world_size}");
        }

        let master = match lookup(MASTER_ADDR) {
            Some(host) if !host.trim().is_empty() => {
                let port: u16 = parse_or(&lookup, MASTER_PORT, DEFAULT_MASTER_PORT)?;
                Some(format!("{}:{port}", host.trim()))
            }
            _ => None,
        };

        Ok(Self {
            world_size,
            local_rank,
            master,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid {key}: {raw:?}")),
        None => Ok(default),
    }
}
