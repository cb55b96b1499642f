mod env;
mod launch;

use std::process;

use log::{info, warn};
use machine_learning::config::TrainConfig;
use tokio::signal;

use crate::{env::LaunchEnv, launch::Launch};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let env = LaunchEnv::from_env()?;
    let launch = Launch::resolve(&env)?;
    let config = TrainConfig::default();
    info!("launching {launch:?}");

    tokio::select! {
        ret = launch.run(config) => {
            for replica in ret? {
                println!("{}", serde_json::to_string(&replica)?);
            }
            info!("training finished");
        }
        _ = signal::ctrl_c() => {
            // Blocking workers can't be cancelled, leave without waiting on them.
            warn!("interrupted, exiting");
            process::exit(130);
        }
    }

    Ok(())
}
