use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;
use cleanup_engine::ExecutionMode;

#[derive(Parser, Debug)]
#[command(
    about = "Headless host that runs Interactive Cleanup trials from a scene and a script",
    version
)]
pub struct Args {
    /// Session config JSON (defaults apply when omitted)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Scene description JSON with the environments, objects and robot
    #[arg(long)]
    pub scene: PathBuf,

    /// Trial script JSON with the avatar, robot and physics inputs per frame
    #[arg(long)]
    pub script: Option<PathBuf>,

    /// Number of trials to run (overrides maxNumberOfTrials)
    #[arg(long)]
    pub trials: Option<u32>,

    /// Override the execution mode from the config file
    #[arg(long, value_enum)]
    pub execution_mode: Option<ExecutionMode>,

    /// Directory that holds the EnvironmentInfoNN.json snapshots
    #[arg(long)]
    pub snapshot_dir: Option<PathBuf>,

    /// Path to write the run report as JSON
    #[arg(long)]
    pub report_json: Option<PathBuf>,

    /// Simulated seconds per frame
    #[arg(long, default_value_t = 1.0 / 30.0)]
    pub frame_dt: f32,

    /// Stop after this many frames even if trials remain
    #[arg(long, default_value_t = 100_000)]
    pub max_frames: u64,
}

pub fn parse() -> Result<Args> {
    let args = Args::parse();
    args.validate()?;
    Ok(args)
}

impl Args {
    fn validate(&self) -> Result<()> {
        if !(self.frame_dt > 0.0) {
            bail!("--frame-dt must be positive");
        }
        if self.trials == Some(0) {
            bail!("--trials must be at least 1");
        }
        Ok(())
    }
}
