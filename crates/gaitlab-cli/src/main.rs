//! gaitlab CLI
//!
//! Command-line interface for training the legged-reach policy and
//! inspecting checkpoints.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use gaitlab::checkpoint::{resolve_checkpoint, CheckpointState};
use gaitlab::env::LeggedEnv;
use gaitlab::policy::{GaussianMlp, MlpConfig};
use gaitlab::training::{RunOptions, Trainer, TrainerConfig};
use gaitlab_envs::LeggedReach;

#[derive(Parser)]
#[command(name = "gaitlab")]
#[command(version, about = "gaitlab - PPO with a design/difficulty curriculum for legged robots", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a policy, optionally resuming from a checkpoint
    Train {
        /// Run name, appended to the run directory's timestamp
        #[arg(long)]
        name: Option<String>,

        /// Write the experiment-tracking stream
        #[arg(long)]
        track: bool,

        /// Checkpoint file, or run directory whose latest checkpoint to resume from
        #[arg(long)]
        checkpoint: Option<PathBuf>,

        /// JSON file overriding trainer defaults
        #[arg(long)]
        config: Option<PathBuf>,

        /// Root directory for run directories
        #[arg(long, default_value = "logs/rl")]
        log_dir: PathBuf,
    },

    /// Summarize a checkpoint file
    Inspect {
        /// Checkpoint file, or run directory (its latest checkpoint)
        checkpoint: PathBuf,
    },
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Train {
            name,
            track,
            checkpoint,
            config,
            log_dir,
        } => {
            let run = RunOptions {
                name,
                track,
                log_dir,
                show_progress: true,
            };
            train(run, checkpoint, config)?;
        }
        Commands::Inspect { checkpoint } => {
            inspect(&checkpoint)?;
        }
    }

    Ok(())
}

fn train(run: RunOptions, checkpoint: Option<PathBuf>, config: Option<PathBuf>) -> Result<()> {
    let config = match config {
        Some(path) => TrainerConfig::from_json_file(&path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => TrainerConfig::default(),
    };
    let checkpoint = checkpoint.map(|path| load_checkpoint(&path)).transpose()?;

    let probe = LeggedReach::new();
    let agent = GaussianMlp::new(
        probe.observation_size(),
        probe.action_size(),
        MlpConfig {
            seed: config.seed,
            ..Default::default()
        },
    );

    tracing::info!(
        updates = config.num_updates,
        envs = config.num_envs(),
        horizon = config.horizon,
        resume = checkpoint.is_some(),
        "Starting training"
    );

    let mut trainer = Trainer::new(config, run, LeggedReach::new, agent, checkpoint)?;
    let progress = trainer.train()?;
    tracing::info!(
        update_step = progress.update_step,
        global_step = progress.global_step,
        run_dir = %trainer.run_dir().display(),
        "Training finished"
    );
    trainer.close();
    Ok(())
}

fn load_checkpoint(path: &Path) -> Result<CheckpointState> {
    let file = resolve_checkpoint(path)
        .with_context(|| format!("Failed to load checkpoint {}", path.display()))?;
    tracing::info!(path = %file.display(), "Loading checkpoint");
    CheckpointState::read(&file)
        .with_context(|| format!("Failed to load checkpoint {}", file.display()))
}

fn inspect(path: &Path) -> Result<()> {
    let state = load_checkpoint(path)?;

    let area: usize = state.curriculum_cells.iter().map(Vec::len).sum();
    let workers: usize = state.reward_normalizer_stats.iter().map(Vec::len).sum();

    println!("run:            {}", state.run_name);
    println!("tracking id:    {}", state.tracking_id.as_deref().unwrap_or("-"));
    println!("written by:     gaitlab {} at {}", state.version, state.timestamp);
    println!("update step:    {}", state.update_step);
    println!("global step:    {}", state.global_step);
    println!("learning rate:  {:.6}", state.learning_rate);
    println!("designs:        {}", state.curriculum_cells.len());
    println!("curriculum area: {}", area);
    println!("workers:        {}", workers);
    Ok(())
}
