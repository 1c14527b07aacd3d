//! Main PPO trainer.

use super::buffer::RolloutBuffer;
use super::config::TrainerConfig;
use super::optimizer::PolicyOptimizer;
use super::ppo::compute_gae;
use super::rollout::{collect_rollout, RewardTally};
use super::update::{optimize, UpdateMetrics};
use crate::checkpoint::{
    unix_timestamp, CheckpointConfig, CheckpointManager, CheckpointState, Checkpointable,
};
use crate::curriculum::Curriculum;
use crate::env::LeggedEnv;
use crate::log::{
    CompositeLogger, ConsoleLogger, JsonlLogger, MetricLogger, Metrics, TensorBoardLogger,
};
use crate::policy::Agent;
use crate::vector::ChunkedVecEnv;
use crate::Result;
use indicatif::{HumanCount, ProgressBar, ProgressStyle};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Progress counters carried across updates and checkpoints
#[derive(Clone, Debug, PartialEq)]
pub struct TrainingProgress {
    /// Environment steps across all instances
    pub global_step: u64,
    /// Completed rollout + optimization cycles
    pub update_step: u64,
    /// Current (KL-adapted) learning rate
    pub learning_rate: f64,
}

/// Run identity and output options
#[derive(Clone, Debug)]
pub struct RunOptions {
    /// Suffix of the run directory name
    pub name: Option<String>,
    /// Write the experiment-tracking stream
    pub track: bool,
    /// Root directory holding one directory per run
    pub log_dir: PathBuf,
    /// Draw a progress bar on stderr
    pub show_progress: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            name: None,
            track: false,
            log_dir: PathBuf::from("logs").join("rl"),
            show_progress: true,
        }
    }
}

impl RunOptions {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_log_dir(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.log_dir = log_dir.into();
        self
    }

    pub fn with_tracking(mut self, track: bool) -> Self {
        self.track = track;
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }
}

/// Main trainer for the PPO + curriculum loop
pub struct Trainer<A: Agent, E: LeggedEnv> {
    config: TrainerConfig,
    envs: ChunkedVecEnv<E>,
    agent: A,
    optimizer: PolicyOptimizer<A::Module, A::Backend>,
    curriculum: Curriculum,
    buffer: RolloutBuffer,
    progress: TrainingProgress,
    /// Minibatch shuffling
    shuffle_rng: ChaCha8Rng,
    tally: RewardTally,
    run_name: String,
    run_dir: PathBuf,
    tracking_id: Option<String>,
    checkpoints: CheckpointManager,
    logger: CompositeLogger,
    show_progress: bool,
}

impl<A: Agent, E: LeggedEnv> Trainer<A, E> {
    /// Create a new trainer, optionally resuming from `checkpoint`.
    ///
    /// Without a run name, a resumed run continues in the checkpoint's run
    /// directory and tracking stream; with one, a new run starts from the
    /// checkpointed state.
    pub fn new<F>(
        config: TrainerConfig,
        run: RunOptions,
        factory: F,
        agent: A,
        checkpoint: Option<CheckpointState>,
    ) -> Result<Self>
    where
        F: Fn() -> E + Send + Sync,
    {
        config.validate()?;

        let envs = ChunkedVecEnv::new(factory, config.vec_env_config())?;

        let continuing = run.name.is_none() && checkpoint.is_some();
        let run_name = match (&run.name, &checkpoint) {
            (None, Some(state)) => state.run_name.clone(),
            (Some(name), _) => format!("{}_{}", unix_timestamp(), name),
            (None, None) => unix_timestamp().to_string(),
        };
        let run_dir = run.log_dir.join(&run_name);
        fs::create_dir_all(&run_dir)?;
        serde_json::to_writer_pretty(File::create(run_dir.join("config.json"))?, &config)?;

        let mut logger = CompositeLogger::new(vec![Box::new(ConsoleLogger::new())]);
        let mut tracking_id = None;
        if run.track {
            let resume_id = checkpoint
                .as_ref()
                .filter(|_| continuing)
                .and_then(|state| state.tracking_id.clone());
            let jsonl = JsonlLogger::open(&run_dir, resume_id)?;
            tracking_id = Some(jsonl.tracking_id().to_string());
            logger.add(Box::new(TensorBoardLogger::new(&run_dir)));
            logger.add(Box::new(jsonl));
        }

        let checkpoints = CheckpointManager::new(
            CheckpointConfig::new(&run_dir).save_every(config.keypoint_frequency),
        )?;

        let curriculum = match &checkpoint {
            Some(state) => curriculum_from_checkpoint(state, &config, envs.probe())?,
            None => {
                let probe = envs.probe();
                let (low, high) = probe.leg_param_bounds();
                Curriculum::initialize(
                    probe.leg_params().view(),
                    low.view(),
                    high.view(),
                    probe.curriculum_score_th(),
                    &config.curriculum_config(),
                )?
            }
        };

        let buffer = RolloutBuffer::new(
            config.horizon,
            envs.num_envs(),
            envs.observation_size(),
            envs.action_size(),
        );

        let mut trainer = Self {
            optimizer: PolicyOptimizer::new(config.learning_rate, config.max_grad_norm),
            progress: TrainingProgress {
                global_step: 0,
                update_step: 0,
                learning_rate: config.learning_rate,
            },
            shuffle_rng: ChaCha8Rng::seed_from_u64(config.seed),
            tally: RewardTally::default(),
            show_progress: run.show_progress,
            config,
            envs,
            agent,
            curriculum,
            buffer,
            run_name,
            run_dir,
            tracking_id,
            checkpoints,
            logger,
        };

        match checkpoint {
            Some(state) => {
                tracing::info!(
                    run = %state.run_name,
                    update_step = state.update_step,
                    global_step = state.global_step,
                    "Resuming from checkpoint"
                );
                trainer.restore(state)?;
            }
            None => {
                let designs = trainer.curriculum.designs();
                trainer.envs.restore_workers(designs, None)?;
            }
        }

        tracing::info!(
            run = %trainer.run_name,
            dir = %trainer.run_dir.display(),
            envs = trainer.envs.num_envs(),
            batch_size = trainer.config.batch_size(),
            "Trainer ready"
        );
        Ok(trainer)
    }

    /// Add a metric backend next to the console (and tracking) loggers
    pub fn add_logger(&mut self, logger: Box<dyn MetricLogger>) {
        self.logger.add(logger);
    }

    /// Run the remaining `num_updates - update_step` updates
    pub fn train(&mut self) -> Result<TrainingProgress> {
        let remaining = self.config.num_updates.saturating_sub(self.progress.update_step);
        if remaining == 0 {
            tracing::info!(update_step = self.progress.update_step, "Nothing left to train");
            return Ok(self.progress.clone());
        }

        let bar = self.progress_bar(remaining);
        let start_time = Instant::now();
        let global_step_init = self.progress.global_step;

        self.envs.sync_curriculum(&self.curriculum.cells());
        let mut next_obs = self.envs.reset(Some(self.config.seed))?;

        for _ in 0..remaining {
            let next_value = collect_rollout(
                &mut self.agent,
                &mut self.envs,
                &mut self.buffer,
                &mut next_obs,
                &mut self.curriculum,
                &mut self.tally,
                &mut self.progress,
                self.config.gamma,
            )?;

            let (advantages, returns) = compute_gae(
                self.buffer.rewards.view(),
                self.buffer.values.view(),
                self.buffer.dones.view(),
                next_value.view(),
                self.config.gamma,
                self.config.gae_lambda,
            );
            let batch = self.buffer.flatten(&advantages, &returns)?;

            let metrics = optimize(
                &mut self.agent,
                &mut self.optimizer,
                &batch,
                &self.config,
                &mut self.shuffle_rng,
                self.progress.update_step,
            )?;
            self.progress.learning_rate = metrics.learning_rate;

            self.envs.sync_curriculum(&self.curriculum.cells());
            self.progress.update_step += 1;

            if self.checkpoints.is_due(self.progress.update_step) {
                self.save_checkpoint()?;
            }

            let elapsed = start_time.elapsed().as_secs_f64();
            let sps = (self.progress.global_step - global_step_init) as f64 / elapsed.max(1e-9);
            if self.progress.update_step % self.config.log_frequency == 0 {
                self.log_update(&metrics, sps);
            }

            if let Some(bar) = &bar {
                bar.inc(1);
                bar.set_message(format!(
                    "SPS: {} LR: {:.5} Steps: {}",
                    HumanCount(sps as u64),
                    self.progress.learning_rate,
                    HumanCount(self.progress.global_step)
                ));
            }
        }

        if let Some(bar) = bar {
            bar.finish_with_message("Training complete");
        }
        self.logger.close();
        Ok(self.progress.clone())
    }

    /// Write `checkpoint_<update_step>.bin` and the curriculum heat-map
    pub fn save_checkpoint(&self) -> Result<PathBuf> {
        let step = self.progress.update_step;
        let path = self.checkpoints.save(self, step)?;
        self.checkpoints.save_heatmap(&self.curriculum, step)?;
        Ok(path)
    }

    /// Everything needed to resume the run
    pub fn snapshot(&self) -> Result<CheckpointState> {
        let designs = self.curriculum.designs();
        Ok(CheckpointState {
            run_name: self.run_name.clone(),
            tracking_id: self.tracking_id.clone(),
            global_step: self.progress.global_step,
            update_step: self.progress.update_step,
            learning_rate: self.optimizer.learning_rate(),
            optimizer_state: self.optimizer.save_state()?,
            network_state: self.agent.save_state()?,
            curriculum_designs: designs.centroids.clone(),
            curriculum_design_labels: designs.labels.clone(),
            curriculum_cells: self.curriculum.cells(),
            curriculum_scores: self.curriculum.scores(),
            curriculum_counts: self.curriculum.counts(),
            reward_normalizer_stats: self.envs.gather_reward_stats(),
            shuffle_rng: self.shuffle_rng.clone(),
            timestamp: unix_timestamp().to_string(),
            version: crate::VERSION.to_string(),
        })
    }

    /// Restore network, optimizer, curriculum, counters and worker state
    pub fn restore(&mut self, state: CheckpointState) -> Result<()> {
        self.agent.load_state(&state.network_state)?;
        self.optimizer.load_state(&state.optimizer_state)?;
        self.optimizer.set_learning_rate(state.learning_rate);

        self.curriculum = curriculum_from_checkpoint(&state, &self.config, self.envs.probe())?;
        self.envs
            .restore_workers(self.curriculum.designs(), Some(state.reward_normalizer_stats))?;

        self.progress = TrainingProgress {
            global_step: state.global_step,
            update_step: state.update_step,
            learning_rate: state.learning_rate,
        };
        self.shuffle_rng = state.shuffle_rng;
        Ok(())
    }

    fn log_update(&mut self, metrics: &UpdateMetrics, sps: f64) {
        let step = self.progress.update_step;
        tracing::info!(
            global_step = self.progress.global_step,
            update_step = step,
            learning_rate = %format!("{:.5}", self.progress.learning_rate),
            sps = sps as u64,
            "Training progress"
        );

        let mut scalars = Metrics::new();
        scalars.insert("update/step".into(), step as f64);
        scalars.insert("update/global_step".into(), self.progress.global_step as f64);
        scalars.insert("update/SPS".into(), sps.floor());

        for (name, mean) in self.tally.drain_means() {
            scalars.insert(format!("episode/reward_{}", name), mean);
        }

        let stats = self.curriculum.stats();
        scalars.insert("episode/curriculum_area".into(), stats.area as f64);
        scalars.insert("episode/curriculum_count_per_cell".into(), stats.count_per_cell);
        scalars.insert("episode/curriculum_count_max".into(), stats.count_max as f64);
        scalars.insert("episode/curriculum_count_min".into(), stats.count_min as f64);

        scalars.extend(metrics.to_metrics());
        self.logger.log_metrics(&scalars, step);
    }

    fn progress_bar(&self, remaining: u64) -> Option<ProgressBar> {
        if !self.show_progress {
            return None;
        }
        let pb = ProgressBar::new(remaining);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
            .map(|style| style.progress_chars("#>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        pb.set_style(style);
        Some(pb)
    }

    /// Close every environment instance
    pub fn close(mut self) {
        self.logger.close();
        self.envs.close();
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    pub fn progress(&self) -> &TrainingProgress {
        &self.progress
    }

    pub fn curriculum(&self) -> &Curriculum {
        &self.curriculum
    }

    pub fn agent(&self) -> &A {
        &self.agent
    }

    pub fn envs(&self) -> &ChunkedVecEnv<E> {
        &self.envs
    }

    pub fn run_name(&self) -> &str {
        &self.run_name
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn tracking_id(&self) -> Option<&str> {
        self.tracking_id.as_deref()
    }
}

impl<A: Agent, E: LeggedEnv> Checkpointable for Trainer<A, E> {
    fn save_state(&self) -> Result<Vec<u8>> {
        self.snapshot()?.to_bytes()
    }

    fn load_state(&mut self, data: &[u8]) -> Result<()> {
        self.restore(CheckpointState::from_bytes(data)?)
    }
}

fn curriculum_from_checkpoint<E: LeggedEnv>(
    state: &CheckpointState,
    config: &TrainerConfig,
    probe: &E,
) -> Result<Curriculum> {
    Curriculum::from_parts(
        state.design_set(),
        state.curriculum_cells.clone(),
        state.curriculum_scores.clone(),
        state.curriculum_counts.clone(),
        config.curriculum_alpha,
        probe.curriculum_score_th(),
    )
}
