//! End-to-end training, checkpointing and resume.

use gaitlab::checkpoint::CheckpointState;
use gaitlab::curriculum::{Cell, DesignSet};
use gaitlab::env::{CurriculumOutcome, EnvInfo, EpisodeSummary, LeggedEnv, StepResult};
use gaitlab::checkpoint::Checkpointable;
use gaitlab::policy::{ActorCritic, GaussianMlp, MlpConfig, TrainBackend};
use gaitlab::training::{PolicyOptimizer, RunOptions, Trainer, TrainerConfig};
use gaitlab::Result;
use ndarray::{array, Array1, Array2, ArrayView1};
use rand::seq::SliceRandom;
use std::path::Path;

/// Walk toward +x; episodes end after three steps, scored by distance covered.
struct Walker {
    x: f32,
    steps: usize,
    cell: Cell,
    cells: Vec<Vec<Cell>>,
    episodes: u64,
}

impl Walker {
    fn new() -> Self {
        Self {
            x: 0.0,
            steps: 0,
            cell: Cell::ORIGIN,
            cells: Vec::new(),
            episodes: 0,
        }
    }
}

impl LeggedEnv for Walker {
    fn observation_size(&self) -> usize {
        3
    }

    fn action_size(&self) -> usize {
        1
    }

    fn reset(&mut self, _seed: Option<u64>) -> Result<(Array1<f32>, EnvInfo)> {
        self.x = 0.0;
        self.steps = 0;
        // Cycle through the known cells of design 0
        self.cell = match self.cells.first() {
            Some(cells) if !cells.is_empty() => cells[(self.episodes as usize) % cells.len()],
            _ => Cell::ORIGIN,
        };
        self.episodes += 1;
        Ok((array![0.0, self.cell.x as f32, self.cell.y as f32], EnvInfo::new()))
    }

    fn step(&mut self, action: ArrayView1<f32>) -> Result<StepResult> {
        let dx = action[0].clamp(-1.0, 1.0) * 0.1;
        self.x += dx;
        self.steps += 1;
        let truncated = self.steps >= 3;

        let info = if truncated {
            EnvInfo::new().with_episode(
                EpisodeSummary::new(CurriculumOutcome {
                    design: 0,
                    cell: self.cell,
                    score: (self.x / 0.3).clamp(0.0, 1.0),
                })
                .with_reward("distance", self.x),
            )
        } else {
            EnvInfo::new()
        };

        Ok(StepResult {
            observation: array![self.x, self.cell.x as f32, self.cell.y as f32],
            reward: dx,
            terminated: false,
            truncated,
            info,
        })
    }

    fn set_curriculum_designs(&mut self, _designs: &DesignSet) {}

    fn set_curriculum_cells(&mut self, cells: &[Vec<Cell>]) {
        self.cells = cells.to_vec();
    }

    fn curriculum_score_th(&self) -> f64 {
        0.1
    }

    fn leg_params(&self) -> Array2<f32> {
        array![[0.2, 0.4], [0.8, 0.6], [0.5, 0.5], [0.9, 0.1]]
    }

    fn leg_param_bounds(&self) -> (Array1<f32>, Array1<f32>) {
        (array![0.0, 0.0], array![1.0, 1.0])
    }
}

const ENVS: u64 = 2 * 3;
const HORIZON: u64 = 6;

fn config(num_updates: u64) -> TrainerConfig {
    TrainerConfig::default()
        .with_updates(num_updates)
        .with_envs(2, 3)
        .with_horizon(HORIZON as usize)
        .with_minibatches(3, 2)
        .with_num_designs(2)
        .with_keypoint_frequency(2)
        .with_log_frequency(1)
}

fn new_trainer(
    dir: &Path,
    num_updates: u64,
    name: Option<&str>,
    checkpoint: Option<CheckpointState>,
) -> Trainer<GaussianMlp, Walker> {
    let mut run = RunOptions::default()
        .with_log_dir(dir)
        .with_tracking(true)
        .with_progress(false);
    if let Some(name) = name {
        run = run.with_name(name);
    }
    let agent = GaussianMlp::new(3, 1, MlpConfig::default());
    Trainer::new(config(num_updates), run, Walker::new, agent, checkpoint).unwrap()
}

#[test]
fn test_checkpoint_files_follow_keypoint_frequency() {
    let dir = tempfile::tempdir().unwrap();
    let mut trainer = new_trainer(dir.path(), 5, Some("cadence"), None);
    let progress = trainer.train().unwrap();

    assert_eq!(progress.update_step, 5);
    assert_eq!(progress.global_step, 5 * ENVS * HORIZON);

    let run_dir = trainer.run_dir();
    assert!(run_dir.ends_with(trainer.run_name()));
    assert!(trainer.run_name().ends_with("_cadence"));
    for step in [2, 4] {
        assert!(run_dir.join(format!("checkpoint_{}.bin", step)).exists());
        assert!(run_dir.join(format!("curriculum_{}.png", step)).exists());
    }
    for step in [1, 3, 5] {
        assert!(!run_dir.join(format!("checkpoint_{}.bin", step)).exists());
    }

    let id = trainer.tracking_id().unwrap();
    let stream = std::fs::read_to_string(run_dir.join(format!("tracking_{}.jsonl", id))).unwrap();
    let first: serde_json::Value = serde_json::from_str(stream.lines().next().unwrap()).unwrap();
    assert_eq!(first["update/step"], 1.0);
    assert!(first.get("episode/reward_distance").is_some());
    assert!(first.get("episode/curriculum_area").is_some());
    assert!(first.get("update/explained_variance").is_some());
}

#[test]
fn test_checkpoint_round_trip_is_exact() {
    let dir = tempfile::tempdir().unwrap();
    let mut trainer = new_trainer(dir.path(), 2, Some("exact"), None);
    trainer.train().unwrap();

    let written = CheckpointState::read(trainer.run_dir().join("checkpoint_2.bin")).unwrap();
    let live = trainer.snapshot().unwrap();

    assert_eq!(written.global_step, live.global_step);
    assert_eq!(written.update_step, 2);
    assert_eq!(written.learning_rate.to_bits(), live.learning_rate.to_bits());
    assert_eq!(written.curriculum_cells, live.curriculum_cells);
    assert_eq!(written.curriculum_counts, live.curriculum_counts);
    let bits = |s: &CheckpointState| -> Vec<Vec<u64>> {
        s.curriculum_scores
            .iter()
            .map(|d| d.iter().map(|v| v.to_bits()).collect())
            .collect()
    };
    assert_eq!(bits(&written), bits(&live));
    assert_eq!(written.network_state, live.network_state);
    assert_eq!(written.reward_normalizer_stats, live.reward_normalizer_stats);

    // Adam moments are keyed by parameter id, so compare the decoded state
    let decode = |bytes: &[u8]| {
        let mut optimizer =
            PolicyOptimizer::<ActorCritic<TrainBackend>, TrainBackend>::new(1.0, 0.5);
        optimizer.load_state(bytes).unwrap();
        (optimizer.learning_rate().to_bits(), optimizer.steps())
    };
    assert_eq!(decode(&written.optimizer_state), decode(&live.optimizer_state));
    assert_eq!(decode(&written.optimizer_state).1, 2 * 2 * 3);
}

#[test]
fn test_resume_restores_reward_stats_and_shuffle_order() {
    let dir = tempfile::tempdir().unwrap();
    let mut first = new_trainer(dir.path(), 2, Some("order"), None);
    first.train().unwrap();
    let checkpoint = CheckpointState::read(first.run_dir().join("checkpoint_2.bin")).unwrap();
    let saved_stats = checkpoint.reward_normalizer_stats.clone();
    let mut saved_rng = checkpoint.shuffle_rng.clone();

    let resumed = new_trainer(dir.path(), 5, None, Some(checkpoint));

    // Every worker continues from its own normalizer statistics
    assert_eq!(resumed.envs().gather_reward_stats(), saved_stats);
    assert!(saved_stats.iter().flatten().all(|s| s.count > 1.0));

    // The next minibatch permutation is the one the uninterrupted run would draw
    let mut resumed_rng = resumed.snapshot().unwrap().shuffle_rng;
    let batch_size = (ENVS * HORIZON) as usize;
    let mut expected: Vec<usize> = (0..batch_size).collect();
    let mut actual = expected.clone();
    expected.shuffle(&mut saved_rng);
    actual.shuffle(&mut resumed_rng);
    assert_eq!(actual, expected);
    assert_ne!(actual, (0..batch_size).collect::<Vec<_>>());
}

#[test]
fn test_resume_runs_only_remaining_updates() {
    let dir = tempfile::tempdir().unwrap();
    let mut first = new_trainer(dir.path(), 2, Some("resume"), None);
    first.train().unwrap();
    let checkpoint = CheckpointState::read(first.run_dir().join("checkpoint_2.bin")).unwrap();
    let cells_at_save = checkpoint.curriculum_cells.clone();

    // Total of 5 with 2 already done: exactly 3 more
    let mut resumed = new_trainer(dir.path(), 5, None, Some(checkpoint));
    assert_eq!(resumed.run_name(), first.run_name());
    assert_eq!(resumed.tracking_id(), first.tracking_id());
    assert_eq!(resumed.progress().update_step, 2);
    assert_eq!(resumed.curriculum().cells(), cells_at_save);

    let progress = resumed.train().unwrap();
    assert_eq!(progress.update_step, 5);
    assert_eq!(progress.global_step, 5 * ENVS * HORIZON);
    assert!(resumed.run_dir().join("checkpoint_4.bin").exists());

    // Already complete: nothing more happens
    let again = resumed.train().unwrap();
    assert_eq!(again.update_step, 5);
}

#[test]
fn test_named_resume_starts_new_run() {
    let dir = tempfile::tempdir().unwrap();
    let mut first = new_trainer(dir.path(), 2, Some("base"), None);
    first.train().unwrap();
    let checkpoint = CheckpointState::read(first.run_dir().join("checkpoint_2.bin")).unwrap();

    let forked = new_trainer(dir.path(), 3, Some("fork"), Some(checkpoint));
    assert_ne!(forked.run_name(), first.run_name());
    assert!(forked.run_name().ends_with("_fork"));
    assert_ne!(forked.tracking_id(), first.tracking_id());
    assert_eq!(forked.progress().update_step, 2);
}

#[test]
fn test_invalid_config_is_rejected_before_training() {
    let dir = tempfile::tempdir().unwrap();
    let run = RunOptions::default().with_log_dir(dir.path()).with_progress(false);
    let agent = GaussianMlp::new(3, 1, MlpConfig::default());
    let config = config(1).with_minibatches(5, 1);

    let result = Trainer::new(config, run, Walker::new, agent, None);
    assert!(matches!(result, Err(gaitlab::GaitError::InvalidConfig(_))));
}
