//! Core environment trait definitions.

use crate::curriculum::{Cell, DesignSet};
use crate::Result;
use ndarray::{Array1, Array2, ArrayView1};
use smallvec::SmallVec;

/// Named reward components of one episode (kept inline for the common case).
pub type RewardComponents = SmallVec<[(&'static str, f32); 4]>;

/// Curriculum record of a finished episode.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CurriculumOutcome {
    /// Design the episode was played with
    pub design: usize,
    /// Difficulty cell the episode was played in
    pub cell: Cell,
    /// Task success in `[0, 1]`
    pub score: f32,
}

/// Summary attached to the info of the step that ends an episode.
#[derive(Clone, Debug, PartialEq)]
pub struct EpisodeSummary {
    /// Per-component reward sums, e.g. `("progress", 3.2)`
    pub rewards: RewardComponents,
    pub curriculum: CurriculumOutcome,
}

impl EpisodeSummary {
    pub fn new(curriculum: CurriculumOutcome) -> Self {
        Self {
            rewards: SmallVec::new(),
            curriculum,
        }
    }

    pub fn with_reward(mut self, name: &'static str, value: f32) -> Self {
        self.rewards.push((name, value));
        self
    }

    /// Look up a reward component by name
    pub fn reward(&self, name: &str) -> Option<f32> {
        self.rewards.iter().find(|(k, _)| *k == name).map(|(_, v)| *v)
    }
}

/// Information returned from environment steps
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EnvInfo {
    /// Present only on the step that ends an episode
    pub episode: Option<EpisodeSummary>,
}

impl EnvInfo {
    /// Create empty info
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_episode(mut self, summary: EpisodeSummary) -> Self {
        self.episode = Some(summary);
        self
    }
}

/// Result from a single environment step
#[derive(Clone, Debug)]
pub struct StepResult {
    /// Observation after the step
    pub observation: Array1<f32>,
    /// Reward received
    pub reward: f32,
    /// Whether episode terminated (goal reached, failure, etc.)
    pub terminated: bool,
    /// Whether episode truncated (time limit, etc.)
    pub truncated: bool,
    /// Additional info
    pub info: EnvInfo,
}

impl StepResult {
    /// Check if episode is done (terminated or truncated)
    pub fn done(&self) -> bool {
        self.terminated || self.truncated
    }
}

/// A single legged-robot simulation slot.
///
/// Besides the usual reset/step pair, an environment exposes the leg
/// configurations it can simulate (for design clustering) and accepts the
/// curriculum state it should sample episodes from.
///
/// # Example
///
/// ```rust,ignore
/// use gaitlab::env::{EnvInfo, LeggedEnv, StepResult};
///
/// impl LeggedEnv for MyRobot {
///     fn observation_size(&self) -> usize { 12 }
///     fn action_size(&self) -> usize { 4 }
///
///     fn reset(&mut self, seed: Option<u64>) -> Result<(Array1<f32>, EnvInfo)> {
///         // pick a design and a cell from the injected curriculum
///     }
///
///     fn step(&mut self, action: ArrayView1<f32>) -> Result<StepResult> {
///         // advance the simulation; attach an EpisodeSummary when done
///     }
///     // ...
/// }
/// ```
pub trait LeggedEnv: Send {
    /// Length of the flat observation vector
    fn observation_size(&self) -> usize;

    /// Length of the flat continuous action vector
    fn action_size(&self) -> usize;

    /// Reset the environment to a fresh episode
    ///
    /// # Arguments
    /// * `seed` - Optional random seed for reproducibility
    fn reset(&mut self, seed: Option<u64>) -> Result<(Array1<f32>, EnvInfo)>;

    /// Take a single step in the environment
    fn step(&mut self, action: ArrayView1<f32>) -> Result<StepResult>;

    /// Inject the design clusters; called once before the first rollout
    fn set_curriculum_designs(&mut self, designs: &DesignSet);

    /// Inject the per-design cell sets; called before every rollout
    fn set_curriculum_cells(&mut self, cells: &[Vec<Cell>]);

    /// Score above which a cell's frontier is expanded
    fn curriculum_score_th(&self) -> f64;

    /// All leg configurations this environment can simulate, one per row
    fn leg_params(&self) -> Array2<f32>;

    /// Per-parameter `(low, high)` bounds of `leg_params`
    fn leg_param_bounds(&self) -> (Array1<f32>, Array1<f32>);

    /// Optional: Close the environment and free resources
    fn close(&mut self) {}
}
