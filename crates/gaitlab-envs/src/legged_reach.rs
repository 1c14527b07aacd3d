//! Point-foot reaching task with a leg-design catalogue.

use gaitlab::curriculum::{Cell, DesignSet};
use gaitlab::env::{CurriculumOutcome, EnvInfo, EpisodeSummary, LeggedEnv, StepResult};
use gaitlab::Result;
use ndarray::{array, Array1, Array2, ArrayView1};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::f32::consts::PI;

/// Number of leg configurations in the catalogue
pub const NUM_LEG_CONFIGS: usize = 200;
/// Parameters per leg configuration: thigh, shin, hip stiffness, knee stiffness
pub const NUM_LEG_PARAMS: usize = 4;

const LEG_PARAM_LOW: [f32; NUM_LEG_PARAMS] = [0.5, 0.5, 0.1, 0.1];
const LEG_PARAM_HIGH: [f32; NUM_LEG_PARAMS] = [1.5, 1.5, 0.6, 0.6];
const CATALOGUE_SEED: u64 = 7;

/// A foot is steered toward a target whose placement is set by the curriculum cell.
///
/// The cell `(x, y)` places the target at distance `0.3 + 0.15 * |x|` and
/// heading `y * pi / 8` from the start. Longer legs move faster; stiffer
/// joints cost more energy.
///
/// Observation: [foot_x, foot_y, dx_to_target, dy_to_target, leg params...]
/// Action: 2-D velocity command in [-1, 1]
pub struct LeggedReach {
    // Task constants
    success_radius: f32,
    max_steps: u32,
    score_th: f64,

    // Leg catalogue and curriculum
    leg_params: Array2<f32>,
    design_members: Vec<Vec<usize>>,
    cells: Vec<Vec<Cell>>,

    // Episode state
    foot: [f32; 2],
    target: [f32; 2],
    start_distance: f32,
    leg: usize,
    design: usize,
    cell: Cell,
    steps: u32,
    reward_sums: [f32; 3],
    rng: ChaCha8Rng,
}

impl LeggedReach {
    /// Create a new LeggedReach environment
    pub fn new() -> Self {
        let mut catalogue_rng = ChaCha8Rng::seed_from_u64(CATALOGUE_SEED);
        let leg_params = Array2::from_shape_fn((NUM_LEG_CONFIGS, NUM_LEG_PARAMS), |(_, j)| {
            catalogue_rng.gen_range(LEG_PARAM_LOW[j]..LEG_PARAM_HIGH[j])
        });

        Self {
            success_radius: 0.05,
            max_steps: 200,
            score_th: 0.8,
            leg_params,
            design_members: Vec::new(),
            cells: Vec::new(),
            foot: [0.0; 2],
            target: [0.0; 2],
            start_distance: 1.0,
            leg: 0,
            design: 0,
            cell: Cell::ORIGIN,
            steps: 0,
            reward_sums: [0.0; 3],
            rng: ChaCha8Rng::seed_from_u64(0),
        }
    }

    /// Target position for a curriculum cell
    pub fn target_for(cell: Cell) -> [f32; 2] {
        let radius = 0.3 + 0.15 * cell.x.unsigned_abs() as f32;
        let heading = cell.y as f32 * PI / 8.0;
        [radius * heading.cos(), radius * heading.sin()]
    }

    /// Cell of the current episode
    pub fn cell(&self) -> Cell {
        self.cell
    }

    /// Design of the current episode
    pub fn design(&self) -> usize {
        self.design
    }

    fn speed(&self) -> f32 {
        0.05 * (self.leg_params[[self.leg, 0]] + self.leg_params[[self.leg, 1]])
    }

    fn distance(&self) -> f32 {
        let dx = self.target[0] - self.foot[0];
        let dy = self.target[1] - self.foot[1];
        (dx * dx + dy * dy).sqrt()
    }

    fn observation(&self) -> Array1<f32> {
        let leg = self.leg_params.row(self.leg);
        array![
            self.foot[0],
            self.foot[1],
            self.target[0] - self.foot[0],
            self.target[1] - self.foot[1],
            leg[0],
            leg[1],
            leg[2],
            leg[3]
        ]
    }

    /// Pick a design, one of its leg configurations and one of its cells
    fn sample_episode(&mut self) {
        let num_designs = self.design_members.len().max(self.cells.len()).max(1);
        self.design = self.rng.gen_range(0..num_designs);

        self.leg = match self.design_members.get(self.design) {
            Some(members) if !members.is_empty() => members[self.rng.gen_range(0..members.len())],
            _ => self.rng.gen_range(0..NUM_LEG_CONFIGS),
        };

        self.cell = match self.cells.get(self.design) {
            Some(cells) if !cells.is_empty() => cells[self.rng.gen_range(0..cells.len())],
            _ => Cell::ORIGIN,
        };
    }

    fn score(&self, success: bool) -> f32 {
        if success {
            1.0
        } else {
            (1.0 - self.distance() / self.start_distance).clamp(0.0, 1.0)
        }
    }
}

impl Default for LeggedReach {
    fn default() -> Self {
        Self::new()
    }
}

impl LeggedEnv for LeggedReach {
    fn observation_size(&self) -> usize {
        4 + NUM_LEG_PARAMS
    }

    fn action_size(&self) -> usize {
        2
    }

    fn reset(&mut self, seed: Option<u64>) -> Result<(Array1<f32>, EnvInfo)> {
        if let Some(s) = seed {
            self.rng = ChaCha8Rng::seed_from_u64(s);
        }

        self.sample_episode();
        self.foot = [0.0; 2];
        self.target = Self::target_for(self.cell);
        self.start_distance = self.distance().max(1e-6);
        self.steps = 0;
        self.reward_sums = [0.0; 3];

        Ok((self.observation(), EnvInfo::new()))
    }

    fn step(&mut self, action: ArrayView1<f32>) -> Result<StepResult> {
        if action.len() != 2 {
            return Err(gaitlab::GaitError::ShapeMismatch {
                expected: vec![2],
                actual: vec![action.len()],
            });
        }

        let command = [action[0].clamp(-1.0, 1.0), action[1].clamp(-1.0, 1.0)];
        let before = self.distance();
        let speed = self.speed();
        self.foot[0] += speed * command[0];
        self.foot[1] += speed * command[1];
        self.steps += 1;

        let after = self.distance();
        let stiffness = self.leg_params[[self.leg, 2]] + self.leg_params[[self.leg, 3]];
        let progress = 10.0 * (before - after);
        let energy = -0.01 * stiffness * (command[0] * command[0] + command[1] * command[1]);
        let terminated = after < self.success_radius;
        let success = if terminated { 1.0 } else { 0.0 };
        let truncated = !terminated && self.steps >= self.max_steps;

        self.reward_sums[0] += progress;
        self.reward_sums[1] += energy;
        self.reward_sums[2] += success;

        let mut info = EnvInfo::new();
        if terminated || truncated {
            info = info.with_episode(
                EpisodeSummary::new(CurriculumOutcome {
                    design: self.design,
                    cell: self.cell,
                    score: self.score(terminated),
                })
                .with_reward("progress", self.reward_sums[0])
                .with_reward("energy", self.reward_sums[1])
                .with_reward("success", self.reward_sums[2]),
            );
        }

        Ok(StepResult {
            observation: self.observation(),
            reward: progress + energy + success,
            terminated,
            truncated,
            info,
        })
    }

    fn set_curriculum_designs(&mut self, designs: &DesignSet) {
        let mut members = vec![Vec::new(); designs.len()];
        for (leg, &label) in designs.labels.iter().enumerate() {
            if let Some(group) = members.get_mut(label) {
                group.push(leg);
            }
        }
        self.design_members = members;
    }

    fn set_curriculum_cells(&mut self, cells: &[Vec<Cell>]) {
        self.cells = cells.to_vec();
    }

    fn curriculum_score_th(&self) -> f64 {
        self.score_th
    }

    fn leg_params(&self) -> Array2<f32> {
        self.leg_params.clone()
    }

    fn leg_param_bounds(&self) -> (Array1<f32>, Array1<f32>) {
        (Array1::from(LEG_PARAM_LOW.to_vec()), Array1::from(LEG_PARAM_HIGH.to_vec()))
    }
}
