//! Environment traits and wrappers.
//!
//! Provides the `LeggedEnv` trait that every simulation slot implements, the
//! episode-end info it reports, and the reward normalization wrapper applied
//! inside each parallel worker.

mod traits;
mod wrappers;

pub use traits::{
    CurriculumOutcome, EnvInfo, EpisodeSummary, LeggedEnv, RewardComponents, StepResult,
};
pub use wrappers::{NormalizeReward, RewardNormalizerStats};
