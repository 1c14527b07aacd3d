//! Reference environments for gaitlab.
//!
//! Provides:
//! - `LeggedReach` - point-foot reaching with a 200-entry leg catalogue and
//!   curriculum-placed targets

mod legged_reach;

pub use legged_reach::{LeggedReach, NUM_LEG_CONFIGS, NUM_LEG_PARAMS};
