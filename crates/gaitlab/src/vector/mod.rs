//! Vectorized environment engine.
//!
//! `ChunkedVecEnv` runs groups of workers on the rayon pool. Each worker owns
//! one environment behind the reward normalizer and resets it automatically
//! when an episode ends. Cross-worker state moves only through explicit
//! `scatter` / `gather` calls.

mod chunked;
mod vecenv;
mod worker;

pub use chunked::ChunkedVecEnv;
pub use vecenv::{VecEnvConfig, VecStepResult};
pub use worker::{Worker, WorkerStep};
