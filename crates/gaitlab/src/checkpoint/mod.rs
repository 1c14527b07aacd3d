//! Checkpointing system for resumable training.
//!
//! Provides:
//! - `Checkpointable` trait for components that can be saved/restored
//! - `CheckpointManager` for save cadence and file layout
//! - `CheckpointState` for complete training state serialization

mod manager;
mod state;

pub use manager::{resolve_checkpoint, CheckpointConfig, CheckpointManager};
pub use state::{CheckpointState, Checkpointable};

pub(crate) use state::unix_timestamp;
