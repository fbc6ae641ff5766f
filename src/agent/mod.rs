// src/agent/mod.rs
//
// Shared contract between the training loop and the two agent
// flavors. The loop holds a `Box<dyn Agent>` chosen at construction;
// it never inspects which flavor it drives.

use std::io;
use std::path::Path;

use crate::observation::Observation;
use crate::types::{Transition, TrainingRecord};

pub mod network;
pub mod replay;
pub mod tabular;

pub use network::{Adam, DenseLayer, QNetwork};
pub use replay::ReplayAgent;
pub use tabular::TabularAgent;

/// A long-lived learning agent driven by the training loop.
///
/// Agents are `Ready` from construction onward; every call leaves them
/// ready for the next. There is no terminal state.
pub trait Agent {
    /// Choose an action for the observation (epsilon-greedy).
    fn act(&mut self, observation: &Observation) -> usize;

    /// Feed one transition back into the agent. Tabular agents learn
    /// from it immediately; replay agents store it and train on a
    /// sampled batch.
    fn observe(&mut self, transition: &Transition);

    /// Append a per-episode summary to the training history.
    fn record_episode(&mut self, episode: u64, total_reward: f64, steps: u64);

    /// Current exploration rate, in `[0, 1]`.
    fn exploration_rate(&self) -> f64;

    /// Append-only training history.
    fn history(&self) -> &[TrainingRecord];

    /// Episode cadence at which the caller should invoke
    /// [`Agent::update_target_network`]. `None` for agents without a
    /// target network.
    fn target_sync_interval(&self) -> Option<u64> {
        None
    }

    /// Copy online parameters into the target network. The agent never
    /// self-triggers this; the training loop owns the cadence.
    fn update_target_network(&mut self) {}

    /// Persist the full learning state under the given base path.
    fn save(&self, base: &Path) -> io::Result<()>;

    /// Restore the state saved by [`Agent::save`]. Missing or corrupt
    /// artifacts are hard failures; learning must not silently proceed
    /// from absent state.
    fn load(&mut self, base: &Path) -> io::Result<()>;
}

/// Map a serde_json failure into the io error the persistence API
/// surfaces.
pub(crate) fn invalid_data(err: serde_json::Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err)
}
