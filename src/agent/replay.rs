// src/agent/replay.rs
//
// Experience-replay agent with a target network. An online network is
// trained on sampled minibatches; a periodically synced copy supplies
// the bootstrap targets so they do not chase their own updates.

use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::Path;

use ndarray::{Array1, Array2, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::network::{Adam, QNetwork};
use super::{invalid_data, Agent};
use crate::config::ThinkerConfig;
use crate::observation::Observation;
use crate::types::{TrainingRecord, Transition};

/// Q-learning agent backed by a neural value function and a bounded
/// replay memory.
///
/// Exploration decays per successful replay pass rather than per
/// episode, so a long episode anneals faster than a short one.
pub struct ReplayAgent {
    observation_size: usize,
    decision_options: usize,
    online: QNetwork,
    target: QNetwork,
    optimizer: Adam,
    /// Bounded FIFO of transitions. Oldest entries are evicted first.
    memory: VecDeque<Transition>,
    memory_capacity: usize,
    batch_size: usize,
    epsilon: f64,
    epsilon_min: f64,
    epsilon_decay: f64,
    discount: f64,
    target_sync_interval: u64,
    learning_rate: f64,
    history: Vec<TrainingRecord>,
    rng: ChaCha8Rng,
}

/// Sidecar file holding everything except the network weights.
#[derive(Debug, Serialize, Deserialize)]
struct ReplaySnapshot {
    version: u32,
    exploration_rate: f64,
    training_history: Vec<TrainingRecord>,
}

const SNAPSHOT_VERSION: u32 = 1;

impl ReplayAgent {
    pub fn new(
        config: &ThinkerConfig,
        observation_size: usize,
        decision_options: usize,
        seed: u64,
    ) -> Self {
        let online = QNetwork::new(
            observation_size,
            decision_options,
            config.hidden_dim,
            seed,
        );
        let target = online.clone();
        let optimizer = Adam::new(&online, config.learning_rate);
        Self {
            observation_size,
            decision_options,
            online,
            target,
            optimizer,
            memory: VecDeque::with_capacity(config.memory_capacity.min(4096)),
            memory_capacity: config.memory_capacity,
            batch_size: config.batch_size,
            epsilon: config.epsilon,
            epsilon_min: config.epsilon_min,
            epsilon_decay: config.epsilon_decay,
            discount: config.discount_factor,
            target_sync_interval: config.target_sync_interval,
            learning_rate: config.learning_rate,
            history: Vec::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn memory_len(&self) -> usize {
        self.memory.len()
    }

    pub fn memory(&self) -> &VecDeque<Transition> {
        &self.memory
    }

    /// Current action values from the online network.
    pub fn action_values(&self, observation: &Observation) -> Vec<f64> {
        let x = Array1::from_vec(observation.values().to_vec());
        self.online.forward(x.view()).to_vec()
    }

    /// Action values from the target network, for inspecting sync state.
    pub fn target_action_values(&self, observation: &Observation) -> Vec<f64> {
        let x = Array1::from_vec(observation.values().to_vec());
        self.target.forward(x.view()).to_vec()
    }

    /// Append a transition, evicting the oldest at capacity.
    pub fn remember(&mut self, transition: Transition) {
        if self.memory.len() == self.memory_capacity {
            self.memory.pop_front();
        }
        self.memory.push_back(transition);
    }

    /// Train on one sampled minibatch. A no-op until the memory holds
    /// at least `batch_size` transitions; exploration decays only when
    /// a batch is actually trained.
    pub fn replay(&mut self) {
        if self.memory.len() < self.batch_size {
            return;
        }

        let picks =
            rand::seq::index::sample(&mut self.rng, self.memory.len(), self.batch_size).into_vec();

        let mut states = Array2::zeros((self.batch_size, self.observation_size));
        let mut next_states = Array2::zeros((self.batch_size, self.observation_size));
        for (row, &idx) in picks.iter().enumerate() {
            let t = &self.memory[idx];
            for (col, v) in t.state.values().iter().enumerate() {
                states[[row, col]] = *v;
            }
            for (col, v) in t.next_state.values().iter().enumerate() {
                next_states[[row, col]] = *v;
            }
        }

        // Start targets at the online predictions so only the acted-on
        // component carries gradient, then override that component with
        // the bootstrapped value from the target network.
        let mut targets = self.online.predict_batch(&states);
        let next_values = self.target.predict_batch(&next_states);
        for (row, &idx) in picks.iter().enumerate() {
            let t = &self.memory[idx];
            let value = if t.done {
                t.reward
            } else {
                let best = next_values
                    .index_axis(Axis(0), row)
                    .iter()
                    .cloned()
                    .fold(f64::NEG_INFINITY, f64::max);
                t.reward + self.discount * best
            };
            if t.action < self.decision_options {
                targets[[row, t.action]] = value;
            }
        }

        self.online
            .train_batch(&states, &targets, &mut self.optimizer);
        self.epsilon = (self.epsilon * self.epsilon_decay).max(self.epsilon_min);
    }
}

impl Agent for ReplayAgent {
    fn act(&mut self, observation: &Observation) -> usize {
        if self.rng.gen::<f64>() < self.epsilon {
            return self.rng.gen_range(0..self.decision_options);
        }

        let q = self.action_values(observation);
        let mut best = 0;
        for (i, v) in q.iter().enumerate() {
            if *v > q[best] {
                best = i;
            }
        }
        best
    }

    fn observe(&mut self, transition: &Transition) {
        self.remember(transition.clone());
        self.replay();
    }

    fn record_episode(&mut self, episode: u64, total_reward: f64, steps: u64) {
        self.history.push(TrainingRecord {
            episode,
            total_reward,
            steps,
            exploration_rate: self.epsilon,
        });
    }

    fn exploration_rate(&self) -> f64 {
        self.epsilon
    }

    fn history(&self) -> &[TrainingRecord] {
        &self.history
    }

    fn target_sync_interval(&self) -> Option<u64> {
        Some(self.target_sync_interval)
    }

    fn update_target_network(&mut self) {
        self.target = self.online.clone();
    }

    /// Writes `<base>.weights.json` (online network) and
    /// `<base>.history.json` (exploration rate and episode records).
    fn save(&self, base: &Path) -> io::Result<()> {
        if let Some(parent) = base.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let weights = File::create(base.with_extension("weights.json"))?;
        serde_json::to_writer(BufWriter::new(weights), &self.online).map_err(invalid_data)?;

        let snapshot = ReplaySnapshot {
            version: SNAPSHOT_VERSION,
            exploration_rate: self.epsilon,
            training_history: self.history.clone(),
        };
        let sidecar = File::create(base.with_extension("history.json"))?;
        serde_json::to_writer(BufWriter::new(sidecar), &snapshot).map_err(invalid_data)
    }

    /// Restores both artifacts written by `save`. The target network is
    /// re-synced to the restored online network and the optimizer state
    /// starts fresh; momentum is not part of the snapshot.
    fn load(&mut self, base: &Path) -> io::Result<()> {
        let weights = File::open(base.with_extension("weights.json"))?;
        let online: QNetwork =
            serde_json::from_reader(BufReader::new(weights)).map_err(invalid_data)?;
        if online.input_dim() != self.observation_size
            || online.output_dim() != self.decision_options
        {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "network shape {}x{} does not match agent {}x{}",
                    online.input_dim(),
                    online.output_dim(),
                    self.observation_size,
                    self.decision_options
                ),
            ));
        }

        let sidecar = File::open(base.with_extension("history.json"))?;
        let snapshot: ReplaySnapshot =
            serde_json::from_reader(BufReader::new(sidecar)).map_err(invalid_data)?;

        self.target = online.clone();
        self.optimizer = Adam::new(&online, self.learning_rate);
        self.online = online;
        self.epsilon = snapshot.exploration_rate;
        self.history = snapshot.training_history;
        Ok(())
    }
}
