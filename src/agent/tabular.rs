// src/agent/tabular.rs
//
// Bootstrapped Q-learning over a growable lookup table keyed by
// discretized observations.
//
// Two deliberate, load-bearing quirks inherited from the system this
// reimplements; both are invariants, not bugs:
// - the table grows without bound (no eviction)
// - the exploration rate doubles as the learning-rate coefficient,
//   so learned values depend on the decay schedule

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::Path;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::{invalid_data, Agent};
use crate::config::LearnerConfig;
use crate::observation::Observation;
use crate::types::{Transition, TrainingRecord};

/// Snapshot format version.
const SNAPSHOT_VERSION: u32 = 1;

/// Tabular Q-learning agent with adaptive exploration.
pub struct TabularAgent {
    decision_options: usize,
    /// Discretized observation key -> one action-value per decision.
    /// Grows unboundedly as new keys are seen. BTreeMap keeps snapshot
    /// key order deterministic.
    experience_book: BTreeMap<String, Vec<f64>>,
    /// Exploration rate; also the update step size (see `learn`).
    curiosity: f64,
    /// Discount on bootstrapped next-state values.
    memory_strength: f64,
    /// Multiplicative curiosity decay at episode end.
    patience: f64,
    /// Curiosity floor.
    min_curiosity: f64,
    history: Vec<TrainingRecord>,
    rng: ChaCha8Rng,
}

/// Persisted learning state.
#[derive(Debug, Serialize, Deserialize)]
struct TabularSnapshot {
    version: u32,
    experience_book: BTreeMap<String, Vec<f64>>,
    exploration_rate: f64,
    training_history: Vec<TrainingRecord>,
}

impl TabularAgent {
    pub fn new(config: &LearnerConfig, decision_options: usize, seed: u64) -> Self {
        Self {
            decision_options,
            experience_book: BTreeMap::new(),
            curiosity: config.curiosity_level,
            memory_strength: config.memory_strength,
            patience: config.patience,
            min_curiosity: config.min_curiosity,
            history: Vec::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Number of distinct discretized situations seen so far.
    pub fn known_situations(&self) -> usize {
        self.experience_book.len()
    }

    pub fn experience_book(&self) -> &BTreeMap<String, Vec<f64>> {
        &self.experience_book
    }

    /// Action-value row for a key, lazily initialized to zeros.
    fn row(&mut self, key: &str) -> &mut Vec<f64> {
        let width = self.decision_options;
        self.experience_book
            .entry(key.to_string())
            .or_insert_with(|| vec![0.0; width])
    }

    /// One Q-learning update from a transition.
    ///
    /// Target is `reward` on terminal transitions, otherwise
    /// `reward + memory_strength * max(next row)`. The step size is
    /// the current exploration rate, preserved exactly from the source
    /// design (see module header).
    pub fn learn(
        &mut self,
        state: &Observation,
        action: usize,
        reward: f64,
        next_state: &Observation,
        done: bool,
    ) {
        let key = state.situation_code();
        let next_key = next_state.situation_code();
        self.row(&key);
        self.row(&next_key);

        let next_best = self.experience_book[&next_key]
            .iter()
            .cloned()
            .fold(f64::NEG_INFINITY, f64::max);
        let target = if done {
            reward
        } else {
            reward + self.memory_strength * next_best
        };

        let step = self.curiosity;
        let row = self.row(&key);
        if action < row.len() {
            row[action] += step * (target - row[action]);
        }

        if done {
            self.curiosity = (self.curiosity * self.patience).max(self.min_curiosity);
        }
    }
}

impl Agent for TabularAgent {
    fn act(&mut self, observation: &Observation) -> usize {
        let key = observation.situation_code();
        self.row(&key);

        if self.rng.gen::<f64>() < self.curiosity {
            return self.rng.gen_range(0..self.decision_options);
        }

        // Exploit: first maximal index wins ties.
        let row = &self.experience_book[&key];
        let mut best = 0;
        for (i, v) in row.iter().enumerate() {
            if *v > row[best] {
                best = i;
            }
        }
        best
    }

    fn observe(&mut self, transition: &Transition) {
        self.learn(
            &transition.state,
            transition.action,
            transition.reward,
            &transition.next_state,
            transition.done,
        );
    }

    fn record_episode(&mut self, episode: u64, total_reward: f64, steps: u64) {
        self.history.push(TrainingRecord {
            episode,
            total_reward,
            steps,
            exploration_rate: self.curiosity,
        });
    }

    fn exploration_rate(&self) -> f64 {
        self.curiosity
    }

    fn history(&self) -> &[TrainingRecord] {
        &self.history
    }

    fn save(&self, base: &Path) -> io::Result<()> {
        if let Some(parent) = base.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let snapshot = TabularSnapshot {
            version: SNAPSHOT_VERSION,
            experience_book: self.experience_book.clone(),
            exploration_rate: self.curiosity,
            training_history: self.history.clone(),
        };
        let file = File::create(base.with_extension("json"))?;
        serde_json::to_writer(BufWriter::new(file), &snapshot).map_err(invalid_data)
    }

    fn load(&mut self, base: &Path) -> io::Result<()> {
        let file = File::open(base.with_extension("json"))?;
        let snapshot: TabularSnapshot =
            serde_json::from_reader(BufReader::new(file)).map_err(invalid_data)?;

        // Reject rows of the wrong width rather than learn from them.
        for (key, row) in &snapshot.experience_book {
            if row.len() != self.decision_options {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "row for key {key} has {} entries, expected {}",
                        row.len(),
                        self.decision_options
                    ),
                ));
            }
        }

        self.experience_book = snapshot.experience_book;
        self.curiosity = snapshot.exploration_rate;
        self.history = snapshot.training_history;
        Ok(())
    }
}
