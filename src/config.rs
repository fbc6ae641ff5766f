// src/config.rs
//
// Central configuration for route-choice training.
// Three bundles, each immutable for the lifetime of one training run:
// - CityConfig:    environment shape (observation size, action count,
//                  episode length, traffic volume)
// - LearnerConfig: tabular agent hyperparameters
// - ThinkerConfig: replay agent hyperparameters
//
// Plus coarse city presets used by the CLI harness.

use serde::{Deserialize, Serialize};

use crate::sim::RoadNetwork;

/// Environment configuration for one city / training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CityConfig {
    /// Observation vector length. Components beyond the built signals
    /// are zero-padded (reserved for future signals).
    pub attention_spots: usize,
    /// Number of discrete routing choices exposed to the agents.
    pub decision_options: usize,
    /// Episode length bound in ticks.
    pub max_journey_time: u64,
    /// Number of vehicles spawned per episode.
    pub number_of_cars: usize,
    /// Run the simulator with its interactive display (when supported).
    pub show_visuals: bool,
    /// Randomize initial traffic on session start.
    pub randomize_traffic: bool,
}

impl Default for CityConfig {
    fn default() -> Self {
        Self {
            attention_spots: 10,
            decision_options: 4,
            max_journey_time: 500,
            number_of_cars: 30,
            show_visuals: false,
            randomize_traffic: true,
        }
    }
}

/// Hyperparameters for the tabular agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnerConfig {
    /// Initial exploration rate. Also the learning-rate coefficient:
    /// the tabular update deliberately reuses the exploration rate as
    /// its step size (see `agent::tabular`).
    pub curiosity_level: f64,
    /// Discount applied to bootstrapped next-state values.
    pub memory_strength: f64,
    /// Multiplicative exploration decay applied at episode end.
    pub patience: f64,
    /// Exploration floor; decay never goes below this.
    pub min_curiosity: f64,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            curiosity_level: 0.1,
            memory_strength: 0.95,
            patience: 0.995,
            min_curiosity: 0.01,
        }
    }
}

/// Hyperparameters for the replay agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThinkerConfig {
    /// Adam learning rate for the online network.
    pub learning_rate: f64,
    /// Replay buffer capacity; oldest transitions are evicted first.
    pub memory_capacity: usize,
    /// Batch size sampled per replay step.
    pub batch_size: usize,
    /// Episode cadence at which the caller syncs the target network.
    pub target_sync_interval: u64,
    /// Initial exploration rate.
    pub epsilon: f64,
    /// Exploration floor.
    pub epsilon_min: f64,
    /// Multiplicative exploration decay applied per replay step.
    pub epsilon_decay: f64,
    /// Discount factor for bootstrapped targets.
    pub discount_factor: f64,
    /// Width of each hidden layer in the Q-network.
    pub hidden_dim: usize,
}

impl Default for ThinkerConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.001,
            memory_capacity: 10_000,
            batch_size: 32,
            target_sync_interval: 100,
            epsilon: 1.0,
            epsilon_min: 0.01,
            epsilon_decay: 0.995,
            discount_factor: 0.95,
            hidden_dim: 64,
        }
    }
}

/// Coarse city preset used by the CLI harness.
///
/// Presets only pick a built-in network shape and a recommended
/// traffic volume on top of `CityConfig::default()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CityPreset {
    /// Dense urban core: large grid, heavy traffic.
    Dense,
    /// Industrial corridor: elongated grid, mixed traffic.
    Industrial,
    /// Simple fallback grid.
    Grid,
}

impl CityPreset {
    /// Stable lowercase name for the preset (used in logs and file names).
    pub fn as_str(&self) -> &'static str {
        match self {
            CityPreset::Dense => "dense",
            CityPreset::Industrial => "industrial",
            CityPreset::Grid => "grid",
        }
    }

    /// Parse a preset name (case-insensitive). Returns None if unrecognized.
    pub fn parse(s: &str) -> Option<CityPreset> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dense" | "city" | "d" => Some(CityPreset::Dense),
            "industrial" | "corridor" | "i" => Some(CityPreset::Industrial),
            "grid" | "default" | "g" => Some(CityPreset::Grid),
            _ => None,
        }
    }

    /// Recommended vehicle count for the preset.
    pub fn recommended_vehicles(&self) -> usize {
        match self {
            CityPreset::Dense => 60,
            CityPreset::Industrial => 40,
            CityPreset::Grid => 30,
        }
    }

    /// One-line description for the CLI listing.
    pub fn description(&self) -> &'static str {
        match self {
            CityPreset::Dense => "Dense urban core - heavy traffic",
            CityPreset::Industrial => "Industrial corridor - mixed traffic",
            CityPreset::Grid => "Simple grid network",
        }
    }

    /// Build the preset's in-memory road network.
    pub fn network(&self) -> RoadNetwork {
        match self {
            CityPreset::Dense => RoadNetwork::grid(6, 6, 150.0),
            CityPreset::Industrial => RoadNetwork::grid(3, 8, 250.0),
            CityPreset::Grid => RoadNetwork::grid(4, 4, 200.0),
        }
    }

    /// All presets, for `--list-cities`.
    pub fn all() -> &'static [CityPreset] {
        &[CityPreset::Dense, CityPreset::Industrial, CityPreset::Grid]
    }
}
