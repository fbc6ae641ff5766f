// src/types.rs
//
// Shared identifiers and small data types used across the crate:
// simulator snapshots, the learning Transition, and per-episode
// training records.

use serde::{Deserialize, Serialize};

use crate::observation::Observation;

/// Stable road (edge) identifier in the street network.
pub type RoadId = String;

/// Stable vehicle identifier inside a simulator session.
pub type VehicleId = String;

/// Simulated time, counted in ticks (one tick = one simulator step).
pub type Tick = u64;

/// Snapshot of the controlled vehicle's state for one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleSnapshot {
    /// Road the vehicle is currently on.
    pub current_road: RoadId,
    /// Current speed (m/s).
    pub speed: f64,
    /// Vehicle's maximum speed (m/s).
    pub max_speed: f64,
    /// Consecutive time spent effectively stopped (seconds).
    pub waiting_time: f64,
}

/// Snapshot of one road's occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoadSnapshot {
    /// Number of vehicles currently on the road.
    pub vehicle_count: usize,
    /// Road length (meters).
    pub length: f64,
}

/// One unit of learning: `(state, action, reward, next_state, done)`.
///
/// `done` marks episode termination; the transition that carries it is
/// the last one of its episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub state: Observation,
    pub action: usize,
    pub reward: f64,
    pub next_state: Observation,
    pub done: bool,
}

/// Per-episode summary appended to an agent's training history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRecord {
    /// Episode index (0-based).
    pub episode: u64,
    /// Sum of rewards over the episode.
    pub total_reward: f64,
    /// Number of environment steps taken.
    pub steps: u64,
    /// Exploration rate at the end of the episode.
    pub exploration_rate: f64,
}
