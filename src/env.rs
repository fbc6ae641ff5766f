// src/env.rs
//
// Gym-style environment over one street-network traffic simulator
// session: reset() -> Observation, step(action) -> StepResult.
//
// Fault policy (see also sim.rs):
// - transient query failures are recovered locally, never raised
// - session-start failure degrades to an episode that is over on the
//   first step
// - route-mutation rejections are silent no-ops
// The session handle is released on every exit path, including Drop.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::config::CityConfig;
use crate::observation::{Observation, ObservationBuilder};
use crate::sim::{SessionOptions, TrafficSim};
use crate::types::{RoadId, Tick, VehicleId};

/// Base shaping reward for surviving a tick.
const REWARD_BASE: f64 = 0.1;
/// Penalty per second of accumulated waiting.
const REWARD_WAIT_PENALTY: f64 = 0.01;
/// Bonus scale on the speed / max-speed ratio.
const REWARD_SPEED_BONUS: f64 = 0.1;
/// Extra penalty once a stopped vehicle has waited this long.
const STUCK_WAIT_THRESHOLD: f64 = 30.0;
const STUCK_PENALTY: f64 = 0.5;

/// Result of a single environment step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    /// The observation after taking the action.
    pub observation: Observation,
    /// The reward for this step.
    pub reward: f64,
    /// Whether the episode has terminated.
    pub done: bool,
    /// Diagnostic info; never consulted by agents.
    pub info: StepInfo,
}

/// Diagnostics attached to every step.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepInfo {
    /// Controlled vehicle, if one is assigned.
    pub vehicle_id: Option<VehicleId>,
    /// Ticks elapsed in this episode.
    pub elapsed_ticks: Tick,
    /// Cumulative travel time (seconds; one tick = one second).
    pub total_travel_time: f64,
}

/// Environment bridging one simulated day between an agent and the
/// traffic simulator.
///
/// Owns the simulator session exclusively: `reset` closes any previous
/// session before opening the next, and dropping the navigator closes
/// whatever is still open.
pub struct Navigator<S: TrafficSim> {
    sim: S,
    config: CityConfig,
    builder: ObservationBuilder,
    current_vehicle: Option<VehicleId>,
    time_elapsed: Tick,
    session_active: bool,
    done: bool,
    rng: ChaCha8Rng,
}

impl<S: TrafficSim> Navigator<S> {
    pub fn new(sim: S, config: CityConfig) -> Self {
        let builder = ObservationBuilder::new(config.attention_spots, config.max_journey_time);
        Self {
            sim,
            config,
            builder,
            current_vehicle: None,
            time_elapsed: 0,
            session_active: false,
            done: false,
            rng: ChaCha8Rng::seed_from_u64(0),
        }
    }

    /// Start a new episode, with an optional seed for the session's
    /// traffic randomization.
    ///
    /// Fails soft: if the session cannot start, returns the all-zero
    /// observation and the first `step` reports `done` immediately.
    pub fn reset(&mut self, seed: Option<u64>) -> Observation {
        self.close();

        let seed = seed.unwrap_or_else(|| self.rng.gen());
        self.time_elapsed = 0;
        self.current_vehicle = None;

        let options = SessionOptions {
            headless: !self.config.show_visuals,
            randomize_traffic: self.config.randomize_traffic,
            seed,
            vehicle_count: self.config.number_of_cars,
        };
        if self.sim.start(&options).is_err() {
            self.done = true;
            return Observation::zeros(self.config.attention_spots);
        }
        self.session_active = true;

        // Control the first vehicle the simulator reports; with no
        // active vehicles the episode is trivially over.
        self.current_vehicle = self.sim.active_vehicle_ids().into_iter().next();
        self.done = self.current_vehicle.is_none();

        match &self.current_vehicle {
            Some(id) => {
                let id = id.clone();
                self.builder.build(&self.sim, &id, 0)
            }
            None => Observation::zeros(self.config.attention_spots),
        }
    }

    /// Apply a routing decision, advance one tick, and report the new
    /// observation, reward, and termination signal.
    pub fn step(&mut self, action: usize) -> StepResult {
        if self.done {
            // Episode already over; do not touch the simulator.
            return StepResult {
                observation: Observation::zeros(self.config.attention_spots),
                reward: 0.0,
                done: true,
                info: self.build_info(),
            };
        }

        self.time_elapsed += 1;

        // 1) Routing decision: rejected or out-of-range choices are
        //    no-ops, never fatal.
        self.apply_route_choice(action);

        // 2) Advance simulated time. A failed advance ends the episode.
        if self.sim.advance_tick().is_err() {
            self.done = true;
            return StepResult {
                observation: Observation::zeros(self.config.attention_spots),
                reward: 0.0,
                done: true,
                info: self.build_info(),
            };
        }

        // 3) Observe; query failures inside default to zeros.
        let observation = match &self.current_vehicle {
            Some(id) => {
                let id = id.clone();
                self.builder.build(&self.sim, &id, self.time_elapsed)
            }
            None => Observation::zeros(self.config.attention_spots),
        };

        // 4) Reward.
        let mut reward = self.compute_reward();

        // 5) Termination. A vehicle that vanished (arrived or left the
        //    simulation) terminates with zero reward for the final tick.
        let vanished = match &self.current_vehicle {
            Some(id) => self.sim.vehicle_state(id).is_err(),
            None => true,
        };
        if vanished {
            reward = 0.0;
        }
        let arrived = self.sim.arrived_this_tick() > 0;
        let timed_out = self.time_elapsed >= self.config.max_journey_time;
        self.done = arrived || timed_out || vanished;

        StepResult {
            observation,
            reward,
            done: self.done,
            info: self.build_info(),
        }
    }

    /// Explicitly release the simulator session. Called by `reset` and
    /// `Drop`; safe to call repeatedly.
    pub fn close(&mut self) {
        if self.session_active {
            self.sim.stop();
            self.session_active = false;
        }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn time_elapsed(&self) -> Tick {
        self.time_elapsed
    }

    pub fn current_vehicle(&self) -> Option<&VehicleId> {
        self.current_vehicle.as_ref()
    }

    /// Access the underlying simulator (for tests).
    pub fn sim(&self) -> &S {
        &self.sim
    }

    /// Bias the controlled vehicle's remaining route so the chosen
    /// outgoing road is visited next: splice it in right after the
    /// current edge and drop its later occurrence.
    ///
    /// The same action index means different real-world roads at
    /// different positions; the mapping is deliberately positional.
    fn apply_route_choice(&mut self, action: usize) {
        let Some(id) = self.current_vehicle.clone() else {
            return;
        };
        let Ok(vehicle) = self.sim.vehicle_state(&id) else {
            return;
        };

        let options = self.sim.outgoing_roads(&vehicle.current_road);
        let Some(target) = options.get(action).cloned() else {
            return; // action beyond available connections: keep default path
        };

        let Ok(route) = self.sim.vehicle_route(&id) else {
            return;
        };
        // First occurrence of the current edge wins.
        let Some(pos) = route.iter().position(|r| *r == vehicle.current_road) else {
            return;
        };
        let remaining = &route[pos..];

        let mut new_route: Vec<RoadId> = Vec::with_capacity(remaining.len() + 1);
        new_route.push(vehicle.current_road.clone());
        new_route.push(target.clone());
        new_route.extend(
            remaining
                .iter()
                .skip(1)
                .filter(|r| **r != target)
                .cloned(),
        );

        // Simulator rejection (e.g. the splice disconnects the tail)
        // leaves the default path in place.
        let _ = self.sim.set_vehicle_route(&id, &new_route);
    }

    /// Per-tick reward. Never raises: a failed vehicle query yields
    /// whatever was accumulated before the call.
    fn compute_reward(&self) -> f64 {
        let Some(id) = &self.current_vehicle else {
            return 0.0;
        };

        let mut reward = REWARD_BASE;
        if let Ok(v) = self.sim.vehicle_state(id) {
            reward -= v.waiting_time * REWARD_WAIT_PENALTY;
            if v.max_speed > 0.0 {
                reward += (v.speed / v.max_speed) * REWARD_SPEED_BONUS;
            }
            if v.speed == 0.0 && v.waiting_time > STUCK_WAIT_THRESHOLD {
                reward -= STUCK_PENALTY;
            }
        }
        reward
    }

    fn build_info(&self) -> StepInfo {
        StepInfo {
            vehicle_id: self.current_vehicle.clone(),
            elapsed_ticks: self.time_elapsed,
            total_travel_time: self.time_elapsed as f64,
        }
    }
}

impl<S: TrafficSim> Drop for Navigator<S> {
    fn drop(&mut self) {
        self.close();
    }
}
