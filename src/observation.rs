// src/observation.rs
//
// Fixed-length observation vector and its builder.
//
// Design requirements:
// - Always exactly `attention_spots` components, zero-padded
// - Serializable (serde) for logging and replay
// - Deterministic discretization for the tabular agent's keys
// - Bounded-but-not-clamped features documented per component

use serde::{Deserialize, Serialize};

use crate::sim::TrafficSim;
use crate::types::Tick;

/// Reference cruise speed used to normalize the speed component (m/s).
/// Roughly 50 km/h; the component can exceed 1.0 above it.
pub const CRUISE_SPEED: f64 = 13.89;

/// Divisor for the waiting-time component. Not a clamp: long waits
/// push the component past 1.0.
pub const WAIT_NORMALIZER: f64 = 100.0;

/// How many connected roads are scanned (outgoing first, then incoming).
pub const NEIGHBOR_SCAN: usize = 8;

/// How many scanned neighbors contribute observation slots.
pub const NEIGHBOR_SLOTS: usize = 4;

/// Fixed-length numeric summary of the controlled vehicle's situation.
///
/// Component layout (defaults, `attention_spots = 10`):
/// - 0:    density of the current road (vehicles / meter, unclamped)
/// - 1..4: densities of up to 4 connected roads, each clamped to 1.0
/// - 5:    speed / [`CRUISE_SPEED`] (unclamped)
/// - 6:    waiting time / [`WAIT_NORMALIZER`] (unclamped)
/// - 7:    elapsed-episode fraction of the journey-time bound
/// - 8..:  zero padding, reserved for future signals
///
/// Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    values: Vec<f64>,
}

impl Observation {
    /// All-zero observation of the given length.
    pub fn zeros(len: usize) -> Self {
        Self {
            values: vec![0.0; len],
        }
    }

    /// Build from raw components, padding or truncating to `len`.
    pub fn from_components(mut values: Vec<f64>, len: usize) -> Self {
        values.resize(len, 0.0);
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Discretized key for the tabular agent.
    ///
    /// Each component is scaled by 10 and truncated toward zero, then
    /// the vector is comma-joined. Observations differing only past
    /// the first decimal place collapse into the same key; that
    /// coarseness trades state-space size for generalization.
    pub fn situation_code(&self) -> String {
        let mut code = String::with_capacity(self.values.len() * 3);
        for (i, v) in self.values.iter().enumerate() {
            if i > 0 {
                code.push(',');
            }
            code.push_str(&((v * 10.0) as i64).to_string());
        }
        code
    }
}

/// Builds an [`Observation`] per tick from simulator queries.
///
/// Every query failure is recovered locally: the affected component
/// defaults to 0 and the vector keeps its fixed length.
#[derive(Debug, Clone)]
pub struct ObservationBuilder {
    attention_spots: usize,
    max_journey_time: u64,
}

impl ObservationBuilder {
    pub fn new(attention_spots: usize, max_journey_time: u64) -> Self {
        Self {
            attention_spots,
            max_journey_time,
        }
    }

    pub fn attention_spots(&self) -> usize {
        self.attention_spots
    }

    /// Build the observation for `vehicle` at `elapsed` ticks into the
    /// episode. A vanished vehicle yields the all-zero observation.
    pub fn build(&self, sim: &dyn TrafficSim, vehicle: &str, elapsed: Tick) -> Observation {
        let mut values = Vec::with_capacity(self.attention_spots);

        if let Ok(v) = sim.vehicle_state(vehicle) {
            // Current-road congestion (unclamped).
            values.push(road_density(sim, &v.current_road));

            // Connected roads: outgoing first, then incoming.
            let mut nearby = sim.outgoing_roads(&v.current_road);
            nearby.extend(sim.incoming_roads(&v.current_road));
            nearby.truncate(NEIGHBOR_SCAN);
            for slot in 0..NEIGHBOR_SLOTS {
                match nearby.get(slot) {
                    Some(road) => values.push(road_density(sim, road).min(1.0)),
                    None => values.push(0.0),
                }
            }

            values.push(v.speed / CRUISE_SPEED);
            values.push(v.waiting_time / WAIT_NORMALIZER);

            values.push(elapsed as f64 / self.max_journey_time as f64);
        }

        Observation::from_components(values, self.attention_spots)
    }
}

/// Vehicles per meter on `road`; 0 when the road is unknown or has
/// zero length.
fn road_density(sim: &dyn TrafficSim, road: &str) -> f64 {
    match sim.road_state(road) {
        Ok(r) if r.length > 0.0 => r.vehicle_count as f64 / r.length,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{LocalSim, RoadNetwork, SessionOptions, TrafficSim};

    #[test]
    fn test_zeros_has_fixed_length() {
        let obs = Observation::zeros(10);
        assert_eq!(obs.len(), 10);
        assert!(obs.values().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_from_components_pads_and_truncates() {
        let obs = Observation::from_components(vec![1.0, 2.0], 4);
        assert_eq!(obs.values(), &[1.0, 2.0, 0.0, 0.0]);

        let obs = Observation::from_components(vec![1.0, 2.0, 3.0], 2);
        assert_eq!(obs.values(), &[1.0, 2.0]);
    }

    #[test]
    fn test_situation_code_is_stable() {
        let obs = Observation::from_components(vec![0.15, 0.27, 1.9], 3);
        assert_eq!(obs.situation_code(), obs.situation_code());
        assert_eq!(obs.situation_code(), "1,2,19");
    }

    #[test]
    fn test_situation_code_collapses_past_first_decimal() {
        let a = Observation::from_components(vec![0.11, 0.52, 0.9], 3);
        let b = Observation::from_components(vec![0.19, 0.55, 0.91], 3);
        assert_eq!(a.situation_code(), b.situation_code());

        // A first-decimal difference produces a different key.
        let c = Observation::from_components(vec![0.21, 0.52, 0.9], 3);
        assert_ne!(a.situation_code(), c.situation_code());
    }

    #[test]
    fn test_situation_code_truncates_toward_zero() {
        let obs = Observation::from_components(vec![-0.19, 0.19], 2);
        assert_eq!(obs.situation_code(), "-1,1");
    }

    #[test]
    fn test_builder_length_and_elapsed_fraction() {
        let mut sim = LocalSim::new(RoadNetwork::triangle(200.0));
        sim.start(&SessionOptions {
            seed: 7,
            vehicle_count: 3,
            ..SessionOptions::default()
        })
        .unwrap();

        let builder = ObservationBuilder::new(10, 500);
        let vehicle = sim.active_vehicle_ids()[0].clone();
        let obs = builder.build(&sim, &vehicle, 250);

        assert_eq!(obs.len(), 10);
        // Elapsed fraction sits at index 7.
        assert!((obs.values()[7] - 0.5).abs() < 1e-12);
        // Padding slots stay zero.
        assert_eq!(obs.values()[8], 0.0);
        assert_eq!(obs.values()[9], 0.0);
    }

    #[test]
    fn test_builder_missing_vehicle_yields_zeros() {
        let sim = LocalSim::new(RoadNetwork::triangle(200.0));
        let builder = ObservationBuilder::new(10, 500);
        let obs = builder.build(&sim, "ghost", 3);
        assert_eq!(obs, Observation::zeros(10));
    }

    #[test]
    fn test_observation_serde_roundtrip() {
        let obs = Observation::from_components(vec![0.1, 0.2, 0.3], 5);
        let json = serde_json::to_string(&obs).unwrap();
        let parsed: Observation = serde_json::from_str(&json).unwrap();
        assert_eq!(obs, parsed);
    }
}
