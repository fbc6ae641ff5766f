// src/sim.rs
//
// Boundary to the external traffic micro-simulator.
// - TrafficSim: the session/query/control contract the environment
//   drives. One exclusive session at a time.
// - SimError:   failure taxonomy for that boundary.
// - RoadNetwork / LocalSim: deterministic in-memory implementation
//   used by tests, the E2E suite, and the CLI harness. A binding to a
//   real micro-simulator plugs in behind the same trait.

use std::collections::{BTreeMap, HashMap};
use std::error::Error;
use std::fmt;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::types::{RoadId, RoadSnapshot, VehicleId, VehicleSnapshot};

/// Errors surfaced by the simulator boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimError {
    /// `start` was called while a session is already active.
    SessionAlreadyActive,
    /// Session start failed for a simulator-specific reason.
    SessionStart(String),
    /// A query or control call was issued with no active session.
    NoSession,
    /// The vehicle has left the simulation (or never existed).
    VehicleNotFound(VehicleId),
    /// Unknown road identifier.
    UnknownRoad(RoadId),
    /// The simulator refused a route mutation (e.g. disconnected route).
    RouteRejected,
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimError::SessionAlreadyActive => write!(f, "a simulator session is already active"),
            SimError::SessionStart(reason) => write!(f, "session start failed: {reason}"),
            SimError::NoSession => write!(f, "no active simulator session"),
            SimError::VehicleNotFound(id) => write!(f, "vehicle not found: {id}"),
            SimError::UnknownRoad(id) => write!(f, "unknown road: {id}"),
            SimError::RouteRejected => write!(f, "route mutation rejected"),
        }
    }
}

impl Error for SimError {}

/// Options passed to `start`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionOptions {
    /// Run without the interactive display.
    pub headless: bool,
    /// Randomize initial traffic (routes and departures).
    pub randomize_traffic: bool,
    /// Seed for traffic randomization.
    pub seed: u64,
    /// Number of vehicles to spawn.
    pub vehicle_count: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            headless: true,
            randomize_traffic: true,
            seed: 0,
            vehicle_count: 20,
        }
    }
}

/// Contract between the environment and the traffic simulator.
///
/// The simulator runs one exclusive session at a time; the owner must
/// `stop` before a new `start`. `stop` is idempotent.
pub trait TrafficSim {
    /// Start a session. Fails if one is already active.
    fn start(&mut self, options: &SessionOptions) -> Result<(), SimError>;

    /// Advance simulated time by one tick.
    fn advance_tick(&mut self) -> Result<(), SimError>;

    /// Ids of vehicles currently in the simulation, in spawn order.
    /// Empty when no session is active.
    fn active_vehicle_ids(&self) -> Vec<VehicleId>;

    /// State of one vehicle. `VehicleNotFound` once it has arrived.
    fn vehicle_state(&self, id: &str) -> Result<VehicleSnapshot, SimError>;

    /// Occupancy of one road.
    fn road_state(&self, road: &str) -> Result<RoadSnapshot, SimError>;

    /// Roads reachable from the end of `road`, in network order.
    fn outgoing_roads(&self, road: &str) -> Vec<RoadId>;

    /// Roads feeding into the start of `road`, in network order.
    fn incoming_roads(&self, road: &str) -> Vec<RoadId>;

    /// The vehicle's full current route (past and remaining edges).
    fn vehicle_route(&self, id: &str) -> Result<Vec<RoadId>, SimError>;

    /// Replace the vehicle's remaining route. The simulator may reject
    /// routes violating its invariants (disconnected, wrong head).
    fn set_vehicle_route(&mut self, id: &str, route: &[RoadId]) -> Result<(), SimError>;

    /// Number of vehicles that arrived during the last tick.
    fn arrived_this_tick(&self) -> usize;

    /// End the session. Idempotent.
    fn stop(&mut self);
}

// ---------------------------------------------------------------------------
// Road network
// ---------------------------------------------------------------------------

/// One directed road (edge) between two junctions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoadDef {
    pub id: RoadId,
    pub from: String,
    pub to: String,
    pub length: f64,
}

/// Static directed street network shared by a `LocalSim` session.
#[derive(Debug, Clone, Default)]
pub struct RoadNetwork {
    roads: Vec<RoadDef>,
    index: HashMap<RoadId, usize>,
}

impl RoadNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a directed road. Insertion order defines network order for
    /// `outgoing`/`incoming` listings.
    pub fn add_road(&mut self, id: &str, from: &str, to: &str, length: f64) {
        self.index.insert(id.to_string(), self.roads.len());
        self.roads.push(RoadDef {
            id: id.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            length,
        });
    }

    pub fn road(&self, id: &str) -> Option<&RoadDef> {
        self.index.get(id).map(|i| &self.roads[*i])
    }

    pub fn road_ids(&self) -> Vec<RoadId> {
        self.roads.iter().map(|r| r.id.clone()).collect()
    }

    /// Roads whose start junction is this road's end junction.
    pub fn outgoing(&self, id: &str) -> Vec<RoadId> {
        match self.road(id) {
            Some(road) => self
                .roads
                .iter()
                .filter(|r| r.from == road.to)
                .map(|r| r.id.clone())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Roads whose end junction is this road's start junction.
    pub fn incoming(&self, id: &str) -> Vec<RoadId> {
        match self.road(id) {
            Some(road) => self
                .roads
                .iter()
                .filter(|r| r.to == road.from)
                .map(|r| r.id.clone())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Whether `b` directly follows `a`.
    pub fn connected(&self, a: &str, b: &str) -> bool {
        match (self.road(a), self.road(b)) {
            (Some(ra), Some(rb)) => ra.to == rb.from,
            _ => false,
        }
    }

    /// Rectangular grid of junctions with one road per direction on
    /// every adjacent pair (the fallback map shape).
    pub fn grid(rows: usize, cols: usize, length: f64) -> Self {
        let mut net = Self::new();
        let node = |r: usize, c: usize| format!("n{r}_{c}");
        for r in 0..rows {
            for c in 0..cols {
                if c + 1 < cols {
                    let (a, b) = (node(r, c), node(r, c + 1));
                    net.add_road(&format!("e{a}_{b}"), &a, &b, length);
                    net.add_road(&format!("e{b}_{a}"), &b, &a, length);
                }
                if r + 1 < rows {
                    let (a, b) = (node(r, c), node(r + 1, c));
                    net.add_road(&format!("e{a}_{b}"), &a, &b, length);
                    net.add_road(&format!("e{b}_{a}"), &b, &a, length);
                }
            }
        }
        net
    }

    /// Three-road directed cycle `ab -> bc -> ca`, for tests.
    pub fn triangle(length: f64) -> Self {
        let mut net = Self::new();
        net.add_road("ab", "a", "b", length);
        net.add_road("bc", "b", "c", length);
        net.add_road("ca", "c", "a", length);
        net
    }
}

// ---------------------------------------------------------------------------
// LocalSim
// ---------------------------------------------------------------------------

/// Congestion coupling: a density of 1/SLOWDOWN_SPACING vehicles per
/// meter saturates a road.
const SLOWDOWN_SPACING: f64 = 12.0;

/// Speeds below this count as waiting (m/s).
const WAITING_SPEED: f64 = 0.1;

/// Maximum speeds assigned round-robin-by-rng to spawned vehicles
/// (passenger, light commercial, heavy, two-wheeler).
const VEHICLE_MAX_SPEEDS: [f64; 4] = [13.89, 11.1, 8.3, 16.7];

#[derive(Debug, Clone)]
struct SimVehicle {
    route: Vec<RoadId>,
    /// Index of the current route leg.
    leg: usize,
    /// Distance traveled along the current leg (meters).
    progress: f64,
    speed: f64,
    max_speed: f64,
    waiting_time: f64,
    arrived: bool,
}

/// Deterministic in-memory traffic simulator.
///
/// Vehicles follow fixed routes; per-tick speed degrades with the
/// density of the occupied road, waiting time accumulates while a
/// vehicle is effectively stopped, and a vehicle arrives when it runs
/// off the end of its route. Fully deterministic given the session
/// seed: randomness is only used at spawn time.
pub struct LocalSim {
    network: RoadNetwork,
    active: bool,
    vehicles: BTreeMap<VehicleId, SimVehicle>,
    spawn_order: Vec<VehicleId>,
    arrived_this_tick: usize,
}

impl LocalSim {
    pub fn new(network: RoadNetwork) -> Self {
        Self {
            network,
            active: false,
            vehicles: BTreeMap::new(),
            spawn_order: Vec::new(),
            arrived_this_tick: 0,
        }
    }

    pub fn network(&self) -> &RoadNetwork {
        &self.network
    }

    fn vehicle(&self, id: &str) -> Result<&SimVehicle, SimError> {
        match self.vehicles.get(id) {
            Some(v) if !v.arrived => Ok(v),
            _ => Err(SimError::VehicleNotFound(id.to_string())),
        }
    }

    fn current_road_of(v: &SimVehicle) -> &RoadId {
        &v.route[v.leg]
    }

    fn count_on_road(&self, road: &str) -> usize {
        self.vehicles
            .values()
            .filter(|v| !v.arrived && Self::current_road_of(v) == road)
            .count()
    }

    /// Spawn vehicles on random roads with random-walk routes.
    fn spawn_vehicles(&mut self, options: &SessionOptions) {
        // A non-randomized session still needs traffic; it just always
        // uses the same layout.
        let seed = if options.randomize_traffic {
            options.seed
        } else {
            0
        };
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let roads = self.network.road_ids();
        if roads.is_empty() {
            return;
        }

        for i in 0..options.vehicle_count {
            let id = format!("veh{i}");
            let mut tail = roads[rng.gen_range(0..roads.len())].clone();
            let legs = rng.gen_range(4..=8);

            let mut route = vec![tail.clone()];
            for _ in 1..legs {
                let next_options = self.network.outgoing(&tail);
                if next_options.is_empty() {
                    break;
                }
                tail = next_options[rng.gen_range(0..next_options.len())].clone();
                route.push(tail.clone());
            }

            let max_speed = VEHICLE_MAX_SPEEDS[rng.gen_range(0..VEHICLE_MAX_SPEEDS.len())];
            self.vehicles.insert(
                id.clone(),
                SimVehicle {
                    route,
                    leg: 0,
                    progress: 0.0,
                    speed: 0.0,
                    max_speed,
                    waiting_time: 0.0,
                    arrived: false,
                },
            );
            self.spawn_order.push(id);
        }
    }
}

impl TrafficSim for LocalSim {
    fn start(&mut self, options: &SessionOptions) -> Result<(), SimError> {
        if self.active {
            return Err(SimError::SessionAlreadyActive);
        }
        if self.network.road_ids().is_empty() {
            return Err(SimError::SessionStart("empty road network".to_string()));
        }
        self.vehicles.clear();
        self.spawn_order.clear();
        self.arrived_this_tick = 0;
        self.spawn_vehicles(options);
        self.active = true;
        Ok(())
    }

    fn advance_tick(&mut self) -> Result<(), SimError> {
        if !self.active {
            return Err(SimError::NoSession);
        }
        self.arrived_this_tick = 0;

        // Densities are sampled at tick start so update order does not
        // leak into the dynamics.
        let mut density: HashMap<RoadId, f64> = HashMap::new();
        for road in self.network.road_ids() {
            let count = self.count_on_road(&road) as f64;
            let length = self.network.road(&road).map(|r| r.length).unwrap_or(0.0);
            let d = if length > 0.0 { count / length } else { 0.0 };
            density.insert(road, d);
        }

        let order = self.spawn_order.clone();
        for id in order {
            let Some(v) = self.vehicles.get_mut(&id) else {
                continue;
            };
            if v.arrived {
                continue;
            }

            let road = v.route[v.leg].clone();
            let d = density.get(&road).copied().unwrap_or(0.0);
            let congestion = (d * SLOWDOWN_SPACING).min(1.0);
            v.speed = v.max_speed * (1.0 - congestion);

            if v.speed < WAITING_SPEED {
                v.speed = 0.0;
                v.waiting_time += 1.0;
            } else {
                v.waiting_time = 0.0;
            }

            // dt = 1 second per tick.
            v.progress += v.speed;
            let mut length = self.network.road(&road).map(|r| r.length).unwrap_or(0.0);
            while length > 0.0 && v.progress >= length {
                v.progress -= length;
                v.leg += 1;
                if v.leg >= v.route.len() {
                    v.arrived = true;
                    self.arrived_this_tick += 1;
                    break;
                }
                length = self
                    .network
                    .road(&v.route[v.leg])
                    .map(|r| r.length)
                    .unwrap_or(0.0);
            }
        }
        Ok(())
    }

    fn active_vehicle_ids(&self) -> Vec<VehicleId> {
        if !self.active {
            return Vec::new();
        }
        self.spawn_order
            .iter()
            .filter(|id| self.vehicles.get(*id).is_some_and(|v| !v.arrived))
            .cloned()
            .collect()
    }

    fn vehicle_state(&self, id: &str) -> Result<VehicleSnapshot, SimError> {
        let v = self.vehicle(id)?;
        Ok(VehicleSnapshot {
            current_road: Self::current_road_of(v).clone(),
            speed: v.speed,
            max_speed: v.max_speed,
            waiting_time: v.waiting_time,
        })
    }

    fn road_state(&self, road: &str) -> Result<RoadSnapshot, SimError> {
        let def = self
            .network
            .road(road)
            .ok_or_else(|| SimError::UnknownRoad(road.to_string()))?;
        Ok(RoadSnapshot {
            vehicle_count: self.count_on_road(road),
            length: def.length,
        })
    }

    fn outgoing_roads(&self, road: &str) -> Vec<RoadId> {
        self.network.outgoing(road)
    }

    fn incoming_roads(&self, road: &str) -> Vec<RoadId> {
        self.network.incoming(road)
    }

    fn vehicle_route(&self, id: &str) -> Result<Vec<RoadId>, SimError> {
        Ok(self.vehicle(id)?.route.clone())
    }

    fn set_vehicle_route(&mut self, id: &str, route: &[RoadId]) -> Result<(), SimError> {
        // Validate against a shared borrow before mutating.
        let current = {
            let v = self.vehicle(id)?;
            Self::current_road_of(v).clone()
        };

        if route.is_empty() || route[0] != current {
            return Err(SimError::RouteRejected);
        }
        for pair in route.windows(2) {
            if !self.network.connected(&pair[0], &pair[1]) {
                return Err(SimError::RouteRejected);
            }
        }

        if let Some(v) = self.vehicles.get_mut(id) {
            v.route = route.to_vec();
            v.leg = 0;
        }
        Ok(())
    }

    fn arrived_this_tick(&self) -> usize {
        self.arrived_this_tick
    }

    fn stop(&mut self) {
        self.active = false;
        self.vehicles.clear();
        self.spawn_order.clear();
        self.arrived_this_tick = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started(seed: u64, count: usize) -> LocalSim {
        let mut sim = LocalSim::new(RoadNetwork::triangle(200.0));
        sim.start(&SessionOptions {
            seed,
            vehicle_count: count,
            ..SessionOptions::default()
        })
        .unwrap();
        sim
    }

    #[test]
    fn test_start_is_exclusive() {
        let mut sim = started(1, 3);
        let err = sim.start(&SessionOptions::default()).unwrap_err();
        assert_eq!(err, SimError::SessionAlreadyActive);

        // stop releases the session; a new start succeeds.
        sim.stop();
        sim.stop(); // idempotent
        assert!(sim.start(&SessionOptions::default()).is_ok());
    }

    #[test]
    fn test_queries_require_session() {
        let mut sim = LocalSim::new(RoadNetwork::triangle(200.0));
        assert_eq!(sim.advance_tick().unwrap_err(), SimError::NoSession);
        assert!(sim.active_vehicle_ids().is_empty());
    }

    #[test]
    fn test_spawn_is_deterministic_per_seed() {
        let a = started(42, 5);
        let b = started(42, 5);
        let c = started(43, 5);

        for id in a.active_vehicle_ids() {
            assert_eq!(a.vehicle_route(&id).unwrap(), b.vehicle_route(&id).unwrap());
        }
        let differs = a
            .active_vehicle_ids()
            .iter()
            .any(|id| a.vehicle_route(id).unwrap() != c.vehicle_route(id).unwrap());
        assert!(differs, "different seeds should lay out different traffic");
    }

    #[test]
    fn test_tick_advances_and_vehicles_arrive() {
        let mut sim = started(7, 4);
        let mut total_arrived = 0;
        for _ in 0..2_000 {
            sim.advance_tick().unwrap();
            total_arrived += sim.arrived_this_tick();
        }
        assert_eq!(total_arrived, 4, "all vehicles eventually arrive");
        assert!(sim.active_vehicle_ids().is_empty());
    }

    #[test]
    fn test_arrived_vehicle_queries_fail() {
        let mut sim = started(7, 1);
        let id = sim.active_vehicle_ids()[0].clone();
        for _ in 0..2_000 {
            sim.advance_tick().unwrap();
        }
        assert!(matches!(
            sim.vehicle_state(&id),
            Err(SimError::VehicleNotFound(_))
        ));
    }

    #[test]
    fn test_route_mutation_validates_connectivity() {
        let mut sim = started(3, 1);
        let id = sim.active_vehicle_ids()[0].clone();
        let current = sim.vehicle_state(&id).unwrap().current_road;
        let next = sim.outgoing_roads(&current)[0].clone();

        // Valid: current followed by its successor.
        sim.set_vehicle_route(&id, &[current.clone(), next.clone()])
            .unwrap();
        assert_eq!(sim.vehicle_route(&id).unwrap(), vec![current.clone(), next]);

        // Wrong head is rejected.
        let other: RoadId = sim
            .network()
            .road_ids()
            .into_iter()
            .find(|r| *r != current)
            .unwrap();
        assert_eq!(
            sim.set_vehicle_route(&id, &[other.clone()]),
            Err(SimError::RouteRejected)
        );

        // Disconnected tail is rejected. In the triangle, a road never
        // connects to itself.
        assert_eq!(
            sim.set_vehicle_route(&id, &[current.clone(), current.clone()]),
            Err(SimError::RouteRejected)
        );
    }

    #[test]
    fn test_road_state_counts_vehicles() {
        let sim = started(11, 6);
        let total: usize = sim
            .network()
            .road_ids()
            .iter()
            .map(|r| sim.road_state(r).unwrap().vehicle_count)
            .sum();
        assert_eq!(total, 6);
        assert!(matches!(
            sim.road_state("nope"),
            Err(SimError::UnknownRoad(_))
        ));
    }

    #[test]
    fn test_grid_network_connectivity() {
        let net = RoadNetwork::grid(3, 3, 100.0);
        // Every road has at least one continuation in a grid with
        // both-direction edges.
        for road in net.road_ids() {
            assert!(!net.outgoing(&road).is_empty(), "dead end at {road}");
        }
        // 2*(rows*(cols-1) + cols*(rows-1)) directed roads.
        assert_eq!(net.road_ids().len(), 2 * (3 * 2 + 3 * 2));
    }

    #[test]
    fn test_congested_vehicle_waits() {
        // Tiny road, many vehicles: everyone is jammed and waits.
        let mut net = RoadNetwork::new();
        net.add_road("ab", "a", "b", 10.0);
        net.add_road("ba", "b", "a", 10.0);
        let mut sim = LocalSim::new(net);
        sim.start(&SessionOptions {
            seed: 5,
            vehicle_count: 12,
            ..SessionOptions::default()
        })
        .unwrap();

        for _ in 0..5 {
            sim.advance_tick().unwrap();
        }
        let jammed = sim
            .active_vehicle_ids()
            .iter()
            .any(|id| sim.vehicle_state(id).unwrap().waiting_time > 0.0);
        assert!(jammed, "an overfull road should produce waiting vehicles");
    }
}
