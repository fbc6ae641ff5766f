//! Routewise trains routing agents against a street-network traffic
//! simulation. An episode ("day") controls one vehicle: each tick the
//! agent picks which outgoing road to visit next, the simulator
//! advances, and the environment pays a shaped reward for smooth
//! progress.
//!
//! Two agent flavors share the [`agent::Agent`] contract: a tabular
//! Q-learner over discretized observations and an experience-replay
//! learner with a target network. [`trainer::TrainingLoop`] drives
//! either against [`env::Navigator`], which wraps any
//! [`sim::TrafficSim`] implementation.

pub mod agent;
pub mod config;
pub mod env;
pub mod logging;
pub mod observation;
pub mod sim;
pub mod trainer;
pub mod types;

pub use agent::{Agent, QNetwork, ReplayAgent, TabularAgent};
pub use config::{CityConfig, CityPreset, LearnerConfig, ThinkerConfig};
pub use env::{Navigator, StepInfo, StepResult};
pub use logging::{EventSink, FileSink, NoopSink};
pub use observation::{Observation, ObservationBuilder};
pub use sim::{LocalSim, RoadNetwork, SessionOptions, SimError, TrafficSim};
pub use trainer::TrainingLoop;
pub use types::{RoadId, Tick, TrainingRecord, Transition, VehicleId};
