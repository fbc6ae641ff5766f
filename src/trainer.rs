// src/trainer.rs
//
// Episode loop driving one agent against one navigator environment.
//
// Per simulated day: reset, act/step/observe until done, then the
// bookkeeping (target sync cadence, history, progress line). The loop
// owns the cadence of target-network syncs; agents only expose the
// interval.

use crate::agent::Agent;
use crate::env::Navigator;
use crate::logging::EventSink;
use crate::sim::TrafficSim;
use crate::types::{TrainingRecord, Transition};

/// How often a progress line is printed (in episodes).
const PROGRESS_EVERY: u64 = 10;

/// A progress line prints on episodes 0, 10, 20, ... so the first
/// reading appears immediately.
fn progress_due(episode: u64) -> bool {
    episode % PROGRESS_EVERY == 0
}

/// Configuration and driver for a training run.
pub struct TrainingLoop {
    episodes: u64,
    /// Base seed; episode `e` resets with `seed.wrapping_add(e)` so
    /// runs are reproducible while episodes still differ. `None` leaves
    /// the environment to pick its own.
    seed: Option<u64>,
    quiet: bool,
}

impl TrainingLoop {
    pub fn new(episodes: u64) -> Self {
        Self {
            episodes,
            seed: None,
            quiet: false,
        }
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }

    /// Run the full training schedule and return the per-episode
    /// history. The environment's session is released before returning.
    pub fn run<S: TrafficSim>(
        &self,
        env: &mut Navigator<S>,
        agent: &mut dyn Agent,
        sink: &mut dyn EventSink,
    ) -> Vec<TrainingRecord> {
        for episode in 0..self.episodes {
            let mut state = env.reset(self.seed.map(|s| s.wrapping_add(episode)));
            let mut total_reward = 0.0;
            let mut steps: u64 = 0;

            loop {
                let action = agent.act(&state);
                let result = env.step(action);

                let transition = Transition {
                    state,
                    action,
                    reward: result.reward,
                    next_state: result.observation.clone(),
                    done: result.done,
                };
                agent.observe(&transition);
                sink.log_step(episode, steps, &transition);

                total_reward += result.reward;
                steps += 1;
                state = result.observation;

                if result.done {
                    break;
                }
            }

            if let Some(interval) = agent.target_sync_interval() {
                if interval > 0 && episode % interval == 0 {
                    agent.update_target_network();
                }
            }

            agent.record_episode(episode, total_reward, steps);

            if !self.quiet && progress_due(episode) {
                println!(
                    "day {:>4}/{} | reward {:>8.2} | steps {:>4} | exploration {:.3}",
                    episode,
                    self.episodes,
                    total_reward,
                    steps,
                    agent.exploration_rate()
                );
            }
        }

        env.close();
        agent.history().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::TabularAgent;
    use crate::config::{CityConfig, LearnerConfig};
    use crate::logging::NoopSink;
    use crate::sim::{LocalSim, RoadNetwork};

    fn short_env() -> Navigator<LocalSim> {
        let sim = LocalSim::new(RoadNetwork::triangle(200.0));
        let config = CityConfig {
            max_journey_time: 8,
            number_of_cars: 3,
            ..CityConfig::default()
        };
        Navigator::new(sim, config)
    }

    #[test]
    fn test_run_produces_one_record_per_episode() {
        let mut env = short_env();
        let mut agent = TabularAgent::new(&LearnerConfig::default(), 4, 1);
        let history = TrainingLoop::new(5)
            .with_seed(Some(100))
            .quiet()
            .run(&mut env, &mut agent, &mut NoopSink);

        assert_eq!(history.len(), 5);
        for (i, record) in history.iter().enumerate() {
            assert_eq!(record.episode, i as u64);
            assert!(record.steps >= 1);
            assert!(record.steps <= 8);
        }
    }

    #[test]
    fn test_exploration_rate_is_non_increasing_across_episodes() {
        let mut env = short_env();
        let mut agent = TabularAgent::new(&LearnerConfig::default(), 4, 1);
        let history = TrainingLoop::new(6)
            .with_seed(Some(7))
            .quiet()
            .run(&mut env, &mut agent, &mut NoopSink);

        for pair in history.windows(2) {
            assert!(pair[1].exploration_rate <= pair[0].exploration_rate);
        }
    }

    #[test]
    fn test_seed_near_max_wraps_instead_of_panicking() {
        let mut env = short_env();
        let mut agent = TabularAgent::new(&LearnerConfig::default(), 4, 1);
        let history = TrainingLoop::new(3)
            .with_seed(Some(u64::MAX))
            .quiet()
            .run(&mut env, &mut agent, &mut NoopSink);
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn test_progress_prints_on_day_zero_and_every_tenth() {
        assert!(progress_due(0));
        assert!(!progress_due(1));
        assert!(!progress_due(9));
        assert!(progress_due(10));
        assert!(!progress_due(11));
        assert!(progress_due(20));
    }

    #[test]
    fn test_seeded_runs_are_reproducible() {
        let run = || {
            let mut env = short_env();
            let mut agent = TabularAgent::new(&LearnerConfig::default(), 4, 9);
            TrainingLoop::new(4)
                .with_seed(Some(55))
                .quiet()
                .run(&mut env, &mut agent, &mut NoopSink)
        };
        assert_eq!(run(), run());
    }
}
