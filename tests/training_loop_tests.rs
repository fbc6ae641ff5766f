// End-to-end training runs against the in-process simulator.

use routewise::{
    Agent, CityConfig, LearnerConfig, LocalSim, Navigator, NoopSink, ReplayAgent, RoadNetwork,
    TabularAgent, ThinkerConfig, TrainingLoop,
};

fn tiny_city() -> Navigator<LocalSim> {
    let sim = LocalSim::new(RoadNetwork::triangle(200.0));
    let config = CityConfig {
        max_journey_time: 10,
        number_of_cars: 3,
        ..CityConfig::default()
    };
    Navigator::new(sim, config)
}

#[test]
fn tabular_agent_completes_a_short_run() {
    let mut env = tiny_city();
    let mut agent = TabularAgent::new(&LearnerConfig::default(), 2, 11);

    let history = TrainingLoop::new(5)
        .with_seed(Some(1000))
        .quiet()
        .run(&mut env, &mut agent, &mut NoopSink);

    assert_eq!(history.len(), 5);
    for record in &history {
        assert!(record.steps >= 1);
        assert!(record.steps <= 10);
        assert!(record.exploration_rate <= 0.1 + 1e-12);
        assert!(record.exploration_rate >= 0.01);
    }
    for pair in history.windows(2) {
        assert!(pair[1].exploration_rate <= pair[0].exploration_rate);
    }
    // Five terminal decays from the initial 0.1.
    let expected = 0.1 * 0.995_f64.powi(5);
    assert!((agent.exploration_rate() - expected).abs() < 1e-12);
    assert!(agent.known_situations() > 0);
}

#[test]
fn replay_agent_completes_a_short_run() {
    let mut env = tiny_city();
    let config = ThinkerConfig {
        memory_capacity: 64,
        batch_size: 8,
        target_sync_interval: 2,
        ..ThinkerConfig::default()
    };
    let mut agent = ReplayAgent::new(&config, 10, 4, 11);

    let history = TrainingLoop::new(4)
        .with_seed(Some(2000))
        .quiet()
        .run(&mut env, &mut agent, &mut NoopSink);

    assert_eq!(history.len(), 4);
    assert!(agent.memory_len() > 0);
    assert!(agent.memory_len() <= 64);
    assert!(agent.exploration_rate() <= 1.0);
    assert!(agent.exploration_rate() >= 0.01);
}

#[test]
fn seeded_runs_reproduce_their_history() {
    let run = || {
        let mut env = tiny_city();
        let mut agent = TabularAgent::new(&LearnerConfig::default(), 4, 3);
        TrainingLoop::new(6)
            .with_seed(Some(42))
            .quiet()
            .run(&mut env, &mut agent, &mut NoopSink)
    };

    let first = run();
    let second = run();
    assert_eq!(first, second);
}

#[test]
fn saved_tabular_state_survives_a_fresh_process() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("quick_learner_grid");

    let mut env = tiny_city();
    let mut trained = TabularAgent::new(&LearnerConfig::default(), 4, 5);
    TrainingLoop::new(5)
        .with_seed(Some(77))
        .quiet()
        .run(&mut env, &mut trained, &mut NoopSink);
    trained.save(&base).unwrap();

    let mut restored = TabularAgent::new(&LearnerConfig::default(), 4, 5);
    restored.load(&base).unwrap();
    assert_eq!(trained.experience_book(), restored.experience_book());
    assert_eq!(trained.exploration_rate(), restored.exploration_rate());
    assert_eq!(trained.history(), restored.history());
}

#[test]
fn larger_grid_run_stays_within_episode_bounds() {
    let sim = LocalSim::new(RoadNetwork::grid(4, 4, 200.0));
    let config = CityConfig {
        max_journey_time: 15,
        number_of_cars: 10,
        ..CityConfig::default()
    };
    let mut env = Navigator::new(sim, config);
    let mut agent = TabularAgent::new(&LearnerConfig::default(), 4, 21);

    let history = TrainingLoop::new(3)
        .with_seed(Some(9))
        .quiet()
        .run(&mut env, &mut agent, &mut NoopSink);

    for record in &history {
        assert!(record.steps <= 15);
    }
}
