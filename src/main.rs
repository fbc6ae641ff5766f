// src/main.rs
//
// CLI harness: train one or both agent flavors on a preset city and
// save their learned state under the output directory.

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, ValueEnum};

use routewise::{
    Agent, CityConfig, CityPreset, FileSink, LearnerConfig, LocalSim, Navigator, NoopSink,
    ReplayAgent, TabularAgent, ThinkerConfig, TrainingLoop,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum AssistantKind {
    /// Tabular Q-learning over discretized observations.
    Quick,
    /// Experience-replay learner with a target network.
    Thinker,
    /// Train both, one after the other.
    Both,
}

#[derive(Parser, Debug)]
#[command(name = "routewise", about = "Train routing agents on a simulated city")]
struct Args {
    /// City preset to train on (dense, industrial, grid).
    #[arg(long, default_value = "grid")]
    city: String,

    /// Number of training episodes (simulated days).
    #[arg(long, default_value_t = 100)]
    days: u64,

    /// Which agent flavor to train.
    #[arg(long, value_enum, default_value = "quick")]
    assistant: AssistantKind,

    /// Base seed for reproducible runs.
    #[arg(long)]
    seed: Option<u64>,

    /// Run the simulator without its display.
    #[arg(long)]
    no_gui: bool,

    /// Directory for saved agent state.
    #[arg(long, default_value = "memories")]
    out: PathBuf,

    /// Write per-step JSONL events to this file.
    #[arg(long)]
    step_log: Option<PathBuf>,

    /// List available city presets and exit.
    #[arg(long)]
    list_cities: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.list_cities {
        for preset in CityPreset::all() {
            println!(
                "{:<12} {} ({} vehicles)",
                preset.as_str(),
                preset.description(),
                preset.recommended_vehicles()
            );
        }
        return Ok(());
    }

    let preset = CityPreset::parse(&args.city)
        .ok_or_else(|| anyhow!("unknown city preset '{}' (try --list-cities)", args.city))?;

    let config = CityConfig {
        number_of_cars: preset.recommended_vehicles(),
        show_visuals: !args.no_gui,
        ..CityConfig::default()
    };

    println!(
        "training on '{}' for {} days (seed: {})",
        preset.as_str(),
        args.days,
        args.seed.map_or("random".to_string(), |s| s.to_string())
    );

    std::fs::create_dir_all(&args.out)
        .with_context(|| format!("creating output directory {}", args.out.display()))?;

    if matches!(args.assistant, AssistantKind::Quick | AssistantKind::Both) {
        let mut agent = TabularAgent::new(
            &LearnerConfig::default(),
            config.decision_options,
            args.seed.unwrap_or(0),
        );
        train_one(&args, preset, &config, &mut agent, "quick_learner")?;
        println!(
            "quick learner: {} situations learned",
            agent.known_situations()
        );
    }

    if matches!(args.assistant, AssistantKind::Thinker | AssistantKind::Both) {
        let mut agent = ReplayAgent::new(
            &ThinkerConfig::default(),
            config.attention_spots,
            config.decision_options,
            args.seed.unwrap_or(0),
        );
        train_one(&args, preset, &config, &mut agent, "deep_thinker")?;
    }

    Ok(())
}

fn train_one(
    args: &Args,
    preset: CityPreset,
    config: &CityConfig,
    agent: &mut dyn Agent,
    name: &str,
) -> Result<()> {
    let sim = LocalSim::new(preset.network());
    let mut env = Navigator::new(sim, config.clone());
    let schedule = TrainingLoop::new(args.days).with_seed(args.seed);

    let history = match &args.step_log {
        Some(path) => {
            let mut sink = FileSink::create(path)
                .with_context(|| format!("creating step log {}", path.display()))?;
            schedule.run(&mut env, agent, &mut sink)
        }
        None => schedule.run(&mut env, agent, &mut NoopSink),
    };

    let base = args.out.join(format!("{}_{}", name, preset.as_str()));
    agent
        .save(&base)
        .with_context(|| format!("saving {} state under {}", name, base.display()))?;

    let total: f64 = history.iter().map(|r| r.total_reward).sum();
    println!(
        "{name}: {} episodes, mean reward {:.2}, final exploration {:.3}",
        history.len(),
        total / history.len().max(1) as f64,
        agent.exploration_rate()
    );
    Ok(())
}
