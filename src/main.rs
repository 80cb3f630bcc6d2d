//! Headless training run against the built-in table.
//!
//! ```bash
//! puck_dqn --episodes 200 --model-dir models --save-every 25
//! RUST_LOG=debug puck_dqn --metrics-db run.sqlite   # per-step SCALAR lines too
//! ```

use std::path::PathBuf;

use clap::Parser;

use puck_dqn::persistence;
use puck_dqn::sim::{DEFAULT_EPISODE_TICKS, PuckTable};
use puck_dqn::{Config, FanOut, LogSink, MetricsSink, Result, SqliteSink, TickDriver, TrainingScheduler};

/// Train a DQN paddle agent on a simulated air-hockey table
#[derive(Parser, Debug)]
#[command(name = "puck_dqn")]
#[command(version)]
#[command(about = "Train a DQN paddle agent on a simulated air-hockey table", long_about = None)]
#[command(after_help = "Set RUST_LOG=debug to include per-step SCALAR lines.")]
struct Args {
    /// JSON config; missing keys use defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Episodes to run
    #[arg(long, default_value_t = 500)]
    episodes: u64,

    /// Resume from and save the model bundle here
    #[arg(long)]
    model_dir: Option<PathBuf>,

    /// Save every n episodes, 0 disables
    #[arg(long, default_value_t = 50)]
    save_every: u64,

    /// Also write metrics to a SQLite file
    #[arg(long)]
    metrics_db: Option<PathBuf>,

    /// Clock length of one episode, in ticks
    #[arg(long, default_value_t = DEFAULT_EPISODE_TICKS)]
    episode_ticks: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = Args::parse();

    let cfg = match &args.config {
        Some(p) => Config::from_json_file(p)?,
        None => Config::default(),
    };

    let mut sink = FanOut::new().with(Box::new(LogSink));
    if let Some(db) = &args.metrics_db {
        sink = sink.with(Box::new(SqliteSink::open(db)?));
    }
    let sinks: Box<dyn MetricsSink> = Box::new(sink);

    let mut scheduler = TrainingScheduler::new(cfg.clone(), sinks)?;
    if let Some(dir) = &args.model_dir {
        if persistence::bundle_exists(dir) {
            let bundle = persistence::load(dir)?;
            scheduler.restore(&bundle)?;
            scheduler.sync_target();
            log::info!("resumed from {}", dir.display());
        } else {
            log::info!("no model bundle in {}, starting fresh", dir.display());
        }
    }

    let env = PuckTable::new(cfg.seed ^ 0xACE, args.episode_ticks);
    let mut driver = TickDriver::new(env, scheduler);

    let mut best = f64::NEG_INFINITY;
    for ep in 1..=args.episodes {
        let summary = driver.run_episode()?;
        best = best.max(summary.total);

        if let Some(dir) = &args.model_dir {
            if args.save_every > 0 && ep % args.save_every == 0 {
                if let Err(e) = driver.scheduler().save(dir) {
                    log::error!("save failed after episode {ep}: {e}");
                }
            }
        }
    }

    let s = driver.scheduler();
    log::info!(
        "done: episodes={} ticks={} train_steps={} epsilon={:.4} best_total={:.2}",
        args.episodes,
        s.context().ticks,
        s.context().train_steps,
        s.epsilon(),
        best
    );
    if let Some(dir) = &args.model_dir {
        s.save(dir)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_no_flags() {
        let args = Args::try_parse_from(["puck_dqn"]).unwrap();
        assert_eq!(args.episodes, 500);
        assert_eq!(args.save_every, 50);
        assert_eq!(args.episode_ticks, DEFAULT_EPISODE_TICKS);
        assert!(args.config.is_none() && args.model_dir.is_none() && args.metrics_db.is_none());
    }

    #[test]
    fn long_flags_are_parsed() {
        let args = Args::try_parse_from([
            "puck_dqn",
            "--episodes",
            "20",
            "--model-dir",
            "models",
            "--save-every",
            "0",
            "--metrics-db",
            "run.sqlite",
            "--episode-ticks",
            "900",
        ])
        .unwrap();
        assert_eq!(args.episodes, 20);
        assert_eq!(args.model_dir, Some(PathBuf::from("models")));
        assert_eq!(args.save_every, 0);
        assert_eq!(args.metrics_db, Some(PathBuf::from("run.sqlite")));
        assert_eq!(args.episode_ticks, 900);
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(Args::try_parse_from(["puck_dqn", "--episodes", "-3"]).is_err());
        assert!(Args::try_parse_from(["puck_dqn", "--save-every"]).is_err());
        assert!(Args::try_parse_from(["puck_dqn", "--bogus", "1"]).is_err());
    }
}
