//! Bot-only Farkle matches.
//!
//! Usage: cargo run --bin simulate -- --matches 20 --players 3 --welfare
//!
//! Each match runs on its own actor; the history of every finished match is
//! printed as one JSON line.

use anyhow::Context;
use clap::Parser;
use farkle_engine::{Match, MatchConfig, Outbound, Player, Registry, ServiceConfig};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "simulate")]
#[command(about = "Play bot-only Farkle matches and print their histories")]
struct Args {
    #[arg(short, long, default_value_t = 10)]
    matches: u64,

    #[arg(short, long, default_value_t = 2, value_parser = clap::value_parser!(u8).range(2..=8))]
    players: u8,

    /// Base seed; match n plays with seed + n
    #[arg(short, long, default_value_t = 0x5EED)]
    seed: u64,

    /// Match rules as JSON; the flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    goal: Option<u32>,

    #[arg(long)]
    opening: Option<u32>,

    #[arg(long)]
    high_stakes: bool,

    #[arg(long)]
    welfare: bool,

    #[arg(long)]
    last_turn: bool,

    /// Delay before each bot move
    #[arg(long, default_value_t = 0)]
    pace_ms: u64,

    #[arg(long, default_value = "warn")]
    log_level: tracing::Level,
}

impl Args {
    fn match_config(&self) -> anyhow::Result<MatchConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
                serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?
            }
            None => MatchConfig::default(),
        };
        if let Some(goal) = self.goal {
            config.points_goal = goal;
        }
        if let Some(opening) = self.opening {
            config.opening_threshold = opening;
        }
        config.high_stakes |= self.high_stakes;
        config.welfare |= self.welfare;
        config.last_turn |= self.last_turn;
        if config.points_goal == 0 {
            anyhow::bail!("points goal must be positive");
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt().with_max_level(args.log_level).with_writer(std::io::stderr).init();

    let config = args.match_config()?;
    let service = ServiceConfig {
        bot_delay: Duration::from_millis(args.pace_ms),
        ..ServiceConfig::from_env()
    };
    let registry = Registry::new(service);
    info!(matches = args.matches, players = args.players, ?config, "simulating");

    let mut runs = Vec::new();
    for n in 0..args.matches {
        let players = (1..=args.players).map(|i| Player::bot(format!("bot-{i}"), format!("Bot {i}"))).collect();
        let game = Match::seeded(n + 1, config.clone(), players, args.seed.wrapping_add(n));
        let mut rx = registry.spawn_match(game);
        runs.push(tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if let Outbound::Finished(history) = message {
                    return Some(history);
                }
            }
            None
        }));
    }

    let mut wins = std::collections::BTreeMap::<String, u32>::new();
    for run in runs {
        let history = run.await?.context("match stopped without a winner")?;
        *wins.entry(history.winner.clone()).or_default() += 1;
        println!("{}", history.to_json()?);
    }
    info!(?wins, "done");
    Ok(())
}
