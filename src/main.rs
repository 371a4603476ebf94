use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Duration, Utc};
use clap::Parser;
use rust_decimal_macros::dec;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

use moonliga::config::Config;
use moonliga::domain::{
    Competition, CompetitionId, CompetitionStatus, League, LeagueId, Symbol, UserId,
};
use moonliga::engine::{CompetitionEngine, Scheduler};
use moonliga::error::{ConfigError, Result};
use moonliga::market::{CoinGeckoSource, MarketCache};
use moonliga::store::{CompetitionStore, LeagueStore, MemoryStore};

/// Fantasy crypto league engine
#[derive(Parser, Debug)]
#[command(name = "moonliga")]
#[command(version)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Run a single scheduler sweep and exit
    #[arg(long)]
    once: bool,

    /// Seed a demo league and competition before starting
    #[arg(long)]
    demo: bool,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            std::process::exit(1);
        }
    };

    config.logging.init();
    info!("moonliga starting");

    let source = Arc::new(CoinGeckoSource::from_config(&config.market));
    let cache = Arc::new(MarketCache::new(source, config.cache.policy()));
    let store = Arc::new(MemoryStore::new());
    let engine = Arc::new(CompetitionEngine::new(
        store.clone(),
        cache.clone(),
        config.rules(),
    ));

    if cli.demo {
        if let Err(e) = seed_demo(store.as_ref(), &engine, config.rules().team_size).await {
            error!(error = %e, "Failed to seed demo data");
            std::process::exit(1);
        }
    }

    let scheduler = Scheduler::new(engine, store, cache, config.scheduler.clone());

    if cli.once {
        let outcome = scheduler.sweep().await;
        info!(
            started = outcome.started,
            ended = outcome.ended,
            failed = outcome.failed,
            "Sweep complete"
        );
        return;
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut handle = tokio::spawn(async move { scheduler.run(shutdown_rx).await });

    tokio::select! {
        result = &mut handle => {
            if let Err(e) = result {
                error!(error = %e, "Scheduler task failed");
                std::process::exit(1);
            }
        }
        _ = signal::ctrl_c() => {
            info!("Shutdown signal received");
            let _ = shutdown_tx.send(true);
            let _ = handle.await;
        }
    }

    info!("moonliga stopped");
}

/// Seed one league with a competition opening in a minute and running for
/// five, so a fresh process demonstrates the full lifecycle quickly.
/// Rosters draw from a fixed catalog of major tokens, which caps the
/// `team_size` the demo can serve.
async fn seed_demo(
    store: &MemoryStore,
    engine: &CompetitionEngine,
    team_size: usize,
) -> Result<()> {
    let majors = [
        "BTC", "ETH", "USDT", "XRP", "BNB", "SOL", "USDC", "DOGE", "ADA", "TRX", "LINK", "AVAX",
        "DOT", "LTC", "BCH", "NEAR", "UNI", "ATOM", "XLM", "ETC", "FIL", "APT", "ARB", "OP",
    ];
    if team_size > majors.len() {
        return Err(ConfigError::InvalidValue {
            field: "competition.team_size",
            reason: format!("must be at most {} for --demo seeding", majors.len()),
        }
        .into());
    }

    let league = League {
        id: LeagueId::new(),
        name: "Demo League".to_string(),
        entry_fee: dec!(10),
        default_prize_pool: dec!(1000),
        max_teams: None,
        created_at: Utc::now(),
    };
    store.create_league(&league).await?;

    let now = Utc::now();
    let competition = Competition {
        id: CompetitionId::new(),
        league_id: league.id.clone(),
        name: "Demo Week".to_string(),
        starts_at: now + Duration::minutes(1),
        ends_at: now + Duration::minutes(6),
        status: CompetitionStatus::Pending,
        prize_pool: None,
        distributed: false,
        created_at: now,
    };
    store.create_competition(&competition).await?;

    for (user, offset) in [("alice", 0), ("bob", 2)] {
        let picks: Vec<Symbol> = majors
            .iter()
            .cycle()
            .skip(offset)
            .take(team_size)
            .copied()
            .map(Symbol::new)
            .collect();
        engine
            .register_team(
                &competition.id,
                UserId::new(user),
                &format!("{user}'s team"),
                picks,
            )
            .await?;
    }

    info!(
        league = %league.name,
        competition = %competition.name,
        starts_at = %competition.starts_at,
        "Demo data seeded"
    );
    Ok(())
}
