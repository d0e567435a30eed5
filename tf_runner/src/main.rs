//! Trivia fleet CLI runner.
//!
//! Fields a fleet of bot players against a game URL and reports the
//! aggregated outcome. This binary drives the scripted in-memory game
//! harness; deployments embed the library and wire in a real browser
//! driver behind the same interface.

use std::sync::Arc;

use anyhow::{Context, Error};
use ctrlc::set_handler;
use log::{info, warn};
use pico_args::Arguments;
use trivia_fleet::{
    behavior::BehaviorModel,
    config::{FleetConfig, FleetOverrides},
    driver::sim::{SimDriverFactory, SimScript},
    persistence::{PgSessionSink, SessionSink},
    recap::SummaryRecap,
    roster::{GeneratedRoster, JsonRoster, RosterSource},
    session::SessionCoordinator,
};

const HELP: &str = "\
Run a fleet of trivia bots against a live game

USAGE:
  tf_runner [OPTIONS]

OPTIONS:
  --url            URL    Target game URL            [default: env TRIVIA_GAME_URL]
  --players        N      Number of bots to field    [default: env FLEET_MAX_PLAYERS or 20]
  --max-concurrent N      Concurrent agent ceiling   [default: env FLEET_MAX_CONCURRENT or 10]
  --roster         FILE   JSON roster file           [default: generated profiles]
  --questions      N      Questions in the scripted harness game  [default: 10]

FLAGS:
  -h, --help              Print help information

ENVIRONMENT:
  TRIVIA_GAME_URL          Default game URL
  FLEET_MAX_PLAYERS        Default number of bots
  FLEET_MAX_CONCURRENT     Default concurrency ceiling
  FLEET_HEADLESS           Run browsers headless (default: true)
  FLEET_STAGGER_MIN_MS     Minimum stagger between launches
  FLEET_STAGGER_MAX_MS     Maximum stagger between launches
  DATABASE_URL             Enables the Postgres result sink when set
  (See .env file for all configuration options)
";

struct Args {
    url: Option<String>,
    players: Option<usize>,
    max_concurrent: Option<usize>,
    roster: Option<String>,
    questions: usize,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let args = Args {
        url: pargs.opt_value_from_str("--url")?,
        players: pargs.opt_value_from_str("--players")?,
        max_concurrent: pargs.opt_value_from_str("--max-concurrent")?,
        roster: pargs.opt_value_from_str("--roster")?,
        questions: pargs.opt_value_from_str("--questions")?.unwrap_or(10),
    };

    // Catching signals for exit.
    set_handler(|| std::process::exit(130))?;

    env_logger::builder().format_target(false).init();

    let config = FleetConfig::from_env(FleetOverrides {
        game_url: args.url,
        max_players: args.players,
        max_concurrent: args.max_concurrent,
    })
    .context("invalid fleet configuration")?;

    info!(
        "fielding {} bots against {} (max {} concurrent)",
        config.max_players, config.game_url, config.max_concurrent
    );

    let roster = match &args.roster {
        Some(path) => JsonRoster::new(path)
            .load_profiles(config.max_players, None)
            .context("failed to load roster")?,
        None => GeneratedRoster.load_profiles(config.max_players, None)?,
    };
    if roster.is_empty() {
        anyhow::bail!("roster is empty");
    }

    let sink: Option<Arc<dyn SessionSink>> = match &config.database_url {
        Some(url) => match PgSessionSink::connect(url).await {
            Ok(sink) => {
                info!("result sink connected");
                Some(Arc::new(sink))
            }
            Err(e) => {
                warn!("result sink unavailable, continuing without: {e}");
                None
            }
        },
        None => None,
    };

    info!("using the scripted game harness ({} questions)", args.questions);
    let factory = Arc::new(SimDriverFactory::new(SimScript::quick_game(args.questions)));

    let coordinator = SessionCoordinator::new(
        &config.game_url,
        roster,
        Arc::new(BehaviorModel::new()),
        factory,
        config.agent_options(),
        config.pool_options(),
        sink,
        Some(Arc::new(SummaryRecap)),
    );

    coordinator.initialize().await?;
    let outcome = coordinator.start().await?;
    coordinator.cleanup().await;

    info!(
        "done: {} completed, {} failed, {}/{} answers correct",
        outcome.agents_completed,
        outcome.agents_failed,
        outcome.correct_answers,
        outcome.questions_answered
    );
    Ok(())
}
