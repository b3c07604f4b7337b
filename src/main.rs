//! Vector Pinball headless runner
//!
//! Plays a table with a seeded random agent on the flippers. With `--rl` the
//! harness settings are forced and score lines go to the `rl_task` log target.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use vector_pinball::Settings;
use vector_pinball::audio::{AudioPlayer, LogAudio, SilentAudio};
use vector_pinball::persistence::{JsonFilePreferences, MemoryPreferences, Preferences};
use vector_pinball::rl::{LogRlTask, NoopRlTask, RlTask};
use vector_pinball::session::{GameSession, SessionConfig};
use vector_pinball::settings::RlOverrides;
use vector_pinball::sim::BuiltinLayouts;

/// How often the agent picks new flipper states
const AGENT_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Parser)]
#[command(name = "vector-pinball")]
#[command(about = "Run a pinball table headless with a random flipper agent", long_about = None)]
struct Cli {
    /// Table to play (1-based)
    #[arg(long)]
    level: Option<u32>,

    /// Wall-clock seconds to run
    #[arg(long, default_value_t = 30.0)]
    duration: f64,

    /// Seed for the agent and ball launches
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Chance per agent step that a flipper is held
    #[arg(long, default_value_t = 0.3)]
    flip_chance: f64,

    /// Emit RL harness lines and force the harness settings
    #[arg(long)]
    rl: bool,

    /// Settings file (JSON)
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Preferences file (JSON), kept in memory when omitted
    #[arg(long)]
    prefs: Option<PathBuf>,

    /// Start a new game whenever one ends
    #[arg(long)]
    restart: bool,

    /// Never run out of balls
    #[arg(long)]
    unlimited: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> vector_pinball::Result<()> {
    let mut settings = cli
        .settings
        .as_deref()
        .map(Settings::load)
        .unwrap_or_default();
    if cli.rl {
        settings.apply_rl_overrides(&RlOverrides {
            level: cli.level.unwrap_or(1),
            ..RlOverrides::default()
        });
    }
    if cli.unlimited {
        settings.unlimited_balls = true;
    }

    let audio: Arc<dyn AudioPlayer> = if settings.sound || settings.music {
        Arc::new(LogAudio::new(settings.sound, settings.music))
    } else {
        Arc::new(SilentAudio)
    };
    let rl: Arc<dyn RlTask> = if cli.rl {
        Arc::new(LogRlTask)
    } else {
        Arc::new(NoopRlTask)
    };
    let prefs: Box<dyn Preferences> = match &cli.prefs {
        Some(path) => Box::new(JsonFilePreferences::open(path)),
        None => Box::new(MemoryPreferences::default()),
    };
    let config = SessionConfig {
        seed: cli.seed,
        level: cli.level,
        ..SessionConfig::default()
    };

    let mut session = GameSession::new(
        settings,
        Box::new(BuiltinLayouts),
        prefs,
        audio,
        Arc::clone(&rl),
        config,
    )?;
    log::info!(
        "Playing table {} for {:.1}s (seed {})",
        session.level(),
        cli.duration,
        cli.seed
    );

    let flip_chance = cli.flip_chance.clamp(0.0, 1.0);
    let mut agent = Pcg32::seed_from_u64(cli.seed);
    let started = Instant::now();
    let deadline = started + Duration::from_secs_f64(cli.duration.max(0.0));

    session.start_game(started)?;
    let mut games = 1u32;

    while Instant::now() < deadline {
        let now = Instant::now();
        for event in session.poll(now) {
            log::debug!("{:?}", event);
        }

        if session.is_game_in_progress() {
            let left = agent.random_bool(flip_chance);
            let right = agent.random_bool(flip_chance);
            session.view().set_flippers_active(left, right);
        } else if cli.restart {
            // Refused until the end-of-game delay has passed
            if session.start_game(now)? {
                games += 1;
            }
        } else {
            break;
        }

        thread::sleep(AGENT_INTERVAL);
    }

    session.poll(Instant::now());
    let score = session.score();
    rl.log_json_extra(serde_json::json!({
        "games": games,
        "level": session.level(),
        "score": score,
    }));
    session.shutdown();

    log::info!("Finished {} game(s), last score {}", games, score);
    Ok(())
}
