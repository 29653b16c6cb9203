// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/squadpulse

//! SquadPulse - Team Heart-Rate Monitoring
//!
//! Headless console for the wearables core: a coach runs a monitoring
//! session, a specialist reviews the saved roster, an athlete pairs their
//! own devices.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use squadpulse::db::{self, RosterPersistence};
use squadpulse::sensors;
use squadpulse::views::{self, PersonalPanel, Role, RoleSource, SessionRole, Vendor};
use squadpulse::{AthleteConfig, Config, Engine, TeamRow, ViewMode, VERSION};

/// SquadPulse - Team Heart-Rate Monitoring
#[derive(Parser, Debug)]
#[command(name = "squadpulse")]
#[command(author = "SquadPulse Project")]
#[command(version = VERSION)]
#[command(about = "Live heart-rate zones for the whole squad")]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable trace-level logging
    #[arg(long)]
    trace: bool,

    /// Demo mode with simulated players
    #[arg(long)]
    demo: bool,

    /// Role for this session (coach, athlete, specialist)
    #[arg(long)]
    role: Option<String>,

    /// Data output directory
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Stop after this many seconds instead of waiting for Ctrl+C
    #[arg(long)]
    duration_secs: Option<u64>,

    /// Roster layout (list, team, comparison)
    #[arg(long, default_value = "list")]
    view: String,

    /// Athlete role: pair only this vendor's device (polar, garmin, oura, whoop)
    #[arg(long)]
    vendor: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Load or create configuration
    let config_path = args.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load_or_create(&config_path)?;

    // Initialize logging
    let log_level = if args.trace {
        Level::TRACE
    } else if args.debug {
        Level::DEBUG
    } else {
        config.log_level.parse().unwrap_or(Level::INFO)
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(args.debug)
        .with_line_number(args.debug)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("{} v{} - Team Heart-Rate Monitoring", config.app_name, VERSION);

    // Override with command line args
    if args.demo {
        config.demo_mode = true;
    }
    if let Some(data_dir) = args.data_dir.as_deref() {
        config.relocate_data(data_dir);
    }
    if let Some(role) = args.role.as_deref() {
        views::set_session_role(role);
    }

    let role = SessionRole::new(config.role).role();
    let mode = match args.view.to_ascii_lowercase().as_str() {
        "team" => ViewMode::Team,
        "comparison" => ViewMode::Comparison,
        _ => ViewMode::List,
    };
    let duration = args.duration_secs.map(Duration::from_secs);

    info!("Configuration loaded from {:?}", config_path);
    info!("Role: {}, demo mode: {}", role, config.demo_mode);

    let rt = tokio::runtime::Runtime::new()?;
    match role {
        Role::Coach => rt.block_on(run_coach(config, mode, duration)),
        Role::Specialist => run_specialist(&config, mode),
        Role::Athlete => {
            let vendors = match args.vendor.as_deref() {
                Some(name) => match Vendor::parse(name) {
                    Some(vendor) => vec![vendor],
                    None => anyhow::bail!("Unknown vendor '{}'", name),
                },
                None => Vendor::ALL.to_vec(),
            };
            rt.block_on(run_athlete(config, vendors, duration))
        }
    }
}

/// Coach: live monitoring session over the whole roster
async fn run_coach(config: Config, mode: ViewMode, duration: Option<Duration>) -> Result<()> {
    let demo = config.demo_mode;
    let engine = Engine::open(config).await?;
    info!("Restored {} players", engine.players().len());

    if demo && engine.players().is_empty() {
        for (name, nick, sensor) in [
            ("Alice", "Al", "H10-A1"),
            ("Boris", "Bo", "H10-B2"),
            ("Chen", "", "H9-C3"),
        ] {
            let mut player = AthleteConfig::new(name).with_sensor_id(sensor);
            if !nick.is_empty() {
                player = player.with_nickname(nick);
            }
            if let Err(e) = engine.add_player(player).await {
                warn!("Could not add demo player {}: {}", name, e);
            }
        }
    } else {
        for player in engine.players() {
            if let Err(e) = engine.reconnect(&player.id).await {
                warn!("Could not reconnect {}: {}", player.name, e);
            }
        }
    }

    engine.start_session()?;
    info!("Session running - press Ctrl+C to end");

    let mut report = tokio::time::interval(Duration::from_secs(10));
    let stop = wait_for_stop(duration);
    tokio::pin!(stop);
    loop {
        tokio::select! {
            _ = &mut stop => break,
            _ = report.tick() => {
                let summary = engine.summary();
                info!(
                    "{} players, {} connected, {} ticks",
                    summary.athletes, summary.connected, summary.ticks
                );
            }
        }
    }

    engine.end_session().await;
    print_rows(&engine.team_rows(), mode);
    info!("SquadPulse shutdown complete");
    Ok(())
}

/// Specialist: read-only look at the last saved roster
fn run_specialist(config: &Config, mode: ViewMode) -> Result<()> {
    let store = db::open_store(&config.storage)?;
    let persistence = RosterPersistence::new(store, config.storage.roster_key.clone());
    let rows = views::specialist_rows(&persistence, config.roster.default_max_hr);
    info!("Loaded {} players from {:?}", rows.len(), config.storage.path);
    print_rows(&rows, mode);
    Ok(())
}

/// Athlete: pair personal devices and watch their readings
async fn run_athlete(config: Config, vendors: Vec<Vendor>, duration: Option<Duration>) -> Result<()> {
    let panel = PersonalPanel::new(sensors::stream_factory(&config.devices).await?);

    for vendor in vendors {
        if let Err(e) = panel.connect(vendor).await {
            warn!("{}: {}", vendor, e);
        }
    }

    wait_for_stop(duration).await;

    for card in panel.cards() {
        let bpm = card.last_bpm.map(|b| b.to_string()).unwrap_or_else(|| "--".to_string());
        println!("{:<8} {:<32} {} bpm", card.vendor, card.status, bpm);
    }
    panel.disconnect_all().await;
    Ok(())
}

async fn wait_for_stop(duration: Option<Duration>) {
    match duration {
        Some(limit) => {
            tokio::select! {
                _ = tokio::time::sleep(limit) => {}
                _ = tokio::signal::ctrl_c() => {}
            }
        }
        None => {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Ctrl+C handler unavailable: {}", e);
            }
        }
    }
    info!("Shutdown signal received, cleaning up...");
}

fn print_rows(rows: &[TeamRow], mode: ViewMode) {
    if rows.is_empty() {
        println!("No players yet.");
        return;
    }
    if mode == ViewMode::Comparison {
        println!("Comparison is not available yet.");
        return;
    }
    for line in rows.iter().filter_map(|row| row.render(mode)) {
        println!("{}", line);
    }
}
