use bridge::{Bridge, Topics, bridge_task, calibration_task};
use config::{BridgeConfig, Mode, PadTransport, SinkKind, TABLE_TICK};
use menu::{Menu, menu_task};
use roster::{NewPlayer, RosterClient};
use session::Session;
use sink::{Registration, print_events_task, watch_table_task};
use source::{Input, keyboard_reader, line_source_task, mqtt_source_task};
use std::{collections::HashMap, sync::LazyLock};
use store::{JsonFileStore, MappingStore, load_or_identity};
use tokio::sync::{
    Mutex, RwLock,
    mpsc::{Sender, channel, unbounded_channel},
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

#[cfg(not(target_os = "windows"))]
use tokio::signal::unix::{SignalKind, signal};

mod bridge;
mod calibration;
mod config;
mod error;
mod frame;
mod keys;
mod mapping;
mod menu;
mod remapper;
mod roster;
mod session;
mod sink;
mod source;
mod store;

pub static TOKENS: LazyLock<RwLock<HashMap<String, CancellationToken>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));
pub static TRACKER: LazyLock<Mutex<TaskTracker>> = LazyLock::new(|| Mutex::new(TaskTracker::new()));

/// Input channel depth; the pad publishes a handful of frames per second
const INPUT_BUFFER: usize = 64;

async fn register_token(name: &str) -> CancellationToken {
    let token = CancellationToken::new();

    TOKENS.write().await.insert(name.to_string(), token.clone());

    token
}

async fn shutdown() {
    let tokens = TOKENS.write().await;

    for (_, token) in tokens.iter() {
        token.cancel();
    }
}

/// Starts the pad transport, plus the stdin keyboard when asked
async fn spawn_sources(config: &BridgeConfig, tx: Sender<Input>, keyboard: bool) {
    let tracker = TRACKER.lock().await.clone();

    let token = register_token("_pad_source").await;
    match &config.transport {
        PadTransport::Mqtt(broker) => {
            tracker.spawn(mqtt_source_task(
                broker.clone(),
                vec![config.topic.clone(), config.visibility_topic()],
                config.reconnect_period,
                tx.clone(),
                token,
            ));
        }
        PadTransport::Lines(addr) => {
            tracker.spawn(line_source_task(
                addr.clone(),
                config.reconnect_period,
                tx.clone(),
                token,
            ));
        }
    }

    // Blocking stdin lives on its own thread so it never holds up runtime shutdown
    if keyboard {
        std::thread::spawn(move || keyboard_reader(std::io::stdin().lock(), tx));
    }
}

fn topics(config: &BridgeConfig) -> Topics {
    Topics {
        pad: config.topic.clone(),
        visibility: config.visibility_topic(),
    }
}

/// Steady state: pads and keyboard into the sink the config asks for
async fn run(config: BridgeConfig, with_menu: bool) -> Result<(), Box<dyn std::error::Error>> {
    let tracker = TRACKER.lock().await.clone();

    let mapping = load_or_identity(&JsonFileStore::new(&config.store_dir));
    let roster = with_menu
        .then(|| RosterClient::new(&config.roster_url))
        .transpose()?;

    let (tx, rx) = channel(INPUT_BUFFER);
    spawn_sources(&config, tx, true).await;

    let registration = if let Some(roster) = roster {
        let (events_tx, events_rx) = unbounded_channel();
        let token = register_token("_menu").await;
        tracker.spawn(menu_task(Menu::default(), events_rx, roster, token));

        Registration::Events(events_tx)
    } else {
        match config.sink {
            SinkKind::Events => {
                // Runs until the bridge drops the sender, no token of its own
                let (events_tx, events_rx) = unbounded_channel();
                tracker.spawn(async move {
                    if let Err(err) = print_events_task(tokio::io::stdout(), events_rx).await {
                        log::error!("Event output failed: {}", err);
                    }
                });

                Registration::Events(events_tx)
            }
            SinkKind::Table => {
                let (registration, table) = Registration::table();
                let token = register_token("_table").await;
                tracker.spawn(watch_table_task(table, TABLE_TICK, token));

                registration
            }
        }
    };

    log::info!("Registered {:?} sink", registration);

    let token = register_token("_bridge").await;
    tracker.spawn(bridge_task(
        Bridge::new(topics(&config), Some(mapping), registration),
        rx,
        token,
    ));

    Ok(())
}

/// `calibrate [game=..&players=a,b&music=..]`, the query the roulette hands over
async fn calibrate(
    config: BridgeConfig,
    query: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let tracker = TRACKER.lock().await.clone();

    let session = Session::from_query(query.as_deref().unwrap_or_default())?;
    log::info!(
        "Calibrating for {} player(s) {:?}, game {:?}, music {:?}",
        session.player_count(),
        session.players,
        session.game,
        session.music
    );

    let (tx, rx) = channel(INPUT_BUFFER);
    spawn_sources(&config, tx, false).await;

    // A signal ends calibration early; the task then fills the unpressed pads and saves
    let token = register_token("_calibration").await;
    let watcher = token.clone();
    tracker.spawn(async move {
        tokio::select! {
            _ = termination() => watcher.cancel(),
            _ = watcher.cancelled() => {},
        }
    });

    let store = JsonFileStore::new(&config.store_dir);
    calibration_task(config.topic.clone(), &store, rx, token).await?;

    Ok(())
}

/// `register <name> [game] [music]`
async fn register(config: &BridgeConfig, args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let name = args.first().map(String::as_str).unwrap_or_default();
    let player = NewPlayer::new(name, args.get(1).cloned(), args.get(2).cloned())?;

    let roster = RosterClient::new(&config.roster_url)?;
    let message = roster.register_player(&player).await?;

    log::info!("{}", message);

    Ok(())
}

#[cfg(any(target_os = "linux", target_os = "macos"))]
async fn sigterm() -> Result<(), Box<dyn std::error::Error>> {
    let mut sig = signal(SignalKind::terminate())?;

    sig.recv().await;

    Ok(())
}

#[cfg(target_os = "windows")]
async fn sigterm() -> Result<(), Box<dyn std::error::Error>> {
    std::future::pending::<()>().await;

    Ok(())
}

async fn termination() {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {},
        _ = sigterm() => {},
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = BridgeConfig::from_env();

    // Logs go to stderr, stdout carries the key events
    simplelog::TermLogger::init(
        config.log_level,
        simplelog::Config::default(),
        simplelog::TerminalMode::Stderr,
        simplelog::ColorChoice::Never,
    )?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let arg = args.first().map(String::as_str);
    let Some(mode) = Mode::from_arg(arg) else {
        log::error!(
            "Unknown mode {:?}, expected run, calibrate, reset, menu or register",
            arg
        );
        return Err("unknown mode".into());
    };

    log::info!("Starting in {:?} mode with {:?}", mode, config);

    match mode {
        Mode::Reset => {
            let store = JsonFileStore::new(&config.store_dir);
            store.reset()?;
            log::info!("Pad mapping in {} reset to identity", store.path().display());
            return Ok(());
        }
        Mode::Register => {
            register(&config, &args[1..]).await?;
            return Ok(());
        }
        Mode::Calibrate => calibrate(config, args.get(1).cloned()).await?,
        Mode::Run => {
            run(config, false).await?;
            termination().await;
        }
        Mode::Menu => {
            run(config, true).await?;
            termination().await;
        }
    }

    log::info!("Shutting down");

    shutdown().await;

    let tracker = TRACKER.lock().await.clone();

    log::info!("Waiting for tasks to finish");

    tracker.close();
    tracker.wait().await;

    log::info!("Tasks are finished, exiting now");

    Ok(())
}
