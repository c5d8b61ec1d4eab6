//! # Ember Headless Client
//!
//! Connects to a host, joins the running game and logs every remote entity
//! change. Useful for soak-testing a host without a renderer.
//!
//! ## Usage
//!
//! ```bash
//! ember_client --config ember.toml --address 127.0.0.1 --port 4296 --duration 60
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ember_shared::{Envelope, ParticipantId, Tag, TextMessage};
use ember_sync::{
    logging, ChannelObserver, ClientConfig, ConnectionManager, EntityEvent, GameSession,
    InboxSink, MessageRouter, SessionInbox, TcpTransport, TickLoop,
};

const STATUS_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Default)]
struct Args {
    config: Option<PathBuf>,
    address: Option<String>,
    port: Option<u16>,
    tick_rate: Option<u32>,
    duration_secs: Option<u64>,
    participant: Option<ParticipantId>,
}

fn print_help() {
    println!("Usage: ember_client [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -c, --config <FILE>        TOML configuration file");
    println!("  -a, --address <IP>         Host address (default: 127.0.0.1)");
    println!("  -p, --port <PORT>          Host port (default: 4296)");
    println!("  -t, --tick-rate <RATE>     Fixed steps per second (default: 50)");
    println!("  -d, --duration <SECS>      Run for N seconds then exit");
    println!("      --participant <ID>     Local participant id, filtered from spawns");
    println!("  -h, --help                 Show this help");
}

/// Returns `None` if help was requested.
fn parse_args() -> Option<Args> {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = Args::default();

    let mut i = 1;
    while i < args.len() {
        let value = args.get(i + 1);
        match args[i].as_str() {
            "--config" | "-c" => parsed.config = value.map(PathBuf::from),
            "--address" | "-a" => parsed.address = value.cloned(),
            "--port" | "-p" => parsed.port = value.and_then(|v| v.parse().ok()),
            "--tick-rate" | "-t" => parsed.tick_rate = value.and_then(|v| v.parse().ok()),
            "--duration" | "-d" => parsed.duration_secs = value.and_then(|v| v.parse().ok()),
            "--participant" => parsed.participant = value.and_then(|v| v.parse().ok()),
            "--help" | "-h" => {
                print_help();
                return None;
            }
            other => {
                eprintln!("Ignoring unknown argument: {other}");
                i += 1;
                continue;
            }
        }
        i += 2;
    }
    Some(parsed)
}

fn load_config(args: &Args) -> Result<ClientConfig, ember_sync::SyncError> {
    let mut config = match &args.config {
        Some(path) => ClientConfig::load(path)?,
        None => ClientConfig::default(),
    };
    if let Some(address) = &args.address {
        address.clone_into(&mut config.server_address);
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(tick_rate) = args.tick_rate {
        config.tick_rate = tick_rate;
    }
    config.validate()?;
    Ok(config)
}

fn present(event: &EntityEvent) {
    match event {
        EntityEvent::Spawned { id, display_name } => {
            tracing::info!(id, name = %display_name, "entity spawned");
        }
        EntityEvent::Resynced { id, display_name } => {
            tracing::info!(id, name = %display_name, "entity resynced");
        }
        EntityEvent::Despawned { id } => tracing::info!(id, "entity despawned"),
        EntityEvent::StateChanged { id, sim_state } => {
            tracing::trace!(id, position = ?sim_state.position, "entity moved");
        }
        EntityEvent::HealthChanged { id, health } => tracing::info!(id, health, "entity health"),
    }
}

fn print_text(envelope: &Envelope) {
    if envelope.tag != Tag::TEXT {
        tracing::debug!(tag = %envelope.tag, len = envelope.payload.len(), "unhandled message");
        return;
    }
    match envelope.read::<TextMessage>() {
        Ok(message) => tracing::info!(text = %message.text, "text message"),
        Err(e) => tracing::warn!(error = %e, "malformed text message"),
    }
}

fn main() -> ExitCode {
    let Some(args) = parse_args() else {
        return ExitCode::SUCCESS;
    };
    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    logging::init_logging(&config.log_level);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("ember-net")
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "failed to start network runtime");
            return ExitCode::FAILURE;
        }
    };

    let inbox = Arc::new(SessionInbox::new(&config.buffer));
    let manager = Arc::new(ConnectionManager::new(TcpTransport::new(), Arc::clone(&inbox)));

    if runtime
        .block_on(manager.connect(&config.server_address, config.port))
        .is_err()
    {
        // Already logged by the manager
        return ExitCode::FAILURE;
    }
    if let Some(id) = args.participant {
        manager.assign_participant(id);
    }

    let (external_tx, external_rx) = crossbeam_channel::bounded::<Envelope>(64);
    let router = MessageRouter::new(InboxSink::new(Arc::clone(&inbox)).with_external(external_tx));
    let receive_loop = {
        let _guard = runtime.enter();
        match manager.spawn_receive_loop(router) {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!(error = %e, "failed to start receive loop");
                return ExitCode::FAILURE;
            }
        }
    };

    if let Err(e) = manager.request_join() {
        tracing::error!(error = %e, "join request failed");
        return ExitCode::FAILURE;
    }

    let (observer, entity_events) = ChannelObserver::new(256);
    let presenter = std::thread::Builder::new()
        .name("ember-present".to_owned())
        .spawn(move || entity_events.iter().for_each(|event| present(&event)));
    let texts = std::thread::Builder::new()
        .name("ember-text".to_owned())
        .spawn(move || external_rx.iter().for_each(|envelope| print_text(&envelope)));

    let mut session = GameSession::new(inbox, &config.sync, observer);
    let mut tick_loop = TickLoop::new(config.tick_rate);
    let start = Instant::now();
    let mut last_status = Instant::now();

    tracing::info!(
        address = %config.server_address,
        port = config.port,
        tick_rate = config.tick_rate,
        "client running"
    );

    loop {
        if args
            .duration_secs
            .is_some_and(|secs| start.elapsed() >= Duration::from_secs(secs))
        {
            break;
        }
        if !manager.is_connected() {
            break;
        }

        tick_loop.wait_for_next_tick();
        tick_loop.run_due(|| {
            session.fixed_update();
        });

        if last_status.elapsed() >= STATUS_INTERVAL {
            last_status = Instant::now();
            let stats = tick_loop.stats();
            tracing::info!(
                client_tick = session.client_tick(),
                server_tick = session.last_received_server_tick(),
                entities = session.registry().len(),
                avg_step_us = stats.avg_tick_us,
                late_steps = stats.late_ticks,
                "status"
            );
        }
    }

    manager.disconnect();
    // Apply the disconnect policy
    session.fixed_update();

    match runtime.block_on(receive_loop) {
        Ok(stats) => tracing::info!(
            dispatched = stats.dispatched,
            forwarded = stats.forwarded,
            dropped = stats.dropped,
            "session closed"
        ),
        Err(e) => tracing::warn!(error = %e, "receive loop did not finish cleanly"),
    }

    // Dropping the session closes the entity event channel
    drop(session);
    for thread in [presenter, texts].into_iter().flatten() {
        let _ = thread.join();
    }
    ExitCode::SUCCESS
}
