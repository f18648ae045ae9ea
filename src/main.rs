use anyhow::{Context, bail};
use chrono::Utc;
use clap::Parser;
use duet::alert::LogAlertSink;
use duet::media::SimulatedMediaDevices;
use duet::notify::LogPushNotifier;
use duet::room::{LoopbackRoomService, RoomCredentials};
use duet::store::InMemorySignalingStore;
use duet::types::call::Participant;
use duet::{CallClient, CallOptions, CallPhase, CallServices, ClientConfig};
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

// Two clients in one process place, answer and end a call over the
// in-memory store and loopback rooms.
//
// Usage:
//   cargo run                                  # audio call alice -> bob
//   cargo run -- --video                       # video call
//   cargo run -- --deny-media                  # callee refuses mic/camera
//   cargo run -- --deny-media --ring-timeout-secs 3

#[derive(Parser)]
#[command(name = "duet")]
#[command(about = "Scripted call between two local clients")]
struct Cli {
    #[arg(long, default_value = "alice")]
    caller: String,

    #[arg(long, default_value = "bob")]
    callee: String,

    #[arg(long)]
    video: bool,

    #[arg(long, default_value_t = 1)]
    app_id: u32,

    #[arg(long, default_value = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef")]
    app_sign: String,

    /// Give up on unanswered calls after this many seconds.
    #[arg(long)]
    ring_timeout_secs: Option<u64>,

    /// Callee refuses microphone/camera access.
    #[arg(long)]
    deny_media: bool,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "{} [{:<5}] [{}] - {}",
                Utc::now().format("%H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();

    let cli = Cli::parse();
    let credentials = RoomCredentials::new(cli.app_id, cli.app_sign.clone());
    let store = Arc::new(InMemorySignalingStore::new());
    let rooms = Arc::new(LoopbackRoomService::new(credentials.clone()));

    let caller_media = SimulatedMediaDevices::new();
    let callee_media = SimulatedMediaDevices::new();
    callee_media.deny_permission(cli.deny_media);

    let services = |media: &SimulatedMediaDevices| CallServices {
        store: store.clone(),
        rooms: rooms.clone(),
        media: Arc::new(media.clone()),
        alerts: Arc::new(LogAlertSink::new()),
        notifier: Some(Arc::new(LogPushNotifier::new())),
    };
    let config = |id: &str| {
        let mut config = ClientConfig::new(Participant::new(id, capitalize(id)), credentials.clone());
        if let Some(secs) = cli.ring_timeout_secs {
            config = config.with_ring_timeout(Duration::from_secs(secs));
        }
        config
    };

    let caller = CallClient::connect(config(&cli.caller), services(&caller_media)).await?;
    let callee = CallClient::connect(config(&cli.callee), services(&callee_media)).await?;
    log_state_changes(&caller);
    log_state_changes(&callee);
    let mut incoming = callee.events().incoming_call.subscribe();

    let options = if cli.video {
        CallOptions::video()
    } else {
        CallOptions::audio()
    };
    let room_id = caller.start_call(callee.user().clone(), options).await?;
    info!("{} dialed {} in room {room_id}", cli.caller, cli.callee);

    let call = tokio::time::timeout(Duration::from_secs(5), incoming.recv())
        .await
        .context("callee never rang")??;
    info!(
        "{} sees an incoming {} call from {}",
        cli.callee, call.call_type, call.caller.name
    );

    if let Err(err) = callee.accept().await {
        error!("{} could not accept: {err}", cli.callee);
        if cli.ring_timeout_secs.is_some() {
            info!("Letting the call ring out");
            wait_for_phase(&caller, CallPhase::Idle, Duration::from_secs(120)).await?;
        } else {
            caller.cancel().await?;
        }
    } else {
        wait_for_phase(&caller, CallPhase::Active, Duration::from_secs(5)).await?;
        info!("Both sides are in room {room_id}");
        tokio::time::sleep(Duration::from_millis(500)).await;
        caller.hang_up().await?;
        wait_for_phase(&callee, CallPhase::Idle, Duration::from_secs(5)).await?;
    }

    caller.shutdown().await?;
    callee.shutdown().await?;
    info!(
        "Done. Live media: caller={}, callee={}",
        caller_media.live(),
        callee_media.live()
    );
    Ok(())
}

/// Logs every state change of `client` as one JSON line.
fn log_state_changes(client: &CallClient) {
    let user_id = client.user().id.clone();
    let mut changes = client.events().state_changed.subscribe();
    tokio::spawn(async move {
        loop {
            match changes.recv().await {
                Ok(change) => match serde_json::to_string(&*change) {
                    Ok(line) => info!(target: "duet::activity", "{user_id} {line}"),
                    Err(err) => warn!("Could not serialize state change for {user_id}: {err}"),
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Activity log for {user_id} skipped {skipped} state changes");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

async fn wait_for_phase(
    client: &CallClient,
    phase: CallPhase,
    limit: Duration,
) -> Result<(), anyhow::Error> {
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        let snapshot = client.snapshot().await?;
        if snapshot.phase == phase {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            bail!(
                "{} stuck in {} waiting for {phase}",
                client.user().id,
                snapshot.phase
            );
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

fn capitalize(id: &str) -> String {
    let mut chars = id.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
