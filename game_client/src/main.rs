//! Standalone client binary.
//!
//! Usage:
//!   cargo run -p game_client -- [--addr 127.0.0.1:40000] [--name Player] [--render-hz 144] [--config game.json]
//!
//! The client connects to the server, predicts its own character, sends one
//! command per physics tick and applies snapshots and replication events.
//! There is no device layer; the character stands idle unless driven by a
//! scripted input source.
//!
//! Console commands:
//!   status              - Show client status
//!   disconnect | quit   - Leave the server and exit

use std::env;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use game_client::{client::ClientState, input::EdgeDetector, GameClient};
use game_shared::{
    arena::Arena,
    config::GameConfig,
    input::{InputSource, ScriptedInput},
};
use tokio::sync::mpsc;
use tracing::info;

struct Args {
    config: Option<PathBuf>,
    addr: Option<String>,
    name: Option<String>,
    render_hz: Option<u32>,
}

fn parse_args() -> Args {
    let mut out = Args {
        config: None,
        addr: None,
        name: None,
        render_hz: None,
    };
    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" if i + 1 < args.len() => {
                out.config = Some(PathBuf::from(&args[i + 1]));
                i += 2;
            }
            "--addr" if i + 1 < args.len() => {
                out.addr = Some(args[i + 1].clone());
                i += 2;
            }
            "--name" if i + 1 < args.len() => {
                out.name = Some(args[i + 1].clone());
                i += 2;
            }
            "--render-hz" if i + 1 < args.len() => {
                out.render_hz = args[i + 1].parse().ok();
                i += 2;
            }
            _ => i += 1,
        }
    }
    out
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = parse_args();
    let mut cfg = match &args.config {
        Some(path) => GameConfig::load(path)?,
        None => GameConfig::default(),
    };
    if let Some(addr) = args.addr {
        cfg.engine.server_addr = addr;
    }
    if let Some(name) = args.name {
        cfg.engine.player_name = name;
    }
    if let Some(hz) = args.render_hz {
        cfg.engine.render_hz = hz;
    }
    info!(server = %cfg.engine.server_addr, name = %cfg.engine.player_name, "Starting client");

    let mut client = GameClient::connect_with(&cfg.engine, cfg.character, Arena::default())
        .await
        .context("connect")?;
    info!(client_id = ?client.client_id, "Connected to server");

    // Set up console input channel.
    let (console_tx, mut console_rx) = mpsc::channel::<String>(32);

    // Spawn stdin reader thread.
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();
        loop {
            print!("] ");
            let _ = stdout.flush();
            let mut line = String::new();
            if stdin.lock().read_line(&mut line).is_err() {
                break;
            }
            let line = line.trim().to_string();
            if !line.is_empty() && console_tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    println!("Client connected. Type 'status' for info, 'quit' to exit.");
    println!();

    let mut input = EdgeDetector::new(ScriptedInput::default());
    let frame_interval = Duration::from_secs_f32(1.0 / cfg.engine.render_hz.max(1) as f32);
    let mut last = tokio::time::Instant::now();
    let mut last_logged_tick = 0;

    loop {
        while let Ok(line) = console_rx.try_recv() {
            for out in client.exec_console(&line) {
                println!("{out}");
            }
        }

        if client.state == ClientState::Disconnected {
            println!("Disconnected from server.");
            break;
        }

        let now = tokio::time::Instant::now();
        let frame_dt = (now - last).as_secs_f32();
        last = now;
        client.frame(&input.sample(), frame_dt).await?;

        if client.tick() >= last_logged_tick + 250 {
            last_logged_tick = client.tick();
            if let Some(snap) = client.snaps.last_snapshot() {
                info!(
                    tick = snap.tick,
                    characters = snap.characters.len(),
                    position = ?client.character().position(),
                    "Snapshot"
                );
            }
        }

        tokio::time::sleep(frame_interval).await;
    }

    Ok(())
}
