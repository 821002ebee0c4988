//! Standalone server binary.
//!
//! Usage:
//!   cargo run -p game_server -- [--addr 127.0.0.1:40000] [--tick-hz 50] [--config game.json]
//!
//! The server listens for client connections, runs a fixed timestep simulation,
//! and broadcasts snapshots and replication events to connected clients.
//!
//! Console commands:
//!   status         - Show server status
//!   kill <entity>  - Kill a character
//!   quit           - Shutdown server

use std::env;
use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::Context;
use game_server::GameServer;
use game_shared::{arena::Arena, config::GameConfig};
use tokio::sync::mpsc;
use tracing::info;

struct Args {
    config: Option<PathBuf>,
    addr: Option<String>,
    tick_hz: Option<u32>,
}

fn parse_args() -> Args {
    let mut out = Args {
        config: None,
        addr: None,
        tick_hz: None,
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
            "--tick-hz" if i + 1 < args.len() => {
                out.tick_hz = args[i + 1].parse().ok();
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
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
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
    if let Some(hz) = args.tick_hz {
        cfg.engine.tick_hz = hz;
    }
    info!(addr = %cfg.engine.server_addr, tick_hz = cfg.engine.tick_hz, "Starting server");

    let mut server = GameServer::new(cfg.engine.clone(), cfg.character, Arena::default())
        .await
        .context("create server")?;
    let local = server.local_addr()?;
    info!(%local, "Server listening");

    // Set up console input channel.
    let (console_tx, console_rx) = mpsc::channel::<String>(32);
    server.set_console_input(console_rx);

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

    println!("Server ready. Type 'status' for info, 'quit' to exit.");
    println!();

    let tick_interval = std::time::Duration::from_secs_f32(cfg.engine.fixed_dt());
    let mut next_tick = tokio::time::Instant::now();

    while !server.should_quit() {
        match server.try_accept(std::time::Duration::from_millis(1)).await {
            Ok(Some(cid)) => info!(client_id = ?cid, "New client accepted"),
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "Handshake failed"),
        }

        server.step(tick_interval.as_secs_f32()).await?;

        next_tick += tick_interval;
        tokio::time::sleep_until(next_tick).await;
    }
    Ok(())
}
