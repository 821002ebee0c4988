//! Server implementation.
//!
//! An authoritative fixed-step loop around [`Simulation`]. It supports:
//! - Client handshake over TCP (protocol check, player name, UDP port)
//! - Console commands (status, kill, quit)
//! - One character per ready client
//! - Unreliable snapshots and reliable replication events
//!
//! Determinism notes:
//! - Keep simulation in a fixed timestep.
//! - Avoid wall-clock-dependent branching in gameplay code.
//! - Use stable ordering when iterating collections.

use std::{
    collections::BTreeMap,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use anyhow::Context;
use game_shared::{
    arena::Arena,
    config::{CharacterConfig, EngineConfig},
    ecs::EntityId,
    net::{
        ClientId, NetMsg, PlayerCommand, ReliableConn, ReliableListener, Snapshot,
        PROTOCOL_VERSION,
    },
};
use rand::{rngs::StdRng, SeedableRng};
use tokio::{net::UdpSocket, sync::mpsc, time::Instant};
use tracing::{debug, info, warn};

use crate::sim::Simulation;

/// Connected client state.
struct ClientState {
    name: String,
    reliable: ReliableConn,
    udp_peer: SocketAddr,
    /// Entity of this client's character once it is ready.
    character: Option<EntityId>,
}

/// Game server.
pub struct GameServer {
    pub cfg: EngineConfig,
    sim: Simulation,
    clients: BTreeMap<ClientId, ClientState>,

    tcp: ReliableListener,
    udp: UdpSocket,

    tick: u32,
    quit: bool,

    /// Channel for console commands from stdin.
    console_rx: Option<mpsc::Receiver<String>>,
}

impl GameServer {
    /// Binds sockets at `cfg.server_addr` and builds the simulation.
    pub async fn new(
        cfg: EngineConfig,
        character_cfg: CharacterConfig,
        arena: Arena,
    ) -> anyhow::Result<Self> {
        let addr: SocketAddr = cfg.server_addr.parse().context("parse server_addr")?;
        let tcp = ReliableListener::bind(addr).await?;
        let udp = UdpSocket::bind(addr).await.context("udp bind")?;
        Ok(Self::from_parts(
            cfg,
            character_cfg,
            arena,
            tcp,
            udp,
            StdRng::from_entropy(),
        ))
    }

    fn from_parts(
        cfg: EngineConfig,
        character_cfg: CharacterConfig,
        arena: Arena,
        tcp: ReliableListener,
        udp: UdpSocket,
        rng: StdRng,
    ) -> Self {
        let (character_cfg, warnings) = character_cfg.validated();
        for w in &warnings {
            warn!(warning = %w, "Character config corrected");
        }
        let sim = Simulation::new(&cfg, Arc::new(character_cfg), arena, rng);
        Self {
            cfg,
            sim,
            clients: BTreeMap::new(),
            tcp,
            udp,
            tick: 0,
            quit: false,
            console_rx: None,
        }
    }

    /// Sets the console input receiver.
    pub fn set_console_input(&mut self, rx: mpsc::Receiver<String>) {
        self.console_rx = Some(rx);
    }

    /// Returns the local address (after binding).
    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        self.tcp.local_addr()
    }

    pub fn sim(&self) -> &Simulation {
        &self.sim
    }

    pub fn tick(&self) -> u32 {
        self.tick
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Set by the `quit` console command.
    pub fn should_quit(&self) -> bool {
        self.quit
    }

    /// Character entity of a ready client.
    pub fn character_of(&self, client_id: ClientId) -> Option<EntityId> {
        self.clients.get(&client_id).and_then(|c| c.character)
    }

    /// Accepts exactly one client (blocks until the handshake completes).
    pub async fn accept_one(&mut self) -> anyhow::Result<ClientId> {
        let (conn, peer) = self.tcp.accept().await?;
        self.handle_new_connection(conn, peer).await
    }

    /// Accepts a client with timeout (non-blocking).
    pub async fn try_accept(&mut self, timeout: Duration) -> anyhow::Result<Option<ClientId>> {
        match tokio::time::timeout(timeout, self.tcp.accept()).await {
            Ok(Ok((conn, peer))) => self.handle_new_connection(conn, peer).await.map(Some),
            Ok(Err(e)) => Err(e),
            Err(_) => Ok(None),
        }
    }

    async fn handle_new_connection(
        &mut self,
        mut conn: ReliableConn,
        peer: SocketAddr,
    ) -> anyhow::Result<ClientId> {
        let msg = conn.recv().await?;
        let name = match msg {
            NetMsg::Hello { protocol, name } if protocol == PROTOCOL_VERSION => name,
            NetMsg::Hello { protocol, .. } => {
                let reason =
                    format!("protocol {protocol} unsupported, server speaks {PROTOCOL_VERSION}");
                conn.send(&NetMsg::Disconnect {
                    reason: reason.clone(),
                })
                .await?;
                anyhow::bail!(reason);
            }
            other => anyhow::bail!("unexpected handshake msg: {other:?}"),
        };

        let client_udp_port = match conn.recv().await? {
            NetMsg::UdpHello { client_udp_port } => client_udp_port,
            other => anyhow::bail!("expected UdpHello, got {other:?}"),
        };

        let id = ClientId::new_unique();
        conn.send(&NetMsg::Welcome {
            client_id: id,
            tick_hz: self.cfg.tick_hz,
        })
        .await?;

        let udp_peer = SocketAddr::new(peer.ip(), client_udp_port);
        self.clients.insert(
            id,
            ClientState {
                name: name.clone(),
                reliable: conn,
                udp_peer,
                character: None,
            },
        );

        info!(client_id = ?id, name = %name, %udp_peer, "Client connected");
        Ok(id)
    }

    /// Spawns the client's character and introduces everyone to each other.
    pub async fn client_ready(&mut self, client_id: ClientId) -> anyhow::Result<EntityId> {
        let client = self.clients.get(&client_id).context("client not found")?;
        if let Some(existing) = client.character {
            return Ok(existing);
        }
        let name = client.name.clone();

        let entity = self.sim.spawn_player(client_id, &name);
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.character = Some(entity);
        }
        info!(client_id = ?client_id, entity = ?entity, "Client ready, character spawned");

        // The newcomer learns about every character, including its own.
        let spawns = self.sim.spawn_messages();
        if let Some(client) = self.clients.get_mut(&client_id) {
            for spawn in spawns {
                client.reliable.send(&NetMsg::EntitySpawn(spawn)).await?;
            }
        }

        if let Some(spawn) = self.sim.spawn_message(entity) {
            self.broadcast_except(client_id, &NetMsg::EntitySpawn(spawn))
                .await;
        }
        self.broadcast_except(
            client_id,
            &NetMsg::ServerPrint {
                message: format!("{name} joined"),
            },
        )
        .await;
        Ok(entity)
    }

    /// Drops a client and its character.
    pub async fn disconnect(&mut self, client_id: ClientId, reason: &str) {
        self.drop_clients(vec![client_id], reason).await;
    }

    async fn drop_clients(&mut self, mut ids: Vec<ClientId>, reason: &str) {
        while let Some(client_id) = ids.pop() {
            let Some(mut client) = self.clients.remove(&client_id) else {
                continue;
            };
            let _ = client
                .reliable
                .send(&NetMsg::Disconnect {
                    reason: reason.to_string(),
                })
                .await;
            info!(client_id = ?client_id, reason = %reason, "Client disconnected");
            if let Some(entity) = client.character {
                self.sim.remove_player(entity);
                let failed = self
                    .send_to_ready(None, &NetMsg::EntityDelete { id: entity })
                    .await;
                ids.extend(failed);
            }
        }
    }

    /// Runs the server for a number of ticks.
    pub async fn run_for_ticks(&mut self, ticks: u32) -> anyhow::Result<()> {
        let dt = Duration::from_secs_f32(self.cfg.fixed_dt());
        let mut next = Instant::now();

        for _ in 0..ticks {
            next += dt;
            self.step(dt.as_secs_f32()).await?;
            tokio::time::sleep_until(next).await;
        }
        Ok(())
    }

    /// Executes one fixed simulation step.
    pub async fn step(&mut self, dt_sec: f32) -> anyhow::Result<()> {
        self.process_console_commands().await;
        self.recv_commands().await?;
        self.sim.step(dt_sec);
        self.send_replication().await;
        self.send_snapshots().await?;
        self.tick += 1;
        Ok(())
    }

    async fn process_console_commands(&mut self) {
        let lines: Vec<String> = match self.console_rx.as_mut() {
            Some(rx) => std::iter::from_fn(|| rx.try_recv().ok()).collect(),
            None => Vec::new(),
        };
        for line in lines {
            for out in self.exec_console(&line) {
                println!("{out}");
            }
        }
    }

    /// Executes a console command.
    pub fn exec_console(&mut self, line: &str) -> Vec<String> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(&command) = tokens.first() else {
            return Vec::new();
        };

        match command {
            "status" => {
                let mut out = vec![
                    format!("Tick: {}", self.tick),
                    format!("Time: {:.2}s", self.sim.time()),
                    format!("Clients: {}", self.clients.len()),
                ];
                for (id, client) in &self.clients {
                    let health = client
                        .character
                        .and_then(|e| self.sim.character(e))
                        .map(|c| c.health().current);
                    out.push(format!(
                        "  {:?} {}: udp={} entity={:?} health={:?}",
                        id, client.name, client.udp_peer, client.character, health
                    ));
                }
                out
            }
            "kill" => {
                let Some(entity) = tokens.get(1).and_then(|t| t.parse().ok()).map(EntityId)
                else {
                    return vec!["Usage: kill <entity>".to_string()];
                };
                if self.sim.kill(entity) {
                    vec![format!("Killed {entity:?}")]
                } else {
                    vec![format!("No living character {entity:?}")]
                }
            }
            "quit" | "exit" => {
                info!("Server shutting down");
                self.quit = true;
                vec!["Quitting".to_string()]
            }
            other => vec![format!("Unknown command: {other}")],
        }
    }

    async fn recv_commands(&mut self) -> anyhow::Result<()> {
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            match self.udp.try_recv_from(&mut buf) {
                Ok((n, from)) => match serde_json::from_slice::<NetMsg>(&buf[..n]) {
                    Ok(msg) => self.handle_udp_message(from, msg).await,
                    Err(e) => debug!(%from, error = %e, "Undecodable datagram"),
                },
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e).context("udp recv"),
            }
        }
        Ok(())
    }

    async fn handle_udp_message(&mut self, from: SocketAddr, msg: NetMsg) {
        match msg {
            NetMsg::PlayerCommand(cmd) => self.on_command(from, cmd),
            NetMsg::ClientReady { client_id } => {
                if let Err(e) = self.client_ready(client_id).await {
                    warn!(client_id = ?client_id, error = %e, "Failed to mark client ready");
                }
            }
            _ => {
                debug!(?msg, "Unexpected UDP message");
            }
        }
    }

    fn on_command(&mut self, from: SocketAddr, cmd: PlayerCommand) {
        let Some(client) = self.clients.get_mut(&cmd.client_id) else {
            debug!(client_id = ?cmd.client_id, "Command from unknown client");
            return;
        };
        client.udp_peer = from;
        if let Some(entity) = client.character {
            self.sim.queue_command(entity, cmd);
        }
    }

    async fn send_replication(&mut self) {
        for event in self.sim.drain_replication() {
            self.broadcast(&NetMsg::Replicate(event)).await;
        }
    }

    /// Sends a reliable message to every ready client. Clients whose stream
    /// fails are dropped.
    async fn broadcast(&mut self, msg: &NetMsg) {
        let failed = self.send_to_ready(None, msg).await;
        self.drop_clients(failed, "connection lost").await;
    }

    async fn broadcast_except(&mut self, skip: ClientId, msg: &NetMsg) {
        let failed = self.send_to_ready(Some(skip), msg).await;
        self.drop_clients(failed, "connection lost").await;
    }

    /// Returns the clients whose stream failed.
    async fn send_to_ready(&mut self, skip: Option<ClientId>, msg: &NetMsg) -> Vec<ClientId> {
        let mut failed = Vec::new();
        for (id, client) in self.clients.iter_mut() {
            if Some(*id) == skip || client.character.is_none() {
                continue;
            }
            if let Err(e) = client.reliable.send(msg).await {
                warn!(client_id = ?id, error = %e, "Reliable send failed");
                failed.push(*id);
            }
        }
        failed
    }

    async fn send_snapshots(&self) -> anyhow::Result<()> {
        let characters = self.sim.character_snapshots();
        for client in self.clients.values() {
            let Some(entity) = client.character else {
                continue;
            };
            let snap = NetMsg::Snapshot(Snapshot {
                tick: self.tick,
                ack_tick: self.sim.player(entity).and_then(|p| p.last_applied()),
                characters: characters.clone(),
            });
            let payload = serde_json::to_vec(&snap).context("serialize snapshot")?;
            let _ = self.udp.send_to(&payload, client.udp_peer).await;
        }
        Ok(())
    }
}

/// Helper for tests: bind to an ephemeral port.
pub async fn bind_ephemeral(tick_hz: u32) -> anyhow::Result<(GameServer, EngineConfig)> {
    bind_ephemeral_with(tick_hz, CharacterConfig::default(), Arena::default()).await
}

/// Like [`bind_ephemeral`] with explicit tuning and level.
pub async fn bind_ephemeral_with(
    tick_hz: u32,
    character_cfg: CharacterConfig,
    arena: Arena,
) -> anyhow::Result<(GameServer, EngineConfig)> {
    let mut cfg = EngineConfig {
        server_addr: format!("{}:{}", IpAddr::V4(Ipv4Addr::LOCALHOST), 0),
        tick_hz,
        ..Default::default()
    };

    // Bind TCP first to get an ephemeral port, then bind UDP to that same port.
    let tcp = ReliableListener::bind(cfg.server_addr.parse()?).await?;
    let addr = tcp.local_addr()?;
    cfg.server_addr = addr.to_string();

    let udp_bind = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), addr.port());
    let udp = UdpSocket::bind(udp_bind).await?;

    let server = GameServer::from_parts(
        cfg.clone(),
        character_cfg,
        arena,
        tcp,
        udp,
        StdRng::seed_from_u64(0),
    );
    Ok((server, cfg))
}
