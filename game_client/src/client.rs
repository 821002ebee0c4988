//! Client implementation.
//!
//! The client maintains:
//! - A reliable control stream (handshake, spawns, replication events)
//! - An unreliable datagram socket (commands out, snapshots in)
//! - A locally predicted character driven at two rates: look, weapons and
//!   footsteps every render frame, movement every fixed physics tick
//! - Reconciliation of the prediction against acknowledged snapshots
//! - Snapshot history for interpolating remote characters

use std::{
    collections::BTreeMap,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use anyhow::Context;
use game_shared::{
    arena::Arena,
    character::{Character, CharacterEvent},
    clock::FixedStep,
    config::{CharacterConfig, EngineConfig},
    ecs::EntityId,
    footsteps::{AudioSink, NullAudio},
    input::{InputLatch, InputSnapshot},
    math::Vec3,
    net::{
        ClientId, EntitySpawn, NetMsg, ReliableConn, ReplicationEvent, Snapshot,
        UnreliableConn, PROTOCOL_VERSION,
    },
    orientation::ViewPose,
    physics::{CollisionQuery, CollisionWorld},
};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::{
    effects::HitEffects,
    input::build_command,
    interp::{RemotePose, SnapshotBuffer},
    predict::Prediction,
};
/// Physics ticks between `ClientReady` resends while waiting for our spawn.
const READY_RESEND_TICKS: u32 = 25;

/// Client connection state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientState {
    /// Not connected to any server.
    Disconnected,
    /// Handshake done, waiting for our character to spawn.
    Connected,
    /// Our character exists; commands are flowing.
    Ready,
}

/// What the client knows about another player.
#[derive(Debug, Clone, PartialEq)]
pub struct RemotePlayer {
    pub owner: ClientId,
    pub name: String,
    pub item_index: usize,
    pub health: f32,
    pub alive: bool,
}

/// High-level game client.
pub struct GameClient {
    pub client_id: ClientId,
    pub state: ClientState,
    pub name: String,

    reliable: ReliableConn,
    pub unreliable: UnreliableConn,
    pub snaps: SnapshotBuffer,

    character: Character,
    entity: Option<EntityId>,
    collision: CollisionWorld,
    clock: FixedStep,
    latch: InputLatch,
    prediction: Prediction,
    tick: u32,
    time: f64,
    idle_ticks: u32,

    audio: Box<dyn AudioSink>,

    /// Other players by entity.
    pub remotes: BTreeMap<EntityId, RemotePlayer>,
    /// Impact markers, dropped once their lifetime runs out.
    pub hit_effects: HitEffects,
    /// Server messages to display.
    pub server_messages: Vec<String>,
}

impl GameClient {
    /// Connects with default character tuning and level.
    pub async fn connect(cfg: &EngineConfig) -> anyhow::Result<Self> {
        Self::connect_with(cfg, CharacterConfig::default(), Arena::default()).await
    }

    /// Connects to a server and performs the handshake.
    pub async fn connect_with(
        cfg: &EngineConfig,
        character_cfg: CharacterConfig,
        arena: Arena,
    ) -> anyhow::Result<Self> {
        let server_addr: SocketAddr = cfg.server_addr.parse().context("parse server_addr")?;

        info!(server = %server_addr, name = %cfg.player_name, "Connecting to server");

        // Bind UDP first so we can tell the server where to send snapshots.
        let bind = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
        let unreliable = UnreliableConn::connect(bind, server_addr).await?;
        let client_udp_port = unreliable.local_addr().context("udp local_addr")?.port();

        let stream = TcpStream::connect(server_addr)
            .await
            .context("tcp connect")?;
        let mut reliable = ReliableConn::new(stream);

        reliable
            .send(&NetMsg::Hello {
                protocol: PROTOCOL_VERSION,
                name: cfg.player_name.clone(),
            })
            .await?;
        reliable.send(&NetMsg::UdpHello { client_udp_port }).await?;

        let (client_id, tick_hz) = match reliable.recv().await? {
            NetMsg::Welcome { client_id, tick_hz } => (client_id, tick_hz),
            NetMsg::Disconnect { reason } => anyhow::bail!("server refused: {reason}"),
            other => anyhow::bail!("expected Welcome, got {other:?}"),
        };

        info!(client_id = ?client_id, tick_hz, "Connected to server");

        let (character_cfg, warnings) = character_cfg.validated();
        for w in &warnings {
            warn!(warning = %w, "Character config corrected");
        }
        let character = Character::new(Arc::new(character_cfg), Vec3::ZERO, None);

        let client = Self {
            client_id,
            state: ClientState::Connected,
            name: cfg.player_name.clone(),
            reliable,
            unreliable,
            snaps: SnapshotBuffer::new(32),
            character,
            entity: None,
            collision: arena.collision,
            clock: FixedStep::from_hz(tick_hz),
            latch: InputLatch::default(),
            prediction: Prediction::new(),
            tick: 0,
            time: 0.0,
            idle_ticks: 0,
            audio: Box::new(NullAudio),
            remotes: BTreeMap::new(),
            hit_effects: HitEffects::default(),
            server_messages: Vec::new(),
        };
        client.send_ready().await?;
        Ok(client)
    }

    /// Replaces the audio collaborator.
    pub fn set_audio(&mut self, audio: Box<dyn AudioSink>) {
        self.audio = audio;
    }

    /// Our character's entity once the server spawned it.
    pub fn entity(&self) -> Option<EntityId> {
        self.entity
    }

    /// The locally predicted character.
    pub fn character(&self) -> &Character {
        &self.character
    }

    /// Command tick that will be sent next.
    pub fn tick(&self) -> u32 {
        self.tick
    }

    /// How many times prediction was replayed from server state.
    pub fn corrections(&self) -> u32 {
        self.prediction.corrections()
    }

    /// Sends a "ready" signal to the server.
    pub async fn send_ready(&self) -> anyhow::Result<()> {
        self.unreliable
            .send(&NetMsg::ClientReady {
                client_id: self.client_id,
            })
            .await?;
        debug!("Sent ready signal to server");
        Ok(())
    }

    /// One render frame: look, weapons and footsteps, then as many physics
    /// ticks as the frame time covers, then network input.
    pub async fn frame(&mut self, input: &InputSnapshot, frame_dt: f32) -> anyhow::Result<ViewPose> {
        self.time += frame_dt.max(0.0) as f64;
        let pose = self.character.render_tick(input, self.time, frame_dt);
        self.latch.record(input);

        let ticks = self.clock.advance(frame_dt);
        for _ in 0..ticks {
            self.physics_tick().await?;
        }

        self.dispatch_events();
        self.hit_effects.expire(self.time);
        self.poll().await?;
        Ok(pose)
    }

    /// One fixed physics tick: predict locally and send the command.
    async fn physics_tick(&mut self) -> anyhow::Result<()> {
        let dt = self.clock.step();
        if self.state != ClientState::Ready {
            self.idle_ticks += 1;
            if self.idle_ticks % READY_RESEND_TICKS == 0 {
                self.send_ready().await?;
            }
            return Ok(());
        }

        let pose = self.character.pose();
        let intent = self.latch.take_intent(pose.body_yaw);
        let weapon = self.latch.take_weapon_input();
        let cmd = build_command(self.client_id, self.tick, &intent, pose, &weapon);
        self.unreliable
            .send(&NetMsg::PlayerCommand(cmd))
            .await?;

        let world: &dyn CollisionQuery = &self.collision;
        self.character.physics_tick(&intent, Some(world), dt);
        self.prediction.record(self.tick, intent, &self.character);
        self.tick += 1;
        Ok(())
    }

    fn dispatch_events(&mut self) {
        for event in self.character.drain_events() {
            match event {
                CharacterEvent::Footsteps(action) => self.audio.footsteps(action),
                CharacterEvent::Fired { .. } => self.audio.one_shot("fire"),
                CharacterEvent::ReloadStarted => self.audio.one_shot("reload"),
                CharacterEvent::Equipped { .. } => self.audio.one_shot("equip"),
                CharacterEvent::Reloaded { .. } => {}
            }
        }
    }

    /// Drains everything the server has sent so far.
    pub async fn poll(&mut self) -> anyhow::Result<()> {
        self.poll_reliable().await?;
        while let Some(msg) = self.unreliable.try_recv()? {
            match msg {
                NetMsg::Snapshot(snap) => self.on_snapshot(snap),
                other => debug!(?other, "Unexpected UDP message"),
            }
        }
        Ok(())
    }

    /// Handles reliable messages already in flight.
    pub async fn poll_reliable(&mut self) -> anyhow::Result<()> {
        loop {
            match tokio::time::timeout(Duration::from_millis(1), self.reliable.recv()).await {
                Ok(Ok(msg)) => self.handle_reliable_message(msg),
                Ok(Err(e)) => {
                    warn!(error = %e, "Reliable connection error");
                    self.state = ClientState::Disconnected;
                    return Ok(());
                }
                Err(_) => return Ok(()),
            }
        }
    }

    /// Waits up to `timeout` for a snapshot and handles it.
    pub async fn recv_snapshot(&mut self, timeout: Duration) -> anyhow::Result<bool> {
        match self.unreliable.recv_timeout(timeout).await? {
            Some(NetMsg::Snapshot(snap)) => {
                self.on_snapshot(snap);
                Ok(true)
            }
            Some(other) => {
                debug!(?other, "Unexpected UDP message");
                Ok(false)
            }
            None => Ok(false),
        }
    }

    fn handle_reliable_message(&mut self, msg: NetMsg) {
        match msg {
            NetMsg::EntitySpawn(spawn) => self.on_spawn(spawn),
            NetMsg::EntityDelete { id } => {
                if let Some(remote) = self.remotes.remove(&id) {
                    info!(entity = ?id, name = %remote.name, "Player left");
                }
            }
            NetMsg::Replicate(event) => self.on_replication(event),
            NetMsg::ServerPrint { message } => {
                info!(message = %message, "Server message");
                self.server_messages.push(message);
            }
            NetMsg::Disconnect { reason } => {
                info!(reason = %reason, "Disconnected from server");
                self.state = ClientState::Disconnected;
            }
            other => {
                debug!(?other, "Unhandled reliable message");
            }
        }
    }

    fn on_spawn(&mut self, spawn: EntitySpawn) {
        let index = spawn
            .property("item_index")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        if spawn.owner == self.client_id {
            info!(entity = ?spawn.id, position = ?spawn.position, "Own character spawned");
            self.entity = Some(spawn.id);
            self.character.respawn(spawn.position);
            let _ = self.character.apply_remote_equip(index);
            self.prediction.clear();
            self.state = ClientState::Ready;
            return;
        }
        let name = spawn.property("name").unwrap_or("unnamed").to_string();
        debug!(entity = ?spawn.id, name = %name, "Remote character spawned");
        self.remotes.insert(
            spawn.id,
            RemotePlayer {
                owner: spawn.owner,
                name,
                item_index: index,
                health: self.character.health().max,
                alive: true,
            },
        );
    }

    fn on_replication(&mut self, event: ReplicationEvent) {
        let own = |entity: EntityId| Some(entity) == self.entity;
        match event {
            ReplicationEvent::ItemEquipped { entity, index } => {
                if own(entity) {
                    // Already applied when predicted.
                    let _ = self.character.apply_remote_equip(index);
                } else if let Some(remote) = self.remotes.get_mut(&entity) {
                    remote.item_index = index;
                }
            }
            ReplicationEvent::Damaged {
                entity,
                amount,
                remaining,
                ..
            } => {
                if own(entity) {
                    self.character.take_damage(amount);
                    self.audio.one_shot("hurt");
                } else if let Some(remote) = self.remotes.get_mut(&entity) {
                    remote.health = remaining;
                }
            }
            ReplicationEvent::HitEffect { point, normal } => {
                self.audio.one_shot("impact");
                self.hit_effects.spawn(point, normal, self.time);
            }
            ReplicationEvent::Died { entity } => {
                if own(entity) {
                    info!("Killed");
                    self.character.kill();
                    self.prediction.clear();
                } else if let Some(remote) = self.remotes.get_mut(&entity) {
                    remote.alive = false;
                    remote.health = 0.0;
                }
            }
            ReplicationEvent::Respawned { entity, position } => {
                if own(entity) {
                    self.character.respawn(position);
                    self.prediction.clear();
                } else if let Some(remote) = self.remotes.get_mut(&entity) {
                    remote.alive = true;
                    remote.health = self.character.health().max;
                }
            }
        }
    }

    fn on_snapshot(&mut self, snap: Snapshot) {
        let own = self.entity.and_then(|e| snap.character(e)).cloned();
        let ack = snap.ack_tick;
        if !self.snaps.push(snap) {
            return;
        }
        if let (Some(state), Some(ack)) = (own, ack) {
            let world: &dyn CollisionQuery = &self.collision;
            let dt = self.clock.step();
            self.prediction
                .reconcile(&mut self.character, &state, ack, Some(world), dt);
        }
    }

    /// Interpolated pose of a remote character between the two newest
    /// snapshots.
    pub fn remote_pose(&self, entity: EntityId, alpha: f32) -> Option<RemotePose> {
        self.snaps.interp_character(entity, alpha)
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
                    format!("State: {:?}", self.state),
                    format!("Client ID: {:?}", self.client_id),
                    format!("Entity: {:?}", self.entity),
                    format!("Tick: {}", self.tick),
                    format!("Position: {:?}", self.character.position()),
                    format!("Health: {}", self.character.health().current),
                    format!("Snapshots buffered: {}", self.snaps.len()),
                    format!("Corrections: {}", self.prediction.corrections()),
                    format!("Hit effects: {}", self.hit_effects.len()),
                ];
                let alpha = self.clock.alpha();
                for (id, remote) in &self.remotes {
                    let position = self.remote_pose(*id, alpha).map(|p| p.position);
                    out.push(format!(
                        "  {:?} {}: health={} item={} position={:?}",
                        id, remote.name, remote.health, remote.item_index, position
                    ));
                }
                out
            }
            "disconnect" | "quit" | "exit" => {
                self.state = ClientState::Disconnected;
                vec!["Disconnected".to_string()]
            }
            other => vec![format!("Unknown command: {other}")],
        }
    }

    /// Returns the underlying reliable connection peer.
    pub fn server_peer(&self) -> anyhow::Result<SocketAddr> {
        self.reliable.peer_addr()
    }
}
