//! Networking primitives.
//!
//! Goals:
//! - Provide a simple reliable (TCP) and unreliable (UDP) channel.
//! - Continuous state (positions, velocities, view angles) travels in
//!   unreliable snapshots; discrete changes (weapon switch, damage, death,
//!   hit effects) travel as reliable [`ReplicationEvent`]s.
//! - Keep serialization explicit and versionable.

use anyhow::Context;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::{
    net::SocketAddr,
    sync::atomic::{AtomicU32, Ordering},
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream, UdpSocket},
    time,
};

use crate::{
    ecs::EntityId,
    input::{InputButtons, MoveIntent, WeaponInput},
    math::Vec3,
};

/// Protocol version for compatibility checks.
pub const PROTOCOL_VERSION: u32 = 2;

static NEXT_CLIENT_ID: AtomicU32 = AtomicU32::new(1);

/// Identifies a connected client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientId(pub u32);

impl ClientId {
    pub fn new_unique() -> Self {
        ClientId(NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// High-level message envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum NetMsg {
    // ─── Connection handshake ───
    Hello {
        protocol: u32,
        name: String,
    },
    /// Client announces its UDP port to the server.
    UdpHello {
        client_udp_port: u16,
    },
    Welcome {
        client_id: ClientId,
        tick_hz: u32,
    },
    /// Client is ready to receive snapshots; the server spawns its character.
    ClientReady {
        client_id: ClientId,
    },

    // ─── Entity replication ───
    /// Server spawns a character on the client.
    EntitySpawn(EntitySpawn),
    /// Server removes a character.
    EntityDelete {
        id: EntityId,
    },
    /// Discrete gameplay events, sent reliably.
    Replicate(ReplicationEvent),

    // ─── Gameplay ───
    /// Client -> server: input for one physics tick.
    PlayerCommand(PlayerCommand),
    /// Server -> client: continuous character state.
    Snapshot(Snapshot),

    // ─── Console ───
    /// Server -> client: print message to console.
    ServerPrint {
        message: String,
    },

    // ─── Disconnect ───
    Disconnect {
        reason: String,
    },
}

/// Character spawn packet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntitySpawn {
    pub id: EntityId,
    pub owner: ClientId,
    pub classname: String,
    pub position: Vec3,
    /// Additional properties as key-value pairs (player name, ...).
    pub properties: Vec<(String, String)>,
}

impl EntitySpawn {
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Discrete state changes every peer must see exactly once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ReplicationEvent {
    /// The character switched weapons.
    ItemEquipped { entity: EntityId, index: usize },
    /// The character took damage.
    Damaged {
        entity: EntityId,
        amount: f32,
        remaining: f32,
        attacker: Option<EntityId>,
    },
    /// A shot hit something at `point`.
    HitEffect { point: Vec3, normal: Vec3 },
    Died { entity: EntityId },
    Respawned { entity: EntityId, position: Vec3 },
}

/// Client input for one physics tick.
///
/// `buttons` carries RUN and FIRE as held and JUMP and RELOAD as presses
/// since the previous command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerCommand {
    pub client_id: ClientId,
    pub tick: u32,
    /// Local-space wish vector (x right, z forward).
    pub wish: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub buttons: InputButtons,
    pub select_slot: Option<u8>,
    pub scroll: f32,
}

impl PlayerCommand {
    pub fn intent(&self) -> MoveIntent {
        MoveIntent {
            wish: self.wish,
            sprint: self.buttons.contains(InputButtons::RUN),
            jump: self.buttons.contains(InputButtons::JUMP),
            facing_yaw: self.yaw,
        }
    }

    pub fn weapon_input(&self) -> WeaponInput {
        WeaponInput {
            fire: self.buttons.contains(InputButtons::FIRE),
            reload: self.buttons.contains(InputButtons::RELOAD),
            select_slot: self.select_slot,
            scroll: self.scroll,
        }
    }
}

/// Replicated continuous state of one character.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CharacterSnapshot {
    pub id: EntityId,
    pub position: Vec3,
    pub velocity: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub grounded: bool,
    pub item_index: usize,
    pub health: f32,
}

/// World snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    pub tick: u32,
    /// Last command tick the server applied for the receiving client.
    pub ack_tick: Option<u32>,
    pub characters: Vec<CharacterSnapshot>,
}

impl Snapshot {
    pub fn character(&self, id: EntityId) -> Option<&CharacterSnapshot> {
        self.characters.iter().find(|c| c.id == id)
    }
}

/// Reliable connection over TCP with length-prefixed frames.
///
/// Received bytes are kept in an internal buffer until a whole frame is
/// present, so a `recv` dropped mid-frame (e.g. under a timeout) loses nothing.
#[derive(Debug)]
pub struct ReliableConn {
    stream: TcpStream,
    rx: BytesMut,
}

impl ReliableConn {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            rx: BytesMut::with_capacity(4096),
        }
    }

    pub async fn send(&mut self, msg: &NetMsg) -> anyhow::Result<()> {
        let payload = serde_json::to_vec(msg).context("serialize msg")?;
        let mut buf = BytesMut::with_capacity(4 + payload.len());
        buf.put_u32(payload.len() as u32);
        buf.extend_from_slice(&payload);
        self.stream.write_all(&buf).await.context("tcp write")?;
        Ok(())
    }

    pub async fn recv(&mut self) -> anyhow::Result<NetMsg> {
        loop {
            if let Some(msg) = self.take_frame()? {
                return Ok(msg);
            }
            let n = self
                .stream
                .read_buf(&mut self.rx)
                .await
                .context("tcp read")?;
            if n == 0 {
                anyhow::bail!("connection closed by peer");
            }
        }
    }

    fn take_frame(&mut self) -> anyhow::Result<Option<NetMsg>> {
        if self.rx.len() < 4 {
            return Ok(None);
        }
        let len = (&self.rx[..4]).get_u32() as usize;
        if self.rx.len() < 4 + len {
            return Ok(None);
        }
        self.rx.advance(4);
        let payload = self.rx.split_to(len);
        let msg = serde_json::from_slice(&payload).context("deserialize msg")?;
        Ok(Some(msg))
    }

    pub fn peer_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.stream.peer_addr()?)
    }
}

/// Unreliable channel over UDP.
#[derive(Debug)]
pub struct UnreliableConn {
    socket: UdpSocket,
    peer: SocketAddr,
}

impl UnreliableConn {
    pub async fn connect(bind_addr: SocketAddr, peer: SocketAddr) -> anyhow::Result<Self> {
        let socket = UdpSocket::bind(bind_addr).await.context("udp bind")?;
        socket.connect(peer).await.context("udp connect")?;
        Ok(Self { socket, peer })
    }

    pub async fn send(&self, msg: &NetMsg) -> anyhow::Result<()> {
        let payload = serde_json::to_vec(msg).context("serialize udp msg")?;
        self.socket.send(&payload).await.context("udp send")?;
        Ok(())
    }

    pub async fn recv(&self) -> anyhow::Result<NetMsg> {
        let mut buf = vec![0u8; 64 * 1024];
        let n = self.socket.recv(&mut buf).await.context("udp recv")?;
        let msg = serde_json::from_slice(&buf[..n]).context("deserialize udp msg")?;
        Ok(msg)
    }

    /// Receives a datagram if one is already queued.
    pub fn try_recv(&self) -> anyhow::Result<Option<NetMsg>> {
        let mut buf = vec![0u8; 64 * 1024];
        match self.socket.try_recv(&mut buf) {
            Ok(n) => {
                let msg = serde_json::from_slice(&buf[..n]).context("deserialize udp msg")?;
                Ok(Some(msg))
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e).context("udp recv"),
        }
    }

    /// Receives a datagram within the given timeout.
    pub async fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> anyhow::Result<Option<NetMsg>> {
        let mut buf = vec![0u8; 64 * 1024];
        match time::timeout(timeout, self.socket.recv(&mut buf)).await {
            Ok(Ok(n)) => {
                let msg = serde_json::from_slice(&buf[..n]).context("deserialize udp msg")?;
                Ok(Some(msg))
            }
            Ok(Err(e)) => Err(e).context("udp recv")?,
            Err(_) => Ok(None),
        }
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

/// TCP server listener.
pub struct ReliableListener {
    listener: TcpListener,
}

impl ReliableListener {
    pub async fn bind(addr: SocketAddr) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr).await.context("tcp bind")?;
        Ok(Self { listener })
    }

    pub async fn accept(&self) -> anyhow::Result<(ReliableConn, SocketAddr)> {
        let (stream, addr) = self.listener.accept().await.context("tcp accept")?;
        Ok((ReliableConn::new(stream), addr))
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}

/// Convenience codec helpers.
pub fn encode_to_bytes(msg: &NetMsg) -> anyhow::Result<Bytes> {
    let payload = serde_json::to_vec(msg).context("serialize")?;
    Ok(Bytes::from(payload))
}

pub fn decode_from_bytes(b: &[u8]) -> anyhow::Result<NetMsg> {
    serde_json::from_slice(b).context("deserialize")
}
