//! Full socket-based integration tests for client ↔ server communication.

use std::time::{Duration, Instant};

use game_client::{client::ClientState, GameClient};
use game_server::server::{bind_ephemeral, bind_ephemeral_with};
use game_shared::{
    arena::Arena,
    config::{CharacterConfig, EngineConfig},
    ecs::EntityId,
    input::{InputButtons, InputSnapshot},
    math::Vec3,
    net::{
        decode_from_bytes, encode_to_bytes, ClientId, NetMsg, PlayerCommand, ReliableConn,
        ReplicationEvent, PROTOCOL_VERSION,
    },
};
use game_tests::{init_tracing, ServerLoop};
use tokio::net::TcpStream;

const TICK_HZ: u32 = 50;
const DT: f32 = 1.0 / TICK_HZ as f32;

fn named(cfg: &EngineConfig, name: &str) -> EngineConfig {
    EngineConfig {
        player_name: name.to_string(),
        ..cfg.clone()
    }
}

/// Unit-style test: protocol messages roundtrip correctly.
#[test]
fn protocol_messages_roundtrip() -> anyhow::Result<()> {
    let hello = NetMsg::Hello {
        protocol: PROTOCOL_VERSION,
        name: "TestPlayer".to_string(),
    };
    assert_eq!(decode_from_bytes(&encode_to_bytes(&hello)?)?, hello);

    let welcome = NetMsg::Welcome {
        client_id: ClientId(1),
        tick_hz: TICK_HZ,
    };
    assert_eq!(decode_from_bytes(&encode_to_bytes(&welcome)?)?, welcome);

    let command = NetMsg::PlayerCommand(PlayerCommand {
        client_id: ClientId(1),
        tick: 12,
        wish: Vec3::FORWARD,
        yaw: 270.0,
        pitch: -10.0,
        buttons: InputButtons::RUN | InputButtons::FIRE,
        select_slot: Some(1),
        scroll: 0.0,
    });
    assert_eq!(decode_from_bytes(&encode_to_bytes(&command)?)?, command);

    let damaged = NetMsg::Replicate(ReplicationEvent::Damaged {
        entity: EntityId(3),
        amount: 25.0,
        remaining: 50.0,
        attacker: None,
    });
    assert_eq!(decode_from_bytes(&encode_to_bytes(&damaged)?)?, damaged);

    assert!(decode_from_bytes(b"{\"NoSuchMessage\":{}}").is_err());
    Ok(())
}

/// A client speaking another protocol version is told why and dropped.
#[tokio::test]
async fn protocol_mismatch_is_refused() -> anyhow::Result<()> {
    init_tracing();
    let (mut server, cfg) = bind_ephemeral(TICK_HZ).await?;
    let accept = tokio::spawn(async move { server.accept_one().await.map(|_| ()) });

    let mut conn = ReliableConn::new(TcpStream::connect(cfg.server_addr.as_str()).await?);
    conn.send(&NetMsg::Hello {
        protocol: PROTOCOL_VERSION + 1,
        name: "old".to_string(),
    })
    .await?;
    match conn.recv().await? {
        NetMsg::Disconnect { reason } => assert!(reason.contains("unsupported"), "{reason}"),
        other => anyhow::bail!("expected Disconnect, got {other:?}"),
    }
    assert!(accept.await?.is_err());
    Ok(())
}

/// Full integration: spawn server, connect client, exchange commands and
/// snapshots, and check the prediction matches the authoritative result.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn client_server_full_roundtrip() -> anyhow::Result<()> {
    const COMMANDS: u32 = 60;
    init_tracing();

    let arena = || Arena::flat(50.0, vec![Vec3::ZERO]);
    let (server, cfg) = bind_ephemeral_with(TICK_HZ, CharacterConfig::default(), arena()).await?;
    let server = ServerLoop::spawn(server, 1, DT, Duration::from_millis(2));

    let mut client = GameClient::connect_with(
        &named(&cfg, "TestPlayer"),
        CharacterConfig::default(),
        arena(),
    )
    .await?;

    let forward = InputSnapshot {
        forward: 1.0,
        ..Default::default()
    };
    let deadline = Instant::now() + Duration::from_secs(10);
    while client.tick() < COMMANDS {
        anyhow::ensure!(Instant::now() < deadline, "client never got to send its commands");
        client.frame(&forward, DT).await?;
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    // Wait until the server has acknowledged the last command.
    while client.snaps.last_snapshot().and_then(|s| s.ack_tick) < Some(COMMANDS - 1) {
        anyhow::ensure!(Instant::now() < deadline, "last command never acknowledged");
        client.recv_snapshot(Duration::from_millis(20)).await?;
    }
    let server = server.stop().await?;

    assert_eq!(client.state, ClientState::Ready);
    let entity = client.entity().expect("own entity");
    assert_eq!(server.character_of(client.client_id), Some(entity));

    let authoritative = server.sim().character(entity).expect("server character");
    let predicted = client.character().position();
    assert!((authoritative.position() - predicted).len() < 1e-3);
    assert!((predicted.z - COMMANDS as f32 * 0.1).abs() < 0.05, "z {}", predicted.z);
    assert_eq!(client.corrections(), 0);

    Ok(())
}

/// Two clients learn about each other through spawn messages.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn clients_see_each_other() -> anyhow::Result<()> {
    init_tracing();
    let (server, cfg) = bind_ephemeral(TICK_HZ).await?;
    let server = ServerLoop::spawn(server, 2, DT, Duration::from_millis(5));

    let mut alice = GameClient::connect(&named(&cfg, "alice")).await?;
    let mut bob = GameClient::connect(&named(&cfg, "bob")).await?;

    let idle = InputSnapshot::default();
    let deadline = Instant::now() + Duration::from_secs(10);
    let introduced = |c: &GameClient| c.entity().is_some() && !c.remotes.is_empty();
    while !introduced(&alice) || !introduced(&bob) {
        anyhow::ensure!(Instant::now() < deadline, "clients never saw each other");
        alice.frame(&idle, DT).await?;
        bob.frame(&idle, DT).await?;
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let server = server.stop().await?;

    assert_eq!(server.client_count(), 2);
    assert_eq!(server.sim().player_count(), 2);
    assert_eq!(alice.state, ClientState::Ready);
    assert_eq!(bob.state, ClientState::Ready);

    let seen_by_alice = alice.remotes.values().next().expect("remote");
    assert_eq!(seen_by_alice.name, "bob");
    assert_eq!(seen_by_alice.owner, bob.client_id);
    let seen_by_bob = bob.remotes.values().next().expect("remote");
    assert_eq!(seen_by_bob.name, "alice");
    assert_eq!(Some(*bob.remotes.keys().next().expect("id")), alice.entity());

    Ok(())
}
