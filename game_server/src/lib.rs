//! `game_server`
//!
//! Server-side systems:
//! - Fixed timestep simulation loop
//! - One character per connected player
//! - Receives `PlayerCommand`s
//! - Resolves hitscan shots, damage, death and respawn
//! - Sends `Snapshot`s and replication events
//!
//! Networking model:
//! - TCP: handshake, spawns and replication events
//! - UDP: gameplay plane (commands/snapshots)

pub mod server;
pub mod sim;

pub use server::GameServer;
