//! `game_client`
//!
//! Client-side systems:
//! - Connection management (reliable + unreliable channels)
//! - Input latching and per-tick command generation
//! - Local prediction of the player's character and reconciliation
//! - Interpolation for remote character states
//! - Impact markers with a fixed lifetime
//! - Replication events applied to local and remote characters

pub mod client;
pub mod effects;
pub mod input;
pub mod interp;
pub mod predict;

pub use client::GameClient;
