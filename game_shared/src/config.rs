//! Configuration system.
//!
//! Loads engine and character configuration from JSON strings/files. Every
//! field has a default, so partial files are fine. Character tuning is loaded
//! once at spawn and treated as immutable afterwards; the only correction
//! ever applied is the one-time look-bound validation.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::{
    ground::GroundingConfig, movement::MovementConfig, orientation::LookConfig, weapon::GunInfo,
};

/// Root configuration shared by client/server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Server listen address, e.g. `127.0.0.1:40000`.
    pub server_addr: String,
    /// Fixed simulation tick rate.
    pub tick_hz: u32,
    /// Client render/look update rate.
    pub render_hz: u32,
    /// Player name (client only).
    pub player_name: String,
    /// Characters below this height die.
    pub kill_height: f32,
    /// Seconds between death and respawn (server only).
    pub respawn_delay: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:40000".to_string(),
            tick_hz: 50,
            render_hz: 144,
            player_name: "Player".to_string(),
            kill_height: -10.0,
            respawn_delay: 3.0,
        }
    }
}

impl EngineConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    pub fn fixed_dt(&self) -> f32 {
        1.0 / self.tick_hz.max(1) as f32
    }
}

/// Capsule dimensions of a character.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShapeConfig {
    pub radius: f32,
    pub height: f32,
    /// Camera height above the feet.
    pub eye_height: f32,
}

impl Default for ShapeConfig {
    fn default() -> Self {
        Self {
            radius: 0.5,
            height: 2.0,
            eye_height: 1.6,
        }
    }
}

/// Per-character tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CharacterConfig {
    pub movement: MovementConfig,
    pub look: LookConfig,
    pub grounding: GroundingConfig,
    pub shape: ShapeConfig,
    pub loadout: Vec<GunInfo>,
    pub max_health: f32,
}

impl Default for CharacterConfig {
    fn default() -> Self {
        Self {
            movement: MovementConfig::default(),
            look: LookConfig::default(),
            grounding: GroundingConfig::default(),
            shape: ShapeConfig::default(),
            loadout: vec![GunInfo::rifle(), GunInfo::pistol()],
            max_health: 100.0,
        }
    }
}

impl CharacterConfig {
    /// Runs the one-time validation pass. Problems are corrected, never fatal.
    pub fn validated(mut self) -> (Self, Vec<ConfigWarning>) {
        let warnings = self.look.validate();
        (self, warnings)
    }
}

/// A configuration value that was corrected at load time.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigWarning {
    PitchBoundClamped {
        field: &'static str,
        from: f32,
        to: f32,
    },
    PitchBoundsSwapped {
        min: f32,
        max: f32,
    },
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::PitchBoundClamped { field, from, to } => {
                write!(f, "{} {} clamped to {}", field, from, to)
            }
            ConfigWarning::PitchBoundsSwapped { min, max } => {
                write!(f, "pitch bounds swapped to [{}, {}]", min, max)
            }
        }
    }
}

/// Everything a binary needs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub engine: EngineConfig,
    pub character: CharacterConfig,
}

impl GameConfig {
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("parse config {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_fills_defaults() {
        let cfg = GameConfig::from_json_str(
            r#"{ "engine": { "tick_hz": 64 }, "character": { "look": { "sensitivity": 2.5 } } }"#,
        )
        .unwrap();
        assert_eq!(cfg.engine.tick_hz, 64);
        assert_eq!(cfg.engine.server_addr, "127.0.0.1:40000");
        assert_eq!(cfg.character.look.sensitivity, 2.5);
        assert_eq!(cfg.character.look.max_pitch, 90.0);
        assert_eq!(cfg.character.loadout.len(), 2);
    }

    #[test]
    fn validation_reports_corrections() {
        let mut cfg = CharacterConfig::default();
        cfg.look.min_pitch = 45.0;
        cfg.look.max_pitch = -45.0;
        let (cfg, warnings) = cfg.validated();
        assert_eq!(warnings.len(), 1);
        assert_eq!(cfg.look.min_pitch, -45.0);
        assert_eq!(cfg.look.max_pitch, 45.0);
        assert_eq!(warnings[0].to_string(), "pitch bounds swapped to [-45, 45]");
    }
}
