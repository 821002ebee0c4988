//! Ground state oracle.
//!
//! The sensor owns the one "is grounded" flag a character has. It is written
//! either by a shape probe at the feet each physics tick or by contact
//! notifications from a trigger volume, and read by the velocity integrator.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::{
    math::Vec3,
    physics::{ColliderId, CollisionQuery, LayerMask},
};

/// How grounding is detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GroundingMode {
    /// Sphere overlap against the ground layer each physics tick.
    #[default]
    Probe,
    /// Enter/stay/exit notifications from a volume under the feet.
    TriggerVolume,
}

/// Ground sensor tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroundingConfig {
    pub mode: GroundingMode,
    /// Probe center height relative to the feet.
    pub probe_offset: f32,
    pub probe_radius: f32,
    /// Clear the flag after every physics tick so it only holds while
    /// something keeps reasserting it.
    pub decay_each_tick: bool,
}

impl Default for GroundingConfig {
    fn default() -> Self {
        Self {
            mode: GroundingMode::Probe,
            probe_offset: 0.0,
            probe_radius: 0.2,
            decay_each_tick: false,
        }
    }
}

/// Phase of a volume contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContactPhase {
    Enter,
    Stay,
    Exit,
}

/// Contact notification delivered to a trigger volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactEvent {
    pub other: ColliderId,
    pub phase: ContactPhase,
}

/// Single-writer grounded flag.
#[derive(Debug, Clone)]
pub struct GroundSensor {
    config: GroundingConfig,
    owner: Option<ColliderId>,
    grounded: bool,
}

impl GroundSensor {
    pub fn new(config: GroundingConfig, owner: Option<ColliderId>) -> Self {
        Self {
            config,
            owner,
            grounded: false,
        }
    }

    pub fn mode(&self) -> GroundingMode {
        self.config.mode
    }

    pub fn is_grounded(&self) -> bool {
        self.grounded
    }

    /// Push-style notification from whoever knows better.
    pub fn set_grounded(&mut self, grounded: bool) {
        self.grounded = grounded;
    }

    /// Called once the integrator has read the flag for this physics tick.
    ///
    /// With `decay_each_tick` the flag drops back to false, so the next tick
    /// sees ground only if a probe or contact reasserted it in between.
    pub fn end_tick(&mut self) {
        if self.config.decay_each_tick {
            self.grounded = false;
        }
    }

    /// Runs the probe. Without a world to probe the character is airborne.
    ///
    /// Does nothing in trigger-volume mode.
    pub fn refresh(&mut self, world: Option<&dyn CollisionQuery>, feet: Vec3) {
        if self.config.mode != GroundingMode::Probe {
            return;
        }
        let Some(world) = world else {
            self.grounded = false;
            return;
        };
        let center = feet + Vec3::new(0.0, self.config.probe_offset, 0.0);
        let owner = self.owner;
        self.grounded = world
            .overlap_sphere(center, self.config.probe_radius, LayerMask::GROUND)
            .into_iter()
            .any(|id| Some(id) != owner);
    }

    /// Applies a volume contact. Contacts with the owner's own body never
    /// change the flag.
    pub fn on_contact(&mut self, event: ContactEvent) {
        if Some(event.other) == self.owner {
            trace!(other = ?event.other, "Ignoring self contact");
            return;
        }
        self.grounded = match event.phase {
            ContactPhase::Enter | ContactPhase::Stay => true,
            ContactPhase::Exit => false,
        };
    }
}
