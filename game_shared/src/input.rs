//! Per-frame input snapshot.
//!
//! Device polling lives outside this crate. An [`InputSource`] hands the
//! simulation one logical snapshot per render frame; [`InputLatch`] folds
//! those frames into the intent consumed by the next physics tick.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::math::Vec3;

bitflags::bitflags! {
    /// Logical buttons.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct InputButtons: u8 {
        const RUN = 1 << 0;
        const JUMP = 1 << 1;
        const FIRE = 1 << 2;
        const RELOAD = 1 << 3;
    }
}

/// Logical axes and buttons read in one render frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct InputSnapshot {
    /// Forward/back axis in [-1, 1].
    pub forward: f32,
    /// Strafe axis in [-1, 1], positive is right.
    pub right: f32,
    /// Raw horizontal look delta.
    pub look_x: f32,
    /// Raw vertical look delta, positive looks up.
    pub look_y: f32,
    /// Buttons currently held.
    pub held: InputButtons,
    /// Buttons that went down this frame.
    pub pressed: InputButtons,
    /// Number key slot (0-based) pressed this frame.
    pub select_slot: Option<u8>,
    /// Scroll wheel delta.
    pub scroll: f32,
}

impl InputSnapshot {
    /// Derives press edges from the previous frame's held buttons.
    pub fn with_edges(mut self, previous_held: InputButtons) -> Self {
        self.pressed |= self.held & !previous_held;
        self
    }

    /// Local-space move vector (x right, z forward), not normalized.
    pub fn move_vector(&self) -> Vec3 {
        Vec3::new(self.right, 0.0, self.forward)
    }

    pub fn sprint(&self) -> bool {
        self.held.contains(InputButtons::RUN)
    }
}

/// Input polling capability.
pub trait InputSource {
    fn sample(&mut self) -> InputSnapshot;
}

/// Replays a fixed sequence of snapshots, then idles.
#[derive(Debug, Default, Clone)]
pub struct ScriptedInput {
    frames: VecDeque<InputSnapshot>,
}

impl ScriptedInput {
    pub fn new(frames: impl IntoIterator<Item = InputSnapshot>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
        }
    }

    pub fn push(&mut self, frame: InputSnapshot) {
        self.frames.push_back(frame);
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl InputSource for ScriptedInput {
    fn sample(&mut self) -> InputSnapshot {
        self.frames.pop_front().unwrap_or_default()
    }
}

/// What the velocity integrator needs from input for one physics tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MoveIntent {
    /// Local-space wish vector (x right, z forward).
    pub wish: Vec3,
    pub sprint: bool,
    /// Jump was pressed since the previous physics tick.
    pub jump: bool,
    /// Body yaw used to turn `wish` into world space.
    pub facing_yaw: f32,
}

/// Weapon-related input for one frame or one physics tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WeaponInput {
    pub fire: bool,
    pub reload: bool,
    pub select_slot: Option<u8>,
    pub scroll: f32,
}

impl From<&InputSnapshot> for WeaponInput {
    fn from(input: &InputSnapshot) -> Self {
        Self {
            fire: input.held.contains(InputButtons::FIRE),
            reload: input.pressed.contains(InputButtons::RELOAD),
            select_slot: input.select_slot,
            scroll: input.scroll,
        }
    }
}

/// Accumulates render frames between physics ticks.
///
/// Axes and held state take the latest frame; press edges are OR-ed so a tap
/// that lands between two physics ticks is seen exactly once. Slot keys keep
/// the most recent press and scroll deltas add up.
#[derive(Debug, Default, Clone)]
pub struct InputLatch {
    latest: InputSnapshot,
    pressed: InputButtons,
    select_slot: Option<u8>,
    scroll: f32,
}

impl InputLatch {
    pub fn record(&mut self, frame: &InputSnapshot) {
        self.latest = *frame;
        self.pressed |= frame.pressed;
        if frame.select_slot.is_some() {
            self.select_slot = frame.select_slot;
        }
        self.scroll += frame.scroll;
    }

    /// Builds the intent for one physics tick and clears the jump edge.
    pub fn take_intent(&mut self, facing_yaw: f32) -> MoveIntent {
        let intent = MoveIntent {
            wish: self.latest.move_vector(),
            sprint: self.latest.sprint(),
            jump: self.pressed.contains(InputButtons::JUMP),
            facing_yaw,
        };
        self.pressed.remove(InputButtons::JUMP);
        intent
    }

    /// Weapon input gathered since the last call. Clears fire and reload
    /// edges, the slot key and the scroll total.
    pub fn take_weapon_input(&mut self) -> WeaponInput {
        let input = WeaponInput {
            fire: self.latest.held.contains(InputButtons::FIRE)
                || self.pressed.contains(InputButtons::FIRE),
            reload: self.pressed.contains(InputButtons::RELOAD),
            select_slot: self.select_slot.take(),
            scroll: std::mem::take(&mut self.scroll),
        };
        self.pressed.remove(InputButtons::FIRE | InputButtons::RELOAD);
        input
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edges_only_on_transition() {
        let frame = InputSnapshot {
            held: InputButtons::JUMP | InputButtons::RUN,
            ..Default::default()
        };
        let first = frame.with_edges(InputButtons::empty());
        assert!(first.pressed.contains(InputButtons::JUMP));
        let second = frame.with_edges(first.held);
        assert!(second.pressed.is_empty());
    }

    #[test]
    fn latch_keeps_jump_until_consumed_once() {
        let mut latch = InputLatch::default();
        latch.record(&InputSnapshot {
            pressed: InputButtons::JUMP,
            held: InputButtons::JUMP,
            ..Default::default()
        });
        latch.record(&InputSnapshot {
            forward: 1.0,
            ..Default::default()
        });

        let intent = latch.take_intent(0.0);
        assert!(intent.jump);
        assert_eq!(intent.wish, Vec3::new(0.0, 0.0, 1.0));

        let next = latch.take_intent(0.0);
        assert!(!next.jump);
    }

    #[test]
    fn latch_collects_weapon_edges_between_ticks() {
        let mut latch = InputLatch::default();
        latch.record(&InputSnapshot {
            pressed: InputButtons::FIRE | InputButtons::RELOAD,
            held: InputButtons::FIRE,
            select_slot: Some(1),
            scroll: 1.0,
            ..Default::default()
        });
        latch.record(&InputSnapshot {
            scroll: 1.0,
            ..Default::default()
        });

        let weapon = latch.take_weapon_input();
        assert!(weapon.fire);
        assert!(weapon.reload);
        assert_eq!(weapon.select_slot, Some(1));
        assert_eq!(weapon.scroll, 2.0);
        assert_eq!(latch.take_weapon_input(), WeaponInput::default());
    }

    #[test]
    fn scripted_input_idles_when_exhausted() {
        let mut src = ScriptedInput::new([InputSnapshot {
            forward: 1.0,
            ..Default::default()
        }]);
        assert_eq!(src.sample().forward, 1.0);
        assert_eq!(src.sample(), InputSnapshot::default());
    }
}
