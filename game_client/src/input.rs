//! Input handling.
//!
//! Device polling is not part of this crate; frames arrive as
//! [`InputSnapshot`]s from an [`InputSource`]. This module turns what the
//! latch collected between physics ticks into the per-tick `PlayerCommand`
//! sent to the server.

use game_shared::{
    input::{InputButtons, InputSnapshot, InputSource, MoveIntent, WeaponInput},
    net::{ClientId, PlayerCommand},
    orientation::ViewPose,
};

/// Builds the command for one physics tick.
pub fn build_command(
    client_id: ClientId,
    tick: u32,
    intent: &MoveIntent,
    pose: ViewPose,
    weapon: &WeaponInput,
) -> PlayerCommand {
    let mut buttons = InputButtons::empty();
    buttons.set(InputButtons::RUN, intent.sprint);
    buttons.set(InputButtons::JUMP, intent.jump);
    buttons.set(InputButtons::FIRE, weapon.fire);
    buttons.set(InputButtons::RELOAD, weapon.reload);
    PlayerCommand {
        client_id,
        tick,
        wish: intent.wish,
        yaw: pose.body_yaw,
        pitch: pose.view_pitch,
        buttons,
        select_slot: weapon.select_slot,
        scroll: weapon.scroll,
    }
}

/// Tracks held buttons across frames so a source that only reports held
/// state still produces press edges.
pub struct EdgeDetector<S> {
    source: S,
    previous: InputButtons,
}

impl<S: InputSource> EdgeDetector<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            previous: InputButtons::empty(),
        }
    }
}

impl<S: InputSource> InputSource for EdgeDetector<S> {
    fn sample(&mut self) -> InputSnapshot {
        let frame = self.source.sample().with_edges(self.previous);
        self.previous = frame.held;
        frame
    }
}
