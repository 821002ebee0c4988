//! Client-side prediction history.
//!
//! Every predicted physics tick is recorded with the intent that drove it and
//! the state it produced. When an acknowledged snapshot disagrees with the
//! prediction for that tick, the character is rewound to the server's body
//! state plus our movement state for that tick, and the later ticks are
//! replayed.

use std::collections::VecDeque;

use game_shared::{
    character::Character,
    input::MoveIntent,
    math::Vec3,
    movement::MovementState,
    net::CharacterSnapshot,
    physics::CollisionQuery,
};
use tracing::debug;

/// Predicted ticks kept for replay.
pub const MAX_HISTORY: usize = 128;
/// Prediction error (metres) tolerated before replaying from server state.
pub const RECONCILE_TOLERANCE: f32 = 0.05;

/// A predicted physics tick.
#[derive(Debug, Clone, Copy)]
struct PredictedTick {
    tick: u32,
    intent: MoveIntent,
    position: Vec3,
    /// Jump queue and velocity after the tick.
    movement: MovementState,
}

#[derive(Debug, Default)]
pub struct Prediction {
    history: VecDeque<PredictedTick>,
    corrections: u32,
}

impl Prediction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the character's state after predicting `tick`.
    pub fn record(&mut self, tick: u32, intent: MoveIntent, character: &Character) {
        self.history.push_back(PredictedTick {
            tick,
            intent,
            position: character.position(),
            movement: *character.movement(),
        });
        while self.history.len() > MAX_HISTORY {
            self.history.pop_front();
        }
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// How many times prediction was replayed from server state.
    pub fn corrections(&self) -> u32 {
        self.corrections
    }

    /// Compares the prediction for `ack` with the server and replays the
    /// unacknowledged ticks when they disagree. Returns true on a replay.
    pub fn reconcile(
        &mut self,
        character: &mut Character,
        server: &CharacterSnapshot,
        ack: u32,
        world: Option<&dyn CollisionQuery>,
        dt: f32,
    ) -> bool {
        while self.history.front().is_some_and(|p| p.tick < ack) {
            self.history.pop_front();
        }
        let Some(predicted) = self.history.front().copied() else {
            return false;
        };
        if predicted.tick != ack {
            return false;
        }
        self.history.pop_front();
        let error = (predicted.position - server.position).len();
        if error <= RECONCILE_TOLERANCE {
            return false;
        }

        debug!(tick = ack, error, replay = self.history.len(), "Prediction corrected");
        self.corrections += 1;
        character.rewind(server.position, server.velocity, predicted.movement);
        character.set_grounded(server.grounded);
        for entry in self.history.iter_mut() {
            character.physics_tick(&entry.intent, world, dt);
            entry.position = character.position();
            entry.movement = *character.movement();
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use game_shared::{arena::Arena, config::CharacterConfig, ecs::EntityId};

    use super::*;

    const DT: f32 = 0.02;

    fn character(spawn: Vec3) -> Character {
        Character::new(Arc::new(CharacterConfig::default()), spawn, None)
    }

    fn server_state(c: &Character, offset: Vec3) -> CharacterSnapshot {
        CharacterSnapshot {
            id: EntityId(1),
            position: c.position() + offset,
            velocity: c.velocity(),
            yaw: 0.0,
            pitch: 0.0,
            grounded: c.is_grounded(),
            item_index: 0,
            health: 100.0,
        }
    }

    /// Forward movement with a jump pressed in the air on tick 2.
    fn intents() -> Vec<MoveIntent> {
        (0..40)
            .map(|tick| MoveIntent {
                wish: Vec3::FORWARD,
                jump: tick == 2,
                ..Default::default()
            })
            .collect()
    }

    #[test]
    fn matching_snapshot_keeps_prediction() {
        let arena = Arena::flat(50.0, vec![]);
        let world: &dyn CollisionQuery = &arena.collision;
        let mut c = character(Vec3::ZERO);
        let mut prediction = Prediction::new();
        let mut acked = None;
        for (tick, intent) in intents().into_iter().enumerate().take(10) {
            c.physics_tick(&intent, Some(world), DT);
            prediction.record(tick as u32, intent, &c);
            if tick == 4 {
                acked = Some(server_state(&c, Vec3::new(0.01, 0.0, 0.0)));
            }
        }
        let before = c.position();

        let acked = acked.unwrap();
        assert!(!prediction.reconcile(&mut c, &acked, 4, Some(world), DT));
        assert_eq!(prediction.corrections(), 0);
        assert_eq!(prediction.len(), 5);
        assert_eq!(c.position(), before);
    }

    #[test]
    fn mismatch_replays_queued_jump_like_the_server() {
        const ACK: usize = 5;
        let arena = Arena::flat(50.0, vec![]);
        let world: &dyn CollisionQuery = &arena.collision;
        let spawn = Vec3::new(0.0, 1.0, 0.0);
        let offset = Vec3::new(0.5, 0.0, 0.0);

        // Server: same inputs, but its body ended tick ACK elsewhere.
        let mut server = character(spawn);
        let mut acked = None;
        let mut peak_after_landing: f32 = 0.0;
        let mut landed = false;
        for (tick, intent) in intents().into_iter().enumerate() {
            server.physics_tick(&intent, Some(world), DT);
            if tick == ACK {
                acked = Some(server_state(&server, offset));
                server.correct(server.position() + offset, server.velocity());
            }
            landed |= tick > ACK && server.is_grounded();
            if landed {
                peak_after_landing = peak_after_landing.max(server.position().y);
            }
        }
        assert!(landed);
        assert!(peak_after_landing > 0.5, "queued jump fired on landing");

        let mut client = character(spawn);
        let mut prediction = Prediction::new();
        for (tick, intent) in intents().into_iter().enumerate() {
            client.physics_tick(&intent, Some(world), DT);
            prediction.record(tick as u32, intent, &client);
        }
        assert!(!client.movement().jump_queued);

        let acked = acked.unwrap();
        assert!(prediction.reconcile(&mut client, &acked, ACK as u32, Some(world), DT));
        assert_eq!(prediction.corrections(), 1);
        assert_eq!(client.position(), server.position());
        assert_eq!(client.velocity(), server.velocity());
    }

    #[test]
    fn history_is_capped_and_unknown_ticks_ignored() {
        let mut c = character(Vec3::ZERO);
        let mut prediction = Prediction::new();
        for tick in 0..(MAX_HISTORY as u32 + 10) {
            prediction.record(tick, MoveIntent::default(), &c);
        }
        assert_eq!(prediction.len(), MAX_HISTORY);

        let far = server_state(&c, Vec3::new(3.0, 0.0, 0.0));
        assert!(!prediction.reconcile(&mut c, &far, 5, None, DT));
        assert_eq!(prediction.len(), MAX_HISTORY);
        assert_eq!(prediction.corrections(), 0);
    }
}
