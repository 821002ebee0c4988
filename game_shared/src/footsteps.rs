//! Footstep feedback.
//!
//! A looping cue plays while the character is grounded and moving, choosing
//! the run or walk loop by the sprint flag, and pauses otherwise.

use serde::{Deserialize, Serialize};

/// Squared horizontal speed below which the character counts as standing.
pub const MOVING_EPSILON_SQ: f32 = 0.1;

/// Which loop is playing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FootstepCue {
    Walk,
    Run,
}

/// Change the audio collaborator should make.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FootstepAction {
    Play(FootstepCue),
    Pause,
}

/// Tracks the one cue that may be playing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FootstepTrigger {
    playing: Option<FootstepCue>,
}

impl FootstepTrigger {
    pub fn playing(&self) -> Option<FootstepCue> {
        self.playing
    }

    /// Returns an action only when the audible state changes.
    pub fn update(
        &mut self,
        grounded: bool,
        horizontal_speed_sq: f32,
        sprint: bool,
    ) -> Option<FootstepAction> {
        if grounded && horizontal_speed_sq > MOVING_EPSILON_SQ {
            let cue = if sprint {
                FootstepCue::Run
            } else {
                FootstepCue::Walk
            };
            if self.playing == Some(cue) {
                return None;
            }
            self.playing = Some(cue);
            Some(FootstepAction::Play(cue))
        } else if self.playing.take().is_some() {
            Some(FootstepAction::Pause)
        } else {
            None
        }
    }
}

/// Audio playback capability.
pub trait AudioSink: Send + Sync {
    fn footsteps(&mut self, action: FootstepAction);
    fn one_shot(&mut self, name: &str);
}

/// Silent sink for headless runs.
#[derive(Default)]
pub struct NullAudio;

impl AudioSink for NullAudio {
    fn footsteps(&mut self, _action: FootstepAction) {}
    fn one_shot(&mut self, _name: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plays_while_grounded_and_moving() {
        let mut t = FootstepTrigger::default();
        assert_eq!(
            t.update(true, 25.0, false),
            Some(FootstepAction::Play(FootstepCue::Walk))
        );
        assert_eq!(t.update(true, 25.0, false), None);
        assert_eq!(
            t.update(true, 81.0, true),
            Some(FootstepAction::Play(FootstepCue::Run))
        );
        assert_eq!(t.update(false, 81.0, true), Some(FootstepAction::Pause));
        assert_eq!(t.update(false, 81.0, true), None);
        assert_eq!(t.playing(), None);
    }

    #[test]
    fn standing_still_is_silent() {
        let mut t = FootstepTrigger::default();
        assert_eq!(t.update(true, 0.05, false), None);
    }
}
