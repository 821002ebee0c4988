//! Look / orientation update.
//!
//! Raw look deltas are scaled by sensitivity and accumulated into target
//! yaw and pitch; both are smoothed toward their targets every render tick.
//! Yaw drives the body's horizontal facing, pitch drives only the view, so
//! the body never tilts.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    config::ConfigWarning,
    math::wrap_degrees,
    smoothing::{smooth_damp, smooth_damp_angle},
};

/// Hard limit for pitch bounds, straight up / straight down.
pub const PITCH_LIMIT: f32 = 90.0;

/// Look tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LookConfig {
    /// Degrees per unit of raw look delta.
    pub sensitivity: f32,
    /// Smoothing time constant in seconds.
    pub smoothing: f32,
    pub min_pitch: f32,
    pub max_pitch: f32,
}

impl Default for LookConfig {
    fn default() -> Self {
        Self {
            sensitivity: 7.0,
            smoothing: 0.05,
            min_pitch: -PITCH_LIMIT,
            max_pitch: PITCH_LIMIT,
        }
    }
}

impl LookConfig {
    /// One-time pass over the pitch bounds: clamp both into ±90°, then swap
    /// them if they are inverted.
    pub fn validate(&mut self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        for (name, value) in [
            ("min_pitch", &mut self.min_pitch),
            ("max_pitch", &mut self.max_pitch),
        ] {
            let clamped = value.clamp(-PITCH_LIMIT, PITCH_LIMIT);
            if clamped != *value {
                warn!(field = name, value = *value, clamped, "Pitch bound out of range, clamped");
                warnings.push(ConfigWarning::PitchBoundClamped {
                    field: name,
                    from: *value,
                    to: clamped,
                });
                *value = clamped;
            }
        }

        if self.min_pitch > self.max_pitch {
            warn!(
                min = self.min_pitch,
                max = self.max_pitch,
                "Max pitch must be greater than min pitch. Values swapped."
            );
            std::mem::swap(&mut self.min_pitch, &mut self.max_pitch);
            warnings.push(ConfigWarning::PitchBoundsSwapped {
                min: self.min_pitch,
                max: self.max_pitch,
            });
        }
        warnings
    }

    pub fn clamp_pitch(&self, pitch: f32) -> f32 {
        pitch.clamp(self.min_pitch, self.max_pitch)
    }
}

/// Result of one orientation update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewPose {
    /// Horizontal facing of the body, [0, 360).
    pub body_yaw: f32,
    /// Pitch of the view transform, positive looks up.
    pub view_pitch: f32,
}

/// Smoothed look state owned by one character.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OrientationState {
    pub smoothed_yaw: f32,
    pub smoothed_pitch: f32,
    pub yaw_velocity: f32,
    pub pitch_velocity: f32,
    pub target_yaw: f32,
    pub target_pitch: f32,
}

impl OrientationState {
    pub fn facing(yaw: f32, pitch: f32) -> Self {
        let mut state = Self::default();
        state.snap_to(yaw, pitch);
        state
    }

    /// Jumps straight to a pose, dropping any smoothing in flight.
    pub fn snap_to(&mut self, yaw: f32, pitch: f32) {
        let yaw = wrap_degrees(yaw);
        self.smoothed_yaw = yaw;
        self.target_yaw = yaw;
        self.smoothed_pitch = pitch;
        self.target_pitch = pitch;
        self.yaw_velocity = 0.0;
        self.pitch_velocity = 0.0;
    }

    pub fn pose(&self) -> ViewPose {
        ViewPose {
            body_yaw: wrap_degrees(self.smoothed_yaw),
            view_pitch: self.smoothed_pitch,
        }
    }

    /// Render-tick update from raw look deltas.
    pub fn update(&mut self, look_x: f32, look_y: f32, config: &LookConfig, dt: f32) -> ViewPose {
        self.target_yaw = wrap_degrees(self.target_yaw + look_x * config.sensitivity);
        self.target_pitch = config.clamp_pitch(self.target_pitch + look_y * config.sensitivity);

        let yaw = smooth_damp_angle(
            self.smoothed_yaw,
            self.target_yaw,
            &mut self.yaw_velocity,
            config.smoothing,
            dt,
        );
        let pitch = smooth_damp(
            self.smoothed_pitch,
            self.target_pitch,
            &mut self.pitch_velocity,
            config.smoothing,
            dt,
        );

        self.smoothed_yaw = wrap_degrees(yaw);
        self.smoothed_pitch = config.clamp_pitch(pitch);
        self.pose()
    }
}
