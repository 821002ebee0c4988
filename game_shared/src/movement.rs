//! Velocity integrator.
//!
//! Turns one physics tick of input plus the grounded flag into the velocity
//! the body should have. Two states:
//!
//! - Grounded: horizontal velocity heads for `wish direction × walk/run
//!   speed`, either snapped, critically damped, or Quake-style friction plus
//!   clamped acceleration depending on [`MovementStrategy`]. Jumps fire here.
//! - Airborne: accelerate-limited air strafe toward the wish direction, plus
//!   gravity. Speed along the wish direction is never reduced.
//!
//! Jump requests made in the air are queued and honoured once, on the first
//! grounded tick.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::{
    input::MoveIntent,
    math::Vec3,
    physics::{BodyCommand, Capsule, ColliderId, CollisionQuery, LayerMask},
    smoothing::SmoothScalar,
};

/// Grounded horizontal behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MovementStrategy {
    /// Velocity is set to the target outright.
    #[default]
    Snap,
    /// Velocity is critically damped toward the target.
    Smoothed,
    /// Friction decay plus clamped acceleration.
    Quake,
}

/// How the result is handed to the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BodyMode {
    /// Physics body receives `desired - current` as a velocity change.
    #[default]
    VelocityChange,
    /// Kinematic capsule is moved by `desired * dt`.
    Kinematic,
}

/// Movement tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MovementConfig {
    pub walk_speed: f32,
    pub run_speed: f32,
    pub jump_speed: f32,
    /// Signed vertical acceleration, negative pulls down.
    pub gravity: f32,
    pub ground_accel: f32,
    /// Minimum speed friction works against, so slow movement stops quickly.
    pub ground_decel: f32,
    pub air_accel: f32,
    /// Used instead of `air_accel` when steering against current velocity.
    pub air_decel: f32,
    /// Target speed of air strafing.
    pub air_speed: f32,
    pub friction: f32,
    /// Time constant for [`MovementStrategy::Smoothed`].
    pub move_smoothing: f32,
    pub strategy: MovementStrategy,
    /// Block horizontal air movement when a sweep hits something.
    pub wall_probe: bool,
    /// Extra sweep distance beyond this tick's travel.
    pub wall_probe_skin: f32,
    pub body_mode: BodyMode,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            walk_speed: 5.0,
            run_speed: 9.0,
            jump_speed: 8.0,
            gravity: -20.0,
            ground_accel: 14.0,
            ground_decel: 10.0,
            air_accel: 2.0,
            air_decel: 2.0,
            air_speed: 1.0,
            friction: 6.0,
            move_smoothing: 0.125,
            strategy: MovementStrategy::Snap,
            wall_probe: false,
            wall_probe_skin: 0.02,
            body_mode: BodyMode::VelocityChange,
        }
    }
}

impl MovementConfig {
    pub fn ground_speed(&self, sprint: bool) -> f32 {
        if sprint {
            self.run_speed
        } else {
            self.walk_speed
        }
    }
}

/// Movement state owned by one character.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MovementState {
    pub velocity: Vec3,
    pub is_grounded: bool,
    /// A jump fires on this grounded tick.
    pub wish_jump: bool,
    /// A jump was pressed in the air and waits for the ground.
    pub jump_queued: bool,
}

/// Collaborators for the airborne wall check.
#[derive(Clone, Copy)]
pub struct WallProbe<'a> {
    pub world: &'a dyn CollisionQuery,
    pub capsule: Capsule,
    pub owner: Option<ColliderId>,
}

impl WallProbe<'_> {
    fn blocked(&self, horizontal: Vec3, distance: f32) -> bool {
        let dir = horizontal.normalize_or_zero();
        if dir == Vec3::ZERO {
            return false;
        }
        self.world
            .capsule_sweep(self.capsule, dir, distance, LayerMask::SOLID | LayerMask::CHARACTER)
            .into_iter()
            .any(|id| Some(id) != self.owner)
    }
}

/// Ground/air state machine producing a velocity per physics tick.
#[derive(Debug, Clone, Default)]
pub struct VelocityIntegrator {
    pub state: MovementState,
    smooth_x: SmoothScalar,
    smooth_z: SmoothScalar,
}

impl VelocityIntegrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn velocity(&self) -> Vec3 {
        self.state.velocity
    }

    /// Overrides the stored velocity, e.g. after the body was pushed.
    pub fn set_velocity(&mut self, velocity: Vec3) {
        self.state.velocity = velocity;
    }

    /// Clears all motion and pending jumps.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Records a jump press against the current grounded state.
    pub fn request_jump(&mut self) {
        if self.state.is_grounded {
            self.state.wish_jump = true;
        } else {
            self.state.jump_queued = true;
        }
    }

    /// One physics tick. Returns the desired velocity.
    pub fn integrate(
        &mut self,
        intent: &MoveIntent,
        grounded: bool,
        config: &MovementConfig,
        dt: f32,
        probe: Option<WallProbe<'_>>,
    ) -> Vec3 {
        self.state.is_grounded = grounded;
        if intent.jump {
            self.request_jump();
        }
        if grounded && self.state.jump_queued {
            self.state.wish_jump = true;
            self.state.jump_queued = false;
        }

        let wish = intent.wish.horizontal().rotate_yaw(intent.facing_yaw);
        let blocked = if grounded {
            self.ground_move(wish, intent.sprint, config, dt);
            false
        } else {
            self.air_move(wish, config, dt, probe)
        };
        let v = self.state.velocity;
        if blocked {
            Vec3::new(0.0, v.y, 0.0)
        } else {
            v
        }
    }

    fn ground_move(&mut self, wish: Vec3, sprint: bool, config: &MovementConfig, dt: f32) {
        let dir = wish.normalize_or_zero();
        let speed = config.ground_speed(sprint);
        let target = dir * speed;

        match config.strategy {
            MovementStrategy::Snap => {
                self.state.velocity.x = target.x;
                self.state.velocity.z = target.z;
            }
            MovementStrategy::Smoothed => {
                self.smooth_x.set_current(self.state.velocity.x);
                self.smooth_z.set_current(self.state.velocity.z);
                self.state.velocity.x = self.smooth_x.update(target.x, config.move_smoothing, dt);
                self.state.velocity.z = self.smooth_z.update(target.z, config.move_smoothing, dt);
            }
            MovementStrategy::Quake => {
                let t = if self.state.wish_jump { 0.0 } else { 1.0 };
                self.apply_friction(t, config, dt);
                let wish_speed = if dir == Vec3::ZERO { 0.0 } else { speed };
                self.accelerate(dir, wish_speed, config.ground_accel, dt);
            }
        }

        if self.state.wish_jump {
            self.state.velocity.y = config.jump_speed;
            self.state.wish_jump = false;
            self.state.is_grounded = false;
            trace!(speed = config.jump_speed, "Jump");
        } else if self.state.velocity.y < 0.0 {
            self.state.velocity.y = 0.0;
        }
    }

    /// Returns true when the wall probe suppresses this tick's horizontal
    /// output. Stored momentum is kept.
    fn air_move(
        &mut self,
        wish: Vec3,
        config: &MovementConfig,
        dt: f32,
        probe: Option<WallProbe<'_>>,
    ) -> bool {
        let dir = wish.normalize_or_zero();
        let wish_speed = wish.len().min(1.0) * config.air_speed;
        let accel = if self.state.velocity.dot(dir) < 0.0 {
            config.air_decel
        } else {
            config.air_accel
        };
        self.accelerate(dir, wish_speed, accel, dt);

        let blocked = match probe {
            Some(probe) if config.wall_probe => {
                let horizontal = self.state.velocity.horizontal();
                let distance = horizontal.len() * dt + config.wall_probe_skin;
                probe.blocked(horizontal, distance)
            }
            _ => false,
        };
        if blocked {
            trace!("Wall ahead, horizontal movement suppressed");
        }

        self.state.velocity.y += config.gravity * dt;
        blocked
    }

    /// Adds speed along `dir` up to `wish_speed`, never removing any.
    fn accelerate(&mut self, dir: Vec3, wish_speed: f32, accel: f32, dt: f32) {
        let current = self.state.velocity.dot(dir);
        let add = wish_speed - current;
        if add <= 0.0 {
            return;
        }
        let accel_speed = (accel * dt * wish_speed).min(add);
        self.state.velocity.x += accel_speed * dir.x;
        self.state.velocity.z += accel_speed * dir.z;
    }

    fn apply_friction(&mut self, t: f32, config: &MovementConfig, dt: f32) {
        let speed = self.state.velocity.horizontal().len();
        let control = speed.max(config.ground_decel);
        let drop = control * config.friction * dt * t;

        let mut scale = (speed - drop).max(0.0);
        if speed > 0.0 {
            scale /= speed;
        }
        self.state.velocity.x *= scale;
        self.state.velocity.z *= scale;
    }
}

/// Converts a desired velocity into what the body should receive.
pub fn body_command(desired: Vec3, current: Vec3, dt: f32, mode: BodyMode) -> BodyCommand {
    match mode {
        BodyMode::VelocityChange => BodyCommand::VelocityChange(desired - current),
        BodyMode::Kinematic => BodyCommand::KinematicMove(desired * dt),
    }
}
