//! Player character.
//!
//! Owns exactly one movement state and one orientation state, plus the
//! ground sensor, body, footstep trigger, loadout and health. Collaborators
//! (collision queries, configuration) are passed in; nothing is looked up.
//!
//! Two entry points run at different rates:
//! - [`Character::render_tick`]: look, weapons, footsteps.
//! - [`Character::physics_tick`]: ground refresh, velocity integration, body.

use std::sync::Arc;

use tracing::{debug, info};

use crate::{
    config::CharacterConfig,
    event::EventBus,
    footsteps::{FootstepAction, FootstepTrigger},
    ground::{ContactEvent, GroundSensor},
    input::{InputSnapshot, MoveIntent, WeaponInput},
    math::Vec3,
    movement::{body_command, MovementState, VelocityIntegrator, WallProbe},
    orientation::{OrientationState, ViewPose},
    physics::{Aabb, Body, Capsule, ColliderId, CollisionQuery},
    weapon::{DamageOutcome, EquipError, FireBlocked, Health, Loadout, Shot, WeaponEvent},
};

/// Things that happened to a character, drained by the owning loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CharacterEvent {
    Footsteps(FootstepAction),
    Fired {
        origin: Vec3,
        direction: Vec3,
        shot: Shot,
    },
    ReloadStarted,
    Reloaded {
        ammo: u32,
    },
    Equipped {
        index: usize,
    },
}

/// One player-controlled character.
pub struct Character {
    config: Arc<CharacterConfig>,
    collider: Option<ColliderId>,
    orientation: OrientationState,
    integrator: VelocityIntegrator,
    ground: GroundSensor,
    body: Body,
    footsteps: FootstepTrigger,
    loadout: Loadout,
    health: Health,
    events: EventBus,
}

impl Character {
    /// Creates a character at `spawn` (feet position). `config` is expected
    /// to have been validated already.
    pub fn new(config: Arc<CharacterConfig>, spawn: Vec3, collider: Option<ColliderId>) -> Self {
        let ground = GroundSensor::new(config.grounding, collider);
        let loadout = Loadout::new(&config.loadout);
        let health = Health::new(config.max_health);
        Self {
            config,
            collider,
            orientation: OrientationState::default(),
            integrator: VelocityIntegrator::new(),
            ground,
            body: Body::at(spawn),
            footsteps: FootstepTrigger::default(),
            loadout,
            health,
            events: EventBus::default(),
        }
    }

    pub fn config(&self) -> &CharacterConfig {
        &self.config
    }

    pub fn collider(&self) -> Option<ColliderId> {
        self.collider
    }

    pub fn position(&self) -> Vec3 {
        self.body.position
    }

    pub fn velocity(&self) -> Vec3 {
        self.body.velocity
    }

    pub fn pose(&self) -> ViewPose {
        self.orientation.pose()
    }

    pub fn is_grounded(&self) -> bool {
        self.ground.is_grounded()
    }

    pub fn movement(&self) -> &MovementState {
        &self.integrator.state
    }

    pub fn loadout(&self) -> &Loadout {
        &self.loadout
    }

    pub fn health(&self) -> &Health {
        &self.health
    }

    pub fn capsule(&self) -> Capsule {
        let half_height = self.config.shape.height * 0.5;
        Capsule {
            center: self.body.position + Vec3::new(0.0, half_height, 0.0),
            radius: self.config.shape.radius,
            half_height,
        }
    }

    pub fn bounds(&self) -> Aabb {
        self.capsule().bounds()
    }

    pub fn eye(&self) -> Vec3 {
        self.body.position + Vec3::new(0.0, self.config.shape.eye_height, 0.0)
    }

    pub fn view_direction(&self) -> Vec3 {
        let pose = self.pose();
        Vec3::from_yaw_pitch(pose.body_yaw, pose.view_pitch)
    }

    /// Push-style ground notification.
    pub fn set_grounded(&mut self, grounded: bool) {
        self.ground.set_grounded(grounded);
    }

    /// Trigger-volume contact under the feet.
    pub fn on_contact(&mut self, event: ContactEvent) {
        self.ground.on_contact(event);
    }

    /// Takes an externally decided pose, e.g. from a client command.
    pub fn set_view(&mut self, yaw: f32, pitch: f32) {
        self.orientation
            .snap_to(yaw, self.config.look.clamp_pitch(pitch));
    }

    /// Render tick: look, weapons and footsteps.
    pub fn render_tick(&mut self, input: &InputSnapshot, now: f64, dt: f32) -> ViewPose {
        let pose = self.update_orientation(input.look_x, input.look_y, dt);
        self.handle_weapons(&WeaponInput::from(input), now);
        self.update_footsteps(input.sprint());
        pose
    }

    pub fn update_orientation(&mut self, look_x: f32, look_y: f32, dt: f32) -> ViewPose {
        self.orientation.update(look_x, look_y, &self.config.look, dt)
    }

    /// Weapon selection, reload and fire for one frame.
    pub fn handle_weapons(&mut self, input: &WeaponInput, now: f64) {
        if self.health.is_dead() {
            return;
        }

        let equipped = match input.select_slot {
            Some(slot) => self.loadout.equip(slot as usize).ok(),
            None => self.loadout.cycle(input.scroll),
        };
        if let Some(index) = equipped {
            debug!(index, "Weapon equipped");
            self.events.push(CharacterEvent::Equipped { index });
        }

        let origin = self.eye();
        let direction = self.view_direction();
        let Some(gun) = self.loadout.active_mut() else {
            return;
        };

        match gun.tick(now) {
            Some(WeaponEvent::ReloadStarted) => self.events.push(CharacterEvent::ReloadStarted),
            Some(WeaponEvent::Reloaded { ammo }) => {
                self.events.push(CharacterEvent::Reloaded { ammo })
            }
            None => {}
        }

        if input.reload && gun.start_reload(now) {
            self.events.push(CharacterEvent::ReloadStarted);
        }

        if input.fire {
            match gun.try_fire(now) {
                Ok(shot) => self.events.push(CharacterEvent::Fired {
                    origin,
                    direction,
                    shot,
                }),
                Err(FireBlocked::Empty) => self.events.push(CharacterEvent::ReloadStarted),
                Err(_) => {}
            }
        }
    }

    /// Applies an equip that was decided elsewhere (replication).
    pub fn apply_remote_equip(&mut self, index: usize) -> Result<usize, EquipError> {
        self.loadout.equip(index)
    }

    pub fn update_footsteps(&mut self, sprint: bool) {
        let speed_sq = self.body.velocity.horizontal().len_sq();
        if let Some(action) = self.footsteps.update(self.is_grounded(), speed_sq, sprint) {
            self.events.push(CharacterEvent::Footsteps(action));
        }
    }

    /// Physics tick. Returns the velocity the integrator asked for.
    pub fn physics_tick(
        &mut self,
        intent: &MoveIntent,
        world: Option<&dyn CollisionQuery>,
        dt: f32,
    ) -> Vec3 {
        if self.health.is_dead() {
            return Vec3::ZERO;
        }

        self.ground.refresh(world, self.body.position);
        let grounded = self.ground.is_grounded();

        let probe = world.map(|world| WallProbe {
            world,
            capsule: self.capsule(),
            owner: self.collider,
        });
        let movement = &self.config.movement;
        let desired = self.integrator.integrate(intent, grounded, movement, dt, probe);

        let command = body_command(desired, self.body.velocity, dt, movement.body_mode);
        self.body.apply(command, dt);
        if let Some(world) = world {
            self.body.settle(world, self.collider);
        }
        self.integrator.set_velocity(self.body.velocity);
        self.ground.end_tick();
        desired
    }

    /// Moves the body to an authoritative state.
    pub fn correct(&mut self, position: Vec3, velocity: Vec3) {
        self.body.position = position;
        self.body.velocity = velocity;
        self.integrator.set_velocity(velocity);
    }

    /// Restores an earlier movement state (jump queue included) at an
    /// authoritative body state, before replaying later ticks.
    pub fn rewind(&mut self, position: Vec3, velocity: Vec3, movement: MovementState) {
        self.body.position = position;
        self.body.velocity = velocity;
        self.integrator.state = MovementState {
            velocity,
            ..movement
        };
    }

    pub fn take_damage(&mut self, amount: f32) -> DamageOutcome {
        self.health.apply_damage(amount)
    }

    pub fn kill(&mut self) -> DamageOutcome {
        self.health.kill()
    }

    /// Brings a dead or live character back at `spawn` with fresh state.
    pub fn respawn(&mut self, spawn: Vec3) {
        info!(position = ?spawn, "Respawning");
        self.body = Body::at(spawn);
        self.integrator.reset();
        self.ground.set_grounded(false);
        self.health.reset();
        self.loadout.reset();
        if let Some(action) = self.footsteps.update(false, 0.0, false) {
            self.events.push(CharacterEvent::Footsteps(action));
        }
    }

    pub fn drain_events(&mut self) -> Vec<CharacterEvent> {
        self.events.drain::<CharacterEvent>()
    }
}
