//! Authoritative simulation.
//!
//! Owns every player's [`Character`], the level collision and the
//! replication outbox. Nothing here touches sockets, so the whole gameplay
//! loop can be driven from tests.
//!
//! Per tick, for each player in entity order:
//! - respawn if the death timer ran out
//! - run every queued command as one physics step each, or after a short
//!   grace period with no commands, an idle step without input
//! - look, weapons, physics
//! - resolve shots, kill height, weapon switches into [`ReplicationEvent`]s

use std::{
    collections::{BTreeMap, VecDeque},
    sync::Arc,
};

use game_shared::{
    arena::Arena,
    character::{Character, CharacterEvent},
    config::{CharacterConfig, EngineConfig},
    ecs::{EntityId, World},
    input::MoveIntent,
    math::Vec3,
    net::{CharacterSnapshot, ClientId, EntitySpawn, PlayerCommand, ReplicationEvent},
    physics::{ColliderId, CollisionQuery, CollisionWorld, LayerMask},
    weapon::{DamageOutcome, Shot},
};
use rand::{rngs::StdRng, seq::SliceRandom};
use tracing::{debug, info, trace};

/// Commands buffered per player before the oldest are dropped.
const MAX_PENDING_COMMANDS: usize = 8;

/// Ticks without commands before a player is simulated without input.
const MAX_IDLE_TICKS: u32 = 10;

/// Server-side bookkeeping for one player entity.
#[derive(Debug)]
pub struct Player {
    pub owner: ClientId,
    pub name: String,
    pending: VecDeque<PlayerCommand>,
    last_applied: Option<u32>,
    idle_ticks: u32,
    respawn_at: Option<f64>,
}

impl Player {
    fn new(owner: ClientId, name: String) -> Self {
        Self {
            owner,
            name,
            pending: VecDeque::new(),
            last_applied: None,
            idle_ticks: 0,
            respawn_at: None,
        }
    }

    /// Queues a command unless it is older than one already seen.
    fn queue(&mut self, cmd: PlayerCommand) -> bool {
        let newest = self
            .pending
            .back()
            .map(|c| c.tick)
            .or(self.last_applied);
        if newest.is_some_and(|t| cmd.tick <= t) {
            trace!(tick = cmd.tick, "Dropping stale command");
            return false;
        }
        self.pending.push_back(cmd);
        while self.pending.len() > MAX_PENDING_COMMANDS {
            self.pending.pop_front();
        }
        true
    }

    /// Takes everything queued since the last tick.
    fn take_commands(&mut self) -> Vec<PlayerCommand> {
        let commands: Vec<PlayerCommand> = self.pending.drain(..).collect();
        match commands.last() {
            Some(last) => {
                self.last_applied = Some(last.tick);
                self.idle_ticks = 0;
            }
            None => self.idle_ticks = self.idle_ticks.saturating_add(1),
        }
        commands
    }

    pub fn last_applied(&self) -> Option<u32> {
        self.last_applied
    }

    pub fn is_waiting_to_respawn(&self) -> bool {
        self.respawn_at.is_some()
    }
}

/// The authoritative game state.
pub struct Simulation {
    character_cfg: Arc<CharacterConfig>,
    kill_height: f32,
    respawn_delay: f64,
    world: World,
    collision: CollisionWorld,
    spawn_points: Vec<Vec3>,
    colliders: BTreeMap<ColliderId, EntityId>,
    rng: StdRng,
    time: f64,
    outbox: Vec<ReplicationEvent>,
}

impl Simulation {
    pub fn new(
        engine: &EngineConfig,
        character_cfg: Arc<CharacterConfig>,
        arena: Arena,
        rng: StdRng,
    ) -> Self {
        Self {
            character_cfg,
            kill_height: engine.kill_height,
            respawn_delay: engine.respawn_delay.max(0.0) as f64,
            world: World::default(),
            collision: arena.collision,
            spawn_points: arena.spawn_points,
            colliders: BTreeMap::new(),
            rng,
            time: 0.0,
            outbox: Vec::new(),
        }
    }

    /// Simulation time in seconds.
    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn collision(&self) -> &CollisionWorld {
        &self.collision
    }

    pub fn character(&self, entity: EntityId) -> Option<&Character> {
        self.world.get::<Character>(entity)
    }

    pub fn player(&self, entity: EntityId) -> Option<&Player> {
        self.world.get::<Player>(entity)
    }

    pub fn player_count(&self) -> usize {
        self.world.count::<Player>()
    }

    /// Spawns a player at a random spawn point.
    pub fn spawn_player(&mut self, owner: ClientId, name: &str) -> EntityId {
        let position = self.pick_spawn_point();
        self.spawn_player_at(owner, name, position)
    }

    pub fn spawn_player_at(&mut self, owner: ClientId, name: &str, position: Vec3) -> EntityId {
        let entity = self.world.spawn();
        let collider = self.collision.allocate_id();
        let character = Character::new(self.character_cfg.clone(), position, Some(collider));
        self.collision
            .upsert(collider, character.bounds(), LayerMask::CHARACTER);
        self.colliders.insert(collider, entity);
        self.world.insert(entity, character);
        self.world.insert(entity, Player::new(owner, name.to_string()));
        info!(entity = ?entity, client_id = ?owner, name = %name, position = ?position, "Player spawned");
        entity
    }

    pub fn remove_player(&mut self, entity: EntityId) -> bool {
        let Some(character) = self.world.remove::<Character>(entity) else {
            return false;
        };
        self.world.remove::<Player>(entity);
        if let Some(collider) = character.collider() {
            self.collision.remove(collider);
            self.colliders.remove(&collider);
        }
        info!(entity = ?entity, "Player removed");
        true
    }

    /// Buffers a command for the player's next ticks.
    pub fn queue_command(&mut self, entity: EntityId, cmd: PlayerCommand) -> bool {
        self.world
            .get_mut::<Player>(entity)
            .is_some_and(|player| player.queue(cmd))
    }

    /// Kills a player outright, e.g. from the console.
    pub fn kill(&mut self, entity: EntityId) -> bool {
        let died = self
            .world
            .get_mut::<Character>(entity)
            .is_some_and(|c| c.kill() == DamageOutcome::Died);
        if died {
            self.on_death(entity);
        }
        died
    }

    /// Advances every player by one fixed step.
    pub fn step(&mut self, dt: f32) {
        self.time += dt as f64;
        let entities: Vec<EntityId> = self.world.iter::<Player>().map(|(id, _)| id).collect();
        for entity in entities {
            self.respawn_if_due(entity);
            self.run_player(entity, dt);
        }
    }

    fn run_player(&mut self, entity: EntityId, dt: f32) {
        let Some(player) = self.world.get_mut::<Player>(entity) else {
            return;
        };
        let commands = player.take_commands();
        let idle_ticks = player.idle_ticks;
        if !commands.is_empty() {
            for cmd in &commands {
                self.simulate(entity, Some(cmd), dt);
            }
        } else if idle_ticks > MAX_IDLE_TICKS {
            self.simulate(entity, None, dt);
        }
    }

    /// One physics step for one player.
    fn simulate(&mut self, entity: EntityId, cmd: Option<&PlayerCommand>, dt: f32) {
        let Some(character) = self.world.get_mut::<Character>(entity) else {
            return;
        };

        let intent = match cmd {
            Some(cmd) => {
                character.set_view(cmd.yaw, cmd.pitch);
                character.handle_weapons(&cmd.weapon_input(), self.time);
                cmd.intent()
            }
            None => MoveIntent {
                facing_yaw: character.pose().body_yaw,
                ..Default::default()
            },
        };

        let world: &dyn CollisionQuery = &self.collision;
        character.physics_tick(&intent, Some(world), dt);

        let alive = !character.health().is_dead();
        if let (true, Some(collider)) = (alive, character.collider()) {
            self.collision
                .upsert(collider, character.bounds(), LayerMask::CHARACTER);
        }

        let fell = alive && character.position().y < self.kill_height;
        if fell {
            info!(entity = ?entity, y = character.position().y, "Fell below kill height");
            character.kill();
        }
        let collider = character.collider();
        let events = character.drain_events();

        if fell {
            self.on_death(entity);
        }
        for event in events {
            match event {
                CharacterEvent::Equipped { index } => {
                    self.outbox
                        .push(ReplicationEvent::ItemEquipped { entity, index });
                }
                CharacterEvent::Fired {
                    origin,
                    direction,
                    shot,
                } => self.resolve_shot(entity, collider, origin, direction, shot),
                CharacterEvent::Reloaded { ammo } => {
                    debug!(entity = ?entity, ammo, "Reloaded");
                }
                CharacterEvent::ReloadStarted | CharacterEvent::Footsteps(_) => {}
            }
        }
    }

    fn resolve_shot(
        &mut self,
        shooter: EntityId,
        shooter_collider: Option<ColliderId>,
        origin: Vec3,
        direction: Vec3,
        shot: Shot,
    ) {
        let mask = LayerMask::SOLID | LayerMask::CHARACTER;
        let Some(hit) = self
            .collision
            .raycast(origin, direction, shot.range, mask, shooter_collider)
        else {
            trace!(shooter = ?shooter, "Shot hit nothing");
            return;
        };
        self.outbox.push(ReplicationEvent::HitEffect {
            point: hit.point,
            normal: hit.normal,
        });
        if let Some(&victim) = self.colliders.get(&hit.collider) {
            self.damage(victim, shot.damage, Some(shooter));
        }
    }

    /// Applies damage and replicates the outcome.
    pub fn damage(&mut self, victim: EntityId, amount: f32, attacker: Option<EntityId>) {
        let Some(character) = self.world.get_mut::<Character>(victim) else {
            return;
        };
        match character.take_damage(amount) {
            DamageOutcome::Survived { remaining } => {
                debug!(victim = ?victim, attacker = ?attacker, amount, remaining, "Damaged");
                self.outbox.push(ReplicationEvent::Damaged {
                    entity: victim,
                    amount,
                    remaining,
                    attacker,
                });
            }
            DamageOutcome::Died => {
                self.outbox.push(ReplicationEvent::Damaged {
                    entity: victim,
                    amount,
                    remaining: 0.0,
                    attacker,
                });
                self.on_death(victim);
            }
            DamageOutcome::AlreadyDead => {}
        }
    }

    fn on_death(&mut self, entity: EntityId) {
        info!(entity = ?entity, "Player died");
        self.outbox.push(ReplicationEvent::Died { entity });
        if let Some(collider) = self.world.get::<Character>(entity).and_then(Character::collider) {
            self.collision.remove(collider);
        }
        let respawn_at = self.time + self.respawn_delay;
        if let Some(player) = self.world.get_mut::<Player>(entity) {
            player.respawn_at = Some(respawn_at);
            player.pending.clear();
        }
    }

    fn respawn_if_due(&mut self, entity: EntityId) {
        let due = self
            .world
            .get::<Player>(entity)
            .and_then(|p| p.respawn_at)
            .is_some_and(|at| self.time >= at);
        if !due {
            return;
        }
        let position = self.pick_spawn_point();
        if let Some(player) = self.world.get_mut::<Player>(entity) {
            player.respawn_at = None;
        }
        let Some(character) = self.world.get_mut::<Character>(entity) else {
            return;
        };
        character.respawn(position);
        if let Some(collider) = character.collider() {
            self.collision
                .upsert(collider, character.bounds(), LayerMask::CHARACTER);
        }
        self.outbox
            .push(ReplicationEvent::Respawned { entity, position });
    }

    fn pick_spawn_point(&mut self) -> Vec3 {
        self.spawn_points
            .choose(&mut self.rng)
            .copied()
            .unwrap_or(Vec3::ZERO)
    }

    /// Continuous state of every character.
    pub fn character_snapshots(&self) -> Vec<CharacterSnapshot> {
        self.world
            .iter::<Character>()
            .map(|(id, c)| {
                let pose = c.pose();
                CharacterSnapshot {
                    id,
                    position: c.position(),
                    velocity: c.velocity(),
                    yaw: pose.body_yaw,
                    pitch: pose.view_pitch,
                    grounded: c.is_grounded(),
                    item_index: c.loadout().index(),
                    health: c.health().current,
                }
            })
            .collect()
    }

    /// Spawn packet for one player.
    pub fn spawn_message(&self, entity: EntityId) -> Option<EntitySpawn> {
        let player = self.world.get::<Player>(entity)?;
        let character = self.world.get::<Character>(entity)?;
        Some(EntitySpawn {
            id: entity,
            owner: player.owner,
            classname: "player".to_string(),
            position: character.position(),
            properties: vec![
                ("name".to_string(), player.name.clone()),
                ("item_index".to_string(), character.loadout().index().to_string()),
            ],
        })
    }

    /// Spawn packets for every player, in entity order.
    pub fn spawn_messages(&self) -> Vec<EntitySpawn> {
        self.world
            .iter::<Player>()
            .filter_map(|(id, _)| self.spawn_message(id))
            .collect()
    }

    /// Takes the replication events produced since the last call.
    pub fn drain_replication(&mut self) -> Vec<ReplicationEvent> {
        std::mem::take(&mut self.outbox)
    }
}
