//! Weapons, loadout and health.
//!
//! Firing and reloading are gated by deadlines compared against simulation
//! time; nothing here blocks or sleeps. Callers pass `now` in seconds.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Static weapon description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GunInfo {
    pub name: String,
    pub damage: f32,
    /// Shots per second.
    pub fire_rate: f32,
    pub max_ammo: u32,
    /// Seconds.
    pub reload_time: f32,
    pub range: f32,
}

impl GunInfo {
    pub fn rifle() -> Self {
        Self {
            name: "rifle".to_string(),
            damage: 25.0,
            fire_rate: 8.0,
            max_ammo: 15,
            reload_time: 4.0,
            range: 200.0,
        }
    }

    pub fn pistol() -> Self {
        Self {
            name: "pistol".to_string(),
            damage: 15.0,
            fire_rate: 4.0,
            max_ammo: 8,
            reload_time: 1.5,
            range: 100.0,
        }
    }

    fn fire_interval(&self) -> f64 {
        if self.fire_rate > 0.0 {
            1.0 / self.fire_rate as f64
        } else {
            f64::INFINITY
        }
    }
}

/// Why a trigger pull did not fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireBlocked {
    Reloading,
    Cooldown,
    /// Magazine empty; a reload was started.
    Empty,
    NoWeapon,
}

/// A shot that left the barrel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Shot {
    pub damage: f32,
    pub range: f32,
    pub ammo_left: u32,
}

/// Notifications from [`Gun::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeaponEvent {
    ReloadStarted,
    Reloaded { ammo: u32 },
}

/// One weapon's ammo and timers.
#[derive(Debug, Clone, PartialEq)]
pub struct Gun {
    pub info: GunInfo,
    ammo: u32,
    next_fire: f64,
    reload_done_at: Option<f64>,
}

impl Gun {
    pub fn new(info: GunInfo) -> Self {
        let ammo = info.max_ammo;
        Self {
            info,
            ammo,
            next_fire: 0.0,
            reload_done_at: None,
        }
    }

    pub fn ammo(&self) -> u32 {
        self.ammo
    }

    pub fn is_reloading(&self) -> bool {
        self.reload_done_at.is_some()
    }

    /// Attempts one shot at time `now`. An empty magazine starts a reload.
    pub fn try_fire(&mut self, now: f64) -> Result<Shot, FireBlocked> {
        if self.is_reloading() {
            return Err(FireBlocked::Reloading);
        }
        if self.ammo == 0 {
            self.start_reload(now);
            return Err(FireBlocked::Empty);
        }
        if now < self.next_fire {
            return Err(FireBlocked::Cooldown);
        }
        self.next_fire = now + self.info.fire_interval();
        self.ammo -= 1;
        Ok(Shot {
            damage: self.info.damage,
            range: self.info.range,
            ammo_left: self.ammo,
        })
    }

    /// Starts a reload unless one is running or the magazine is full.
    pub fn start_reload(&mut self, now: f64) -> bool {
        if self.is_reloading() || self.ammo >= self.info.max_ammo {
            return false;
        }
        self.reload_done_at = Some(now + self.info.reload_time as f64);
        debug!(gun = %self.info.name, until = now + self.info.reload_time as f64, "Reloading");
        true
    }

    pub fn cancel_reload(&mut self) {
        self.reload_done_at = None;
    }

    /// Completes a reload whose deadline has passed, or starts one when the
    /// magazine ran dry.
    pub fn tick(&mut self, now: f64) -> Option<WeaponEvent> {
        let pending = self.reload_done_at;
        match pending {
            Some(done) if now >= done => {
                self.reload_done_at = None;
                self.ammo = self.info.max_ammo;
                Some(WeaponEvent::Reloaded { ammo: self.ammo })
            }
            None if self.ammo == 0 && self.start_reload(now) => {
                Some(WeaponEvent::ReloadStarted)
            }
            _ => None,
        }
    }
}

/// Reasons an equip request was ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EquipError {
    OutOfRange,
    AlreadyEquipped,
}

/// Carried weapons and the equipped index.
#[derive(Debug, Clone, PartialEq)]
pub struct Loadout {
    guns: Vec<Gun>,
    index: usize,
}

impl Loadout {
    pub fn new(infos: &[GunInfo]) -> Self {
        Self {
            guns: infos.iter().cloned().map(Gun::new).collect(),
            index: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.guns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guns.is_empty()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn active(&self) -> Option<&Gun> {
        self.guns.get(self.index)
    }

    pub fn active_mut(&mut self) -> Option<&mut Gun> {
        self.guns.get_mut(self.index)
    }

    /// Switches weapons. A reload in progress on the holstered gun is dropped.
    pub fn equip(&mut self, index: usize) -> Result<usize, EquipError> {
        if index >= self.guns.len() {
            return Err(EquipError::OutOfRange);
        }
        if index == self.index {
            return Err(EquipError::AlreadyEquipped);
        }
        if let Some(gun) = self.active_mut() {
            gun.cancel_reload();
        }
        self.index = index;
        Ok(index)
    }

    /// Scroll-wheel selection, wrapping at both ends.
    pub fn cycle(&mut self, scroll: f32) -> Option<usize> {
        let len = self.guns.len();
        if len < 2 || scroll == 0.0 {
            return None;
        }
        let next = if scroll > 0.0 {
            (self.index + 1) % len
        } else {
            (self.index + len - 1) % len
        };
        self.equip(next).ok()
    }

    pub fn reset(&mut self) {
        for gun in &mut self.guns {
            *gun = Gun::new(gun.info.clone());
        }
        self.index = 0;
    }
}

/// Result of applying damage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DamageOutcome {
    Survived { remaining: f32 },
    Died,
    AlreadyDead,
}

/// Hit points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Health {
    pub current: f32,
    pub max: f32,
}

impl Health {
    pub fn new(max: f32) -> Self {
        Self { current: max, max }
    }

    pub fn is_dead(&self) -> bool {
        self.current <= 0.0
    }

    /// Fill ratio for a health bar.
    pub fn fraction(&self) -> f32 {
        if self.max > 0.0 {
            (self.current / self.max).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    pub fn apply_damage(&mut self, amount: f32) -> DamageOutcome {
        if self.is_dead() {
            return DamageOutcome::AlreadyDead;
        }
        self.current -= amount.max(0.0);
        if self.is_dead() {
            DamageOutcome::Died
        } else {
            DamageOutcome::Survived {
                remaining: self.current,
            }
        }
    }

    pub fn kill(&mut self) -> DamageOutcome {
        self.apply_damage(self.current.max(0.0) + 1.0)
    }

    pub fn reset(&mut self) {
        self.current = self.max;
    }
}
