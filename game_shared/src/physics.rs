//! Collision query abstraction.
//!
//! Shape overlap, capsule sweep and raycast are the only physics questions
//! gameplay code asks. [`CollisionWorld`] answers them against a flat set of
//! axis-aligned boxes, which is enough for the dedicated server and tests;
//! an engine integration would implement [`CollisionQuery`] itself.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::math::Vec3;

/// Opaque collider id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColliderId(pub u32);

bitflags::bitflags! {
    /// Collision layers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct LayerMask: u32 {
        const GROUND = 1 << 0;
        const WALL = 1 << 1;
        const CHARACTER = 1 << 2;
        const SOLID = Self::GROUND.bits() | Self::WALL.bits();
    }
}

/// Axis-aligned box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn from_center(center: Vec3, half: Vec3) -> Self {
        Self::new(center - half, center + half)
    }

    pub fn expand(self, half: Vec3) -> Self {
        Self::new(self.min - half, self.max + half)
    }

    pub fn closest_point(&self, p: Vec3) -> Vec3 {
        Vec3::new(
            p.x.clamp(self.min.x, self.max.x),
            p.y.clamp(self.min.y, self.max.y),
            p.z.clamp(self.min.z, self.max.z),
        )
    }

    pub fn overlaps_sphere(&self, center: Vec3, radius: f32) -> bool {
        (self.closest_point(center) - center).len_sq() <= radius * radius
    }

    /// Slab test. Returns entry distance and surface normal; an origin
    /// inside the box hits at distance zero facing back along the ray.
    pub fn ray_hit(&self, origin: Vec3, dir: Vec3, max_distance: f32) -> Option<(f32, Vec3)> {
        let o = [origin.x, origin.y, origin.z];
        let d = [dir.x, dir.y, dir.z];
        let lo = [self.min.x, self.min.y, self.min.z];
        let hi = [self.max.x, self.max.y, self.max.z];

        let mut t_enter = f32::NEG_INFINITY;
        let mut t_exit = f32::INFINITY;
        let mut enter_axis = None;
        let mut enter_sign = 0.0;

        for axis in 0..3 {
            if d[axis].abs() < 1e-8 {
                if o[axis] < lo[axis] || o[axis] > hi[axis] {
                    return None;
                }
                continue;
            }
            let inv = 1.0 / d[axis];
            let (mut t0, mut t1) = ((lo[axis] - o[axis]) * inv, (hi[axis] - o[axis]) * inv);
            let mut sign = -1.0;
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
                sign = 1.0;
            }
            if t0 > t_enter {
                t_enter = t0;
                enter_axis = Some(axis);
                enter_sign = sign;
            }
            t_exit = t_exit.min(t1);
            if t_enter > t_exit {
                return None;
            }
        }

        if t_exit < 0.0 {
            return None;
        }
        if t_enter <= 0.0 {
            return Some((0.0, -dir.normalize_or_zero()));
        }
        if t_enter > max_distance {
            return None;
        }
        let normal = match enter_axis {
            Some(0) => Vec3::new(enter_sign, 0.0, 0.0),
            Some(1) => Vec3::new(0.0, enter_sign, 0.0),
            _ => Vec3::new(0.0, 0.0, enter_sign),
        };
        Some((t_enter, normal))
    }
}

/// Upright capsule described by its center.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Capsule {
    pub center: Vec3,
    pub radius: f32,
    pub half_height: f32,
}

impl Capsule {
    /// Box around the cylindrical section, excluding the end caps.
    fn core_half_extents(&self) -> Vec3 {
        let core = (self.half_height - self.radius).max(0.0);
        Vec3::new(self.radius, core, self.radius)
    }

    pub fn bounds(&self) -> Aabb {
        Aabb::from_center(
            self.center,
            Vec3::new(self.radius, self.half_height, self.radius),
        )
    }
}

/// Result of a raycast.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RayHit {
    pub collider: ColliderId,
    pub point: Vec3,
    pub normal: Vec3,
    pub distance: f32,
}

/// Physics query capability.
pub trait CollisionQuery: Send + Sync {
    /// Colliders in `mask` touching the sphere.
    fn overlap_sphere(&self, center: Vec3, radius: f32, mask: LayerMask) -> Vec<ColliderId>;

    /// Colliders in `mask` hit by moving `capsule` along `dir` for `distance`.
    fn capsule_sweep(
        &self,
        capsule: Capsule,
        dir: Vec3,
        distance: f32,
        mask: LayerMask,
    ) -> Vec<ColliderId>;

    /// Closest collider in `mask` along the ray, skipping `ignore`.
    fn raycast(
        &self,
        origin: Vec3,
        dir: Vec3,
        max_distance: f32,
        mask: LayerMask,
        ignore: Option<ColliderId>,
    ) -> Option<RayHit>;
}

#[derive(Debug, Clone, Copy)]
struct Collider {
    bounds: Aabb,
    layer: LayerMask,
}

/// Box-set collision world.
#[derive(Debug, Default, Clone)]
pub struct CollisionWorld {
    next_id: u32,
    colliders: BTreeMap<ColliderId, Collider>,
}

impl CollisionWorld {
    pub fn new() -> Self {
        Self::default()
    }

    /// A world with a single square floor whose top face is at `top_y`.
    pub fn with_floor(top_y: f32, half_extent: f32) -> Self {
        let mut world = Self::new();
        world.insert(
            Aabb::new(
                Vec3::new(-half_extent, top_y - 1.0, -half_extent),
                Vec3::new(half_extent, top_y, half_extent),
            ),
            LayerMask::GROUND,
        );
        world
    }

    /// Reserves an id without placing a collider.
    pub fn allocate_id(&mut self) -> ColliderId {
        let id = ColliderId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn insert(&mut self, bounds: Aabb, layer: LayerMask) -> ColliderId {
        let id = self.allocate_id();
        self.colliders.insert(id, Collider { bounds, layer });
        id
    }

    /// Inserts or moves a collider under a known id.
    pub fn upsert(&mut self, id: ColliderId, bounds: Aabb, layer: LayerMask) {
        self.colliders.insert(id, Collider { bounds, layer });
    }

    pub fn remove(&mut self, id: ColliderId) -> bool {
        self.colliders.remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.colliders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colliders.is_empty()
    }

    fn matching(&self, mask: LayerMask) -> impl Iterator<Item = (ColliderId, &Collider)> {
        self.colliders
            .iter()
            .filter(move |(_, c)| c.layer.intersects(mask))
            .map(|(id, c)| (*id, c))
    }
}

impl CollisionQuery for CollisionWorld {
    fn overlap_sphere(&self, center: Vec3, radius: f32, mask: LayerMask) -> Vec<ColliderId> {
        self.matching(mask)
            .filter(|(_, c)| c.bounds.overlaps_sphere(center, radius))
            .map(|(id, _)| id)
            .collect()
    }

    fn capsule_sweep(
        &self,
        capsule: Capsule,
        dir: Vec3,
        distance: f32,
        mask: LayerMask,
    ) -> Vec<ColliderId> {
        let dir = dir.normalize_or_zero();
        let half = capsule.core_half_extents();
        self.matching(mask)
            .filter(|(_, c)| {
                c.bounds
                    .expand(half)
                    .ray_hit(capsule.center, dir, distance)
                    .is_some()
            })
            .map(|(id, _)| id)
            .collect()
    }

    fn raycast(
        &self,
        origin: Vec3,
        dir: Vec3,
        max_distance: f32,
        mask: LayerMask,
        ignore: Option<ColliderId>,
    ) -> Option<RayHit> {
        let dir = dir.normalize_or_zero();
        if dir == Vec3::ZERO {
            return None;
        }
        self.matching(mask)
            .filter(|(id, _)| Some(*id) != ignore)
            .filter_map(|(id, c)| {
                c.bounds
                    .ray_hit(origin, dir, max_distance)
                    .map(|(t, normal)| RayHit {
                        collider: id,
                        point: origin + dir * t,
                        normal,
                        distance: t,
                    })
            })
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    }
}

/// How the integrator's output reaches the body.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BodyCommand {
    /// Add this to the linear velocity (rigid body, velocity-change force).
    VelocityChange(Vec3),
    /// Move by this displacement this tick (kinematic capsule).
    KinematicMove(Vec3),
}

/// Minimal body: feet position and linear velocity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Body {
    pub position: Vec3,
    pub velocity: Vec3,
}

/// Tallest ledge [`Body::settle`] will lift a body onto.
const SETTLE_STEP: f32 = 0.5;
/// Gap below the feet a descending body is pulled across onto ground.
const SETTLE_SNAP: f32 = 0.2;

impl Body {
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            velocity: Vec3::ZERO,
        }
    }

    pub fn apply(&mut self, command: BodyCommand, dt: f32) {
        match command {
            BodyCommand::VelocityChange(delta) => {
                self.velocity += delta;
                self.position += self.velocity * dt;
            }
            BodyCommand::KinematicMove(displacement) => {
                self.position += displacement;
                if dt > 0.0 {
                    self.velocity = displacement * (1.0 / dt);
                }
            }
        }
    }

    /// Rests the feet on ground directly below.
    ///
    /// A body that sank into a ground box is lifted out of it. A body that is
    /// not rising and hovers within [`SETTLE_SNAP`] of ground is put down on
    /// it. Returns true when the body ends up resting on ground.
    pub fn settle(&mut self, world: &dyn CollisionQuery, ignore: Option<ColliderId>) -> bool {
        let from = self.position + Vec3::new(0.0, SETTLE_STEP, 0.0);
        let Some(hit) = world.raycast(
            from,
            -Vec3::UP,
            SETTLE_STEP + SETTLE_SNAP,
            LayerMask::GROUND,
            ignore,
        ) else {
            return false;
        };
        if hit.normal.y <= 0.0 {
            return false;
        }
        let sunk = self.position.y <= hit.point.y;
        if sunk || self.velocity.y <= 0.0 {
            self.position.y = hit.point.y;
            if self.velocity.y < 0.0 {
                self.velocity.y = 0.0;
            }
            return true;
        }
        false
    }
}
