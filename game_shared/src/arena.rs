//! Level geometry and spawn points.
//!
//! There is no level loader; an [`Arena`] is a square floor, optionally
//! walled in, plus the points players spawn at. Server and client build the
//! same arena so prediction collides with what the server collides with.

use crate::{
    math::Vec3,
    physics::{Aabb, CollisionWorld, LayerMask},
};

const WALL_THICKNESS: f32 = 1.0;

/// Static collision and spawn points.
#[derive(Debug, Clone)]
pub struct Arena {
    pub collision: CollisionWorld,
    pub spawn_points: Vec<Vec3>,
}

impl Arena {
    /// Floor only, top face at y = 0.
    pub fn flat(half_extent: f32, spawn_points: Vec<Vec3>) -> Self {
        Self {
            collision: CollisionWorld::with_floor(0.0, half_extent),
            spawn_points,
        }
    }

    /// Floor surrounded by four walls of `wall_height`.
    pub fn walled(half_extent: f32, wall_height: f32, spawn_points: Vec<Vec3>) -> Self {
        let mut arena = Self::flat(half_extent, spawn_points);
        let (h, t) = (half_extent, WALL_THICKNESS);
        let walls = [
            Aabb::new(Vec3::new(-h - t, 0.0, -h), Vec3::new(-h, wall_height, h)),
            Aabb::new(Vec3::new(h, 0.0, -h), Vec3::new(h + t, wall_height, h)),
            Aabb::new(Vec3::new(-h, 0.0, -h - t), Vec3::new(h, wall_height, -h)),
            Aabb::new(Vec3::new(-h, 0.0, h), Vec3::new(h, wall_height, h + t)),
        ];
        for wall in walls {
            arena.collision.insert(wall, LayerMask::WALL);
        }
        arena
    }
}

impl Default for Arena {
    fn default() -> Self {
        let spawns = [(-8.0, -8.0), (8.0, -8.0), (-8.0, 8.0), (8.0, 8.0)]
            .into_iter()
            .map(|(x, z)| Vec3::new(x, 0.0, z))
            .collect();
        Self::walled(20.0, 4.0, spawns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::CollisionQuery;

    #[test]
    fn walls_block_rays_leaving_the_floor() {
        let arena = Arena::default();
        let hit = arena
            .collision
            .raycast(
                Vec3::new(0.0, 1.0, 0.0),
                Vec3::new(1.0, 0.0, 0.0),
                100.0,
                LayerMask::SOLID,
                None,
            )
            .unwrap();
        assert!((hit.distance - 20.0).abs() < 1e-4);
        assert_eq!(hit.normal, Vec3::new(-1.0, 0.0, 0.0));
        assert_eq!(arena.spawn_points.len(), 4);
    }
}
