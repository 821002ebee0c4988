//! Short-lived impact markers.

use std::collections::VecDeque;

use game_shared::math::Vec3;

/// Seconds an impact marker stays visible.
pub const HIT_EFFECT_LIFETIME: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitEffect {
    pub point: Vec3,
    pub normal: Vec3,
    pub expires_at: f64,
}

/// Live impact markers, oldest first.
#[derive(Debug, Default)]
pub struct HitEffects {
    live: VecDeque<HitEffect>,
}

impl HitEffects {
    pub fn spawn(&mut self, point: Vec3, normal: Vec3, now: f64) {
        self.live.push_back(HitEffect {
            point,
            normal,
            expires_at: now + HIT_EFFECT_LIFETIME,
        });
    }

    /// Drops markers whose lifetime ran out. Returns how many went.
    pub fn expire(&mut self, now: f64) -> usize {
        let before = self.live.len();
        // Same lifetime for all, so expiry order is spawn order.
        while self.live.front().is_some_and(|e| now >= e.expires_at) {
            self.live.pop_front();
        }
        before - self.live.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HitEffect> {
        self.live.iter()
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}
