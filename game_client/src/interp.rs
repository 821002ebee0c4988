//! Interpolation.
//!
//! The server sends discrete snapshots at tick boundaries.
//! The client renders at its own rate and interpolates remote characters.

use std::collections::VecDeque;

use game_shared::{
    ecs::EntityId,
    math::{delta_angle, Vec3},
    net::{CharacterSnapshot, Snapshot},
};

/// Interpolated pose of a remote character.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RemotePose {
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
}

/// Buffered snapshot history for interpolation.
#[derive(Default)]
pub struct SnapshotBuffer {
    history: VecDeque<Snapshot>,
    max: usize,
}

impl SnapshotBuffer {
    pub fn new(max: usize) -> Self {
        Self {
            history: VecDeque::new(),
            max,
        }
    }

    /// Adds a snapshot. Ones older than the newest buffered are ignored.
    pub fn push(&mut self, snap: Snapshot) -> bool {
        if self.history.back().is_some_and(|last| snap.tick <= last.tick) {
            return false;
        }
        self.history.push_back(snap);
        while self.history.len() > self.max {
            self.history.pop_front();
        }
        true
    }

    /// Returns the number of buffered snapshots.
    pub fn len(&self) -> usize {
        self.history.len()
    }

    /// Returns true if no snapshots are buffered.
    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Pose between the two newest snapshots.
    ///
    /// `alpha` should be in $[0,1]$ where 0 = older snapshot, 1 = newer.
    /// Yaw takes the short way around.
    pub fn interp_character(&self, entity: EntityId, alpha: f32) -> Option<RemotePose> {
        let b = find_character(self.history.back()?, entity)?;
        let a = self
            .history
            .len()
            .checked_sub(2)
            .and_then(|i| find_character(&self.history[i], entity))
            .unwrap_or(b);
        let alpha = alpha.clamp(0.0, 1.0);
        Some(RemotePose {
            position: a.position.lerp(b.position, alpha),
            yaw: a.yaw + delta_angle(a.yaw, b.yaw) * alpha,
            pitch: a.pitch + (b.pitch - a.pitch) * alpha,
        })
    }

    pub fn last_snapshot(&self) -> Option<&Snapshot> {
        self.history.back()
    }
}

/// Convenience: find a character in a snapshot.
pub fn find_character(snap: &Snapshot, id: EntityId) -> Option<&CharacterSnapshot> {
    snap.character(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(tick: u32, x: f32, yaw: f32) -> Snapshot {
        Snapshot {
            tick,
            ack_tick: None,
            characters: vec![CharacterSnapshot {
                id: EntityId(1),
                position: Vec3::new(x, 0.0, 0.0),
                velocity: Vec3::ZERO,
                yaw,
                pitch: 0.0,
                grounded: true,
                item_index: 0,
                health: 100.0,
            }],
        }
    }

    #[test]
    fn interpolates_position_and_short_way_yaw() {
        let mut buf = SnapshotBuffer::new(4);
        buf.push(snap(1, 0.0, 350.0));
        buf.push(snap(2, 2.0, 10.0));
        let pose = buf.interp_character(EntityId(1), 0.5).unwrap();
        assert!((pose.position.x - 1.0).abs() < 1e-6);
        assert!((pose.yaw - 360.0).abs() < 1e-4);
        assert!(buf.interp_character(EntityId(2), 0.5).is_none());
    }

    #[test]
    fn drops_out_of_order_and_caps_history() {
        let mut buf = SnapshotBuffer::new(2);
        assert!(buf.push(snap(5, 0.0, 0.0)));
        assert!(!buf.push(snap(4, 0.0, 0.0)));
        buf.push(snap(6, 0.0, 0.0));
        buf.push(snap(7, 0.0, 0.0));
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.last_snapshot().unwrap().tick, 7);
    }

    #[test]
    fn single_snapshot_holds_position() {
        let mut buf = SnapshotBuffer::new(4);
        buf.push(snap(1, 3.0, 0.0));
        let pose = buf.interp_character(EntityId(1), 0.7).unwrap();
        assert_eq!(pose.position.x, 3.0);
    }
}
