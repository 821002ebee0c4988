//! Critically damped smoothing.
//!
//! Moves a value toward a target over roughly `time_constant` seconds while
//! carrying a hidden velocity between calls. Every step uses the elapsed time
//! of that tick so results do not depend on the tick rate.

use crate::math::delta_angle;

/// One critically damped step of `current` toward `target`.
///
/// `time_constant <= 0` snaps to the target. `dt <= 0` leaves `current`
/// untouched.
pub fn smooth_damp(
    current: f32,
    target: f32,
    velocity: &mut f32,
    time_constant: f32,
    dt: f32,
) -> f32 {
    if time_constant <= 0.0 {
        *velocity = 0.0;
        return target;
    }
    if dt <= 0.0 {
        return current;
    }

    let omega = 2.0 / time_constant;
    let x = omega * dt;
    let decay = 1.0 / (1.0 + x + 0.48 * x * x + 0.235 * x * x * x);

    let change = current - target;
    let temp = (*velocity + omega * change) * dt;
    *velocity = (*velocity - omega * temp) * decay;
    let mut output = target + (change + temp) * decay;

    // Never step past the target.
    if (target - current > 0.0) == (output > target) {
        output = target;
        *velocity = 0.0;
    }
    output
}

/// Same as [`smooth_damp`] for angles in degrees, taking the short way
/// around the ±180° seam.
///
/// The result is continuous with `current`, so it may leave [0, 360).
pub fn smooth_damp_angle(
    current: f32,
    target: f32,
    velocity: &mut f32,
    time_constant: f32,
    dt: f32,
) -> f32 {
    let unwrapped = current + delta_angle(current, target);
    smooth_damp(current, unwrapped, velocity, time_constant, dt)
}

/// Stateful scalar smoother.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SmoothScalar {
    pub current: f32,
    pub velocity: f32,
}

impl SmoothScalar {
    pub fn new(start: f32) -> Self {
        Self {
            current: start,
            velocity: 0.0,
        }
    }

    pub fn update(&mut self, target: f32, time_constant: f32, dt: f32) -> f32 {
        self.current = smooth_damp(self.current, target, &mut self.velocity, time_constant, dt);
        self.current
    }

    /// Overrides the value, keeping the velocity term.
    pub fn set_current(&mut self, value: f32) {
        self.current = value;
    }
}

/// Stateful angle smoother.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SmoothAngle {
    pub current: f32,
    pub velocity: f32,
}

impl SmoothAngle {
    pub fn new(start: f32) -> Self {
        Self {
            current: start,
            velocity: 0.0,
        }
    }

    pub fn update(&mut self, target: f32, time_constant: f32, dt: f32) -> f32 {
        self.current =
            smooth_damp_angle(self.current, target, &mut self.velocity, time_constant, dt);
        self.current
    }

    pub fn set_current(&mut self, value: f32) {
        self.current = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converges_monotonically() {
        for &tc in &[0.05f32, 0.1, 0.5] {
            let mut s = SmoothScalar::new(0.0);
            let dt = 1.0 / 60.0;
            let mut last_err = f32::MAX;
            let mut reached_at = None;
            for tick in 0..2000 {
                let v = s.update(10.0, tc, dt);
                let err = (v - 10.0).abs();
                assert!(err <= last_err + 1e-5, "error grew at tick {tick}");
                last_err = err;
                if err < 1e-3 && reached_at.is_none() {
                    reached_at = Some(tick);
                }
            }
            let reached = reached_at.expect("never converged");
            // Bounded by a multiple of the time constant.
            assert!((reached as f32) * dt < tc * 12.0, "tc={tc} took {reached} ticks");
        }
    }

    #[test]
    fn independent_of_tick_rate() {
        let mut fast = SmoothScalar::new(0.0);
        for _ in 0..120 {
            fast.update(1.0, 0.2, 1.0 / 120.0);
        }
        let mut slow = SmoothScalar::new(0.0);
        for _ in 0..30 {
            slow.update(1.0, 0.2, 1.0 / 30.0);
        }
        assert!((fast.current - slow.current).abs() < 0.02);
    }

    #[test]
    fn non_positive_time_constant_snaps() {
        let mut vel = 3.0;
        assert_eq!(smooth_damp(0.0, 5.0, &mut vel, 0.0, 0.016), 5.0);
        assert_eq!(vel, 0.0);
        assert_eq!(smooth_damp(0.0, -2.0, &mut vel, -1.0, 0.016), -2.0);
    }

    #[test]
    fn zero_dt_is_a_no_op() {
        let mut vel = 0.0;
        assert_eq!(smooth_damp(1.0, 5.0, &mut vel, 0.1, 0.0), 1.0);
    }

    #[test]
    fn angle_takes_short_path_across_seam() {
        let mut a = SmoothAngle::new(350.0);
        for _ in 0..300 {
            let v = a.update(10.0, 0.1, 1.0 / 60.0);
            // Moving up through 360, never back down through 180.
            assert!(v >= 350.0 - 1e-3 && v <= 370.0 + 1e-3, "went the long way: {v}");
        }
        assert!(delta_angle(a.current, 10.0).abs() < 1e-2);
    }
}
