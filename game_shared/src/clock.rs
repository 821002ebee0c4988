//! Fixed-step accumulator.
//!
//! Render frames arrive at a variable rate; physics runs at a fixed step.
//! Each frame reports its elapsed time and gets back how many physics ticks
//! to run before rendering.

/// Accumulates frame time into fixed physics steps.
#[derive(Debug, Clone)]
pub struct FixedStep {
    step: f32,
    accumulator: f32,
    max_steps: u32,
    elapsed: f64,
}

impl FixedStep {
    pub fn new(step: f32) -> Self {
        Self {
            step,
            accumulator: 0.0,
            max_steps: 8,
            elapsed: 0.0,
        }
    }

    pub fn from_hz(hz: u32) -> Self {
        Self::new(1.0 / hz.max(1) as f32)
    }

    pub fn step(&self) -> f32 {
        self.step
    }

    /// Simulation time covered by the ticks handed out so far.
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    /// Adds a frame and returns the number of physics ticks due.
    ///
    /// Backlog beyond `max_steps` ticks is dropped so a long stall cannot
    /// snowball into ever longer frames.
    pub fn advance(&mut self, frame_dt: f32) -> u32 {
        if frame_dt > 0.0 {
            self.accumulator += frame_dt;
        }
        let mut ticks = 0;
        while self.accumulator >= self.step && ticks < self.max_steps {
            self.accumulator -= self.step;
            ticks += 1;
        }
        if ticks == self.max_steps {
            self.accumulator = self.accumulator.min(self.step);
        }
        self.elapsed += ticks as f64 * self.step as f64;
        ticks
    }

    /// Fraction of a step left in the accumulator, for interpolation.
    pub fn alpha(&self) -> f32 {
        (self.accumulator / self.step).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_faster_than_physics() {
        let mut clock = FixedStep::new(0.02);
        let ticks: u32 = (0..10).map(|_| clock.advance(0.005)).sum();
        assert_eq!(ticks, 2);
        assert!(clock.alpha() < 1.0);
    }

    #[test]
    fn long_frame_runs_several_ticks_capped() {
        let mut clock = FixedStep::new(0.02);
        assert_eq!(clock.advance(0.065), 3);
        assert_eq!(clock.advance(10.0), 8);
        assert!(clock.alpha() <= 1.0);
    }
}
