//! Time management utilities

use std::time::Instant;

/// High-precision timer for frame timing
pub struct Timer {
    last_frame: Instant,
    delta_time: f32,
    total_time: f32,
    frame_count: u64,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer {
    /// Create a new timer
    pub fn new() -> Self {
        Self {
            last_frame: Instant::now(),
            delta_time: 0.0,
            total_time: 0.0,
            frame_count: 0,
        }
    }

    /// Update the timer (should be called once per frame)
    pub fn update(&mut self) {
        let now = Instant::now();
        self.delta_time = now.duration_since(self.last_frame).as_secs_f32();
        self.total_time += self.delta_time;
        self.last_frame = now;
        self.frame_count += 1;
    }

    /// Get the time since the last frame in seconds
    pub fn delta_time(&self) -> f32 {
        self.delta_time
    }

    /// Get the total elapsed time since timer creation
    pub fn total_time(&self) -> f32 {
        self.total_time
    }

    /// Get the current frame count
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

/// Fixed-step accumulator used to drive the physics simulation
///
/// Variable frame deltas are accumulated and consumed in `step` sized
/// slices, never more than `max_sub_steps` per frame so a long hitch cannot
/// spiral into ever longer frames.
#[derive(Debug, Clone)]
pub struct FixedStep {
    step: f32,
    max_sub_steps: u32,
    accumulator: f32,
}

impl FixedStep {
    /// Create an accumulator with the given step length and sub-step cap
    pub fn new(step: f32, max_sub_steps: u32) -> Self {
        Self {
            step: step.max(f32::EPSILON),
            max_sub_steps: max_sub_steps.max(1),
            accumulator: 0.0,
        }
    }

    /// Step length in seconds
    pub fn step(&self) -> f32 {
        self.step
    }

    /// Feed a frame delta and return how many fixed steps should run
    pub fn advance(&mut self, delta_time: f32) -> u32 {
        self.accumulator += delta_time.max(0.0);

        let mut steps = 0;
        while self.accumulator >= self.step && steps < self.max_sub_steps {
            self.accumulator -= self.step;
            steps += 1;
        }

        if steps == self.max_sub_steps {
            // Drop the backlog rather than carrying it into the next frame
            self.accumulator = self.accumulator.min(self.step);
        }

        steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_step_accumulates() {
        let mut fixed = FixedStep::new(0.01, 10);
        assert_eq!(fixed.advance(0.005), 0);
        assert_eq!(fixed.advance(0.006), 1);
        assert_eq!(fixed.advance(0.03), 3);
    }

    #[test]
    fn test_fixed_step_caps_sub_steps() {
        let mut fixed = FixedStep::new(0.01, 4);
        assert_eq!(fixed.advance(1.0), 4);
        assert!(fixed.advance(0.0) <= 1);
    }
}
