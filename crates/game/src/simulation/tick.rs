use std::time::Duration;

/// Longest wall-clock step absorbed at once; anything beyond is dropped so a
/// stall does not trigger a burst of catch-up frames.
const MAX_FRAME_TIME: f32 = 0.25;

/// Accumulator-driven fixed-step clock.
#[derive(Debug, Clone)]
pub struct FixedTimestep {
    tick_rate: u32,
    dt: f32,
    accumulator: f32,
    frame: i32,
}

impl FixedTimestep {
    pub fn new(tick_rate: u32) -> Self {
        let tick_rate = tick_rate.max(1);
        Self {
            tick_rate,
            dt: 1.0 / tick_rate as f32,
            accumulator: 0.0,
            frame: 0,
        }
    }

    pub fn tick_rate(&self) -> u32 {
        self.tick_rate
    }

    pub fn dt(&self) -> f32 {
        self.dt
    }

    pub fn step_duration(&self) -> Duration {
        Duration::from_secs_f32(self.dt)
    }

    /// Frame the next consumed tick will simulate.
    pub fn frame(&self) -> i32 {
        self.frame
    }

    pub fn set_frame(&mut self, frame: i32) {
        self.frame = frame;
    }

    pub fn accumulate(&mut self, delta: f32) {
        self.accumulator += delta.clamp(0.0, MAX_FRAME_TIME);
    }

    pub fn should_tick(&self) -> bool {
        self.accumulator >= self.dt
    }

    /// Consumes one step if enough time has accumulated and returns the
    /// frame it covers.
    pub fn consume_tick(&mut self) -> Option<i32> {
        if self.accumulator < self.dt {
            return None;
        }
        self.accumulator -= self.dt;
        let frame = self.frame;
        self.frame = self.frame.wrapping_add(1);
        Some(frame)
    }

    /// Fraction of a step accumulated past the last consumed frame, 0-1.
    pub fn alpha(&self) -> f32 {
        (self.accumulator / self.dt).clamp(0.0, 1.0)
    }

    /// Fractional frame for rendering: the last simulated frame plus `alpha`.
    pub fn render_time(&self) -> f64 {
        (self.frame - 1) as f64 + self.alpha() as f64
    }

    pub fn reset(&mut self) {
        self.accumulator = 0.0;
    }
}
