use std::time::{Duration, Instant};

/// Timing for one frame.
#[derive(Debug, Copy, Clone)]
pub struct FrameTime {
    /// Seconds since the previous tick, clamped.
    pub dt: f32,
    /// Seconds since the clock started (sum of clamped deltas).
    pub elapsed: f32,
    pub frame_index: u64,
}

/// Per-window frame clock.
///
/// Deltas are clamped so a stall (debugger, minimized window) does not make
/// the animation jump.
#[derive(Debug, Clone)]
pub struct FrameClock {
    last: Instant,
    elapsed: f32,
    frame_index: u64,
    dt_max: Duration,
    /// Exponential moving average of dt.
    smoothed_dt: f32,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::with_max_dt(Duration::from_millis(100))
    }

    pub fn with_max_dt(dt_max: Duration) -> Self {
        Self {
            last: Instant::now(),
            elapsed: 0.0,
            frame_index: 0,
            dt_max,
            smoothed_dt: 1.0 / 60.0,
        }
    }

    pub fn tick(&mut self) -> FrameTime {
        let now = Instant::now();
        let dt = now.saturating_duration_since(self.last).min(self.dt_max).as_secs_f32();
        self.last = now;
        self.elapsed += dt;
        self.smoothed_dt += (dt - self.smoothed_dt) * 0.05;

        let time = FrameTime {
            dt,
            elapsed: self.elapsed,
            frame_index: self.frame_index,
        };
        self.frame_index = self.frame_index.wrapping_add(1);
        time
    }

    /// Smoothed frames per second.
    pub fn fps(&self) -> f32 {
        if self.smoothed_dt > 0.0 { 1.0 / self.smoothed_dt } else { 0.0 }
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}
