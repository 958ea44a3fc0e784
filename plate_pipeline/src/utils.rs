use std::{
    thread,
    time::{Duration, Instant},
};

/// Paces a loop to a target rate by sleeping away whatever is left of each
/// frame period.
pub struct FpsLimiter {
    fps_control: Instant,
    fps_wait: Duration,
}

impl FpsLimiter {
    /// A rate of 0 disables the limit.
    pub fn new(fps: usize) -> Self {
        let fps_wait = match fps {
            0 => Duration::ZERO,
            fps => Duration::from_millis(1000 / fps as u64),
        };
        Self {
            fps_control: Instant::now(),
            fps_wait,
        }
    }

    pub fn period(&self) -> Duration {
        self.fps_wait
    }

    /// Sleeps until one period has passed since the previous call.
    pub fn wait(&mut self) {
        let elapsed = self.fps_control.elapsed();

        if self.fps_wait > elapsed {
            thread::sleep(self.fps_wait - elapsed);
        }
        self.fps_control = Instant::now();
    }
}
