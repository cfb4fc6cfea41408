/// Fixed-rate frame gate driven by the main loop's elapsed time.
#[derive(Debug, Clone)]
pub struct CaptureClock {
    interval: f64,
    accum: f64,
}

const ROLLOVER_TOLERANCE: f64 = 1e-6;

impl CaptureClock {
    pub fn new(fps: f32) -> Self {
        Self {
            interval: 1.0 / f64::from(fps.max(1.0)),
            accum: 0.0,
        }
    }

    pub fn interval_secs(&self) -> f64 {
        self.interval
    }

    pub fn reset(&mut self) {
        self.accum = 0.0;
    }

    /// Adds `dt` seconds and returns how many frames are due.
    pub fn advance(&mut self, dt: f64) -> usize {
        self.accum += dt.max(0.0);
        let mut due = 0;
        while self.accum + ROLLOVER_TOLERANCE >= self.interval {
            self.accum -= self.interval;
            due += 1;
        }
        due
    }
}
