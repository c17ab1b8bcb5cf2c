/// Linear tempo transition, evaluated by the maintenance task.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempoRamp {
    from: f64,
    to: f64,
    started_at: f64,
    duration: f64,
}

impl TempoRamp {
    pub fn new(from: f64, to: f64, started_at: f64, duration: f64) -> Self {
        Self {
            from,
            to,
            started_at,
            duration: duration.max(f64::EPSILON),
        }
    }

    pub fn target(&self) -> f64 {
        self.to
    }

    pub fn bpm_at(&self, now: f64) -> f64 {
        let progress = ((now - self.started_at) / self.duration).clamp(0.0, 1.0);
        self.from + (self.to - self.from) * progress
    }

    pub fn is_finished(&self, now: f64) -> bool {
        now - self.started_at >= self.duration
    }
}
