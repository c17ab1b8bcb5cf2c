use std::collections::VecDeque;

/// Raw intervals kept for smoothing and the accuracy report (4 beats at 24 PPQ).
pub const HISTORY_LEN: usize = 96;
/// Intervals averaged by the smoother.
pub const SMOOTHING_WINDOW: usize = 8;

const AVERAGE_WEIGHT: f64 = 0.7;
const CURRENT_WEIGHT: f64 = 0.3;

/// Jitter statistics over the buffered raw intervals.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AccuracyReport {
    pub avg_interval: f64,
    pub interval_variance: f64,
    pub max_jitter: f64,
    pub avg_jitter: f64,
    /// 1.0 is a perfectly steady clock, 0.0 is unusable (or no data).
    pub stability_score: f64,
}

/// Smooths raw inter-pulse intervals.
#[derive(Debug)]
pub struct PulseFilter {
    intervals: VecDeque<f64>,
    capacity: usize,
    window_sum: f64,
}

impl Default for PulseFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl PulseFilter {
    pub fn new() -> Self {
        Self::with_capacity(HISTORY_LEN)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(SMOOTHING_WINDOW);
        Self {
            intervals: VecDeque::with_capacity(capacity),
            capacity,
            window_sum: 0.0,
        }
    }

    /// Pushes a raw interval (seconds) and returns the smoothed interval.
    pub fn push(&mut self, raw: f64) -> f64 {
        // The running sum covers the newest SMOOTHING_WINDOW entries; drop the
        // one about to leave that window before pushing.
        if self.intervals.len() >= SMOOTHING_WINDOW {
            let leaving = self.intervals[self.intervals.len() - SMOOTHING_WINDOW];
            self.window_sum -= leaving;
        }
        if self.intervals.len() == self.capacity {
            self.intervals.pop_front();
        }
        self.intervals.push_back(raw);
        self.window_sum += raw;

        let window = self.intervals.len().min(SMOOTHING_WINDOW);
        let average = self.window_sum / window as f64;
        AVERAGE_WEIGHT * average + CURRENT_WEIGHT * raw
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn last_interval(&self) -> Option<f64> {
        self.intervals.back().copied()
    }

    pub fn reset(&mut self) {
        self.intervals.clear();
        self.window_sum = 0.0;
    }

    pub fn report(&self) -> AccuracyReport {
        if self.intervals.is_empty() {
            return AccuracyReport::default();
        }

        let n = self.intervals.len() as f64;
        let avg = self.intervals.iter().sum::<f64>() / n;
        let variance = self
            .intervals
            .iter()
            .map(|i| (i - avg).powi(2))
            .sum::<f64>()
            / n;
        let deviations = self.intervals.iter().map(|i| (i - avg).abs());
        let max_jitter = deviations.clone().fold(0.0, f64::max);
        let avg_jitter = deviations.sum::<f64>() / n;

        let stability_score = if avg > 0.0 {
            (1.0 - 10.0 * variance.sqrt() / avg).clamp(0.0, 1.0)
        } else {
            0.0
        };

        AccuracyReport {
            avg_interval: avg,
            interval_variance: variance,
            max_jitter,
            avg_jitter,
            stability_score,
        }
    }
}
