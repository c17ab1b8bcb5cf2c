use crate::config::{MAX_BPM, MIN_BPM};
use log::debug;
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

/// Consecutive accepted intervals needed before sync can be declared.
pub const SYNC_WINDOW: usize = 24;
/// Maximum variance (seconds²) of the smoothed intervals in the sync window.
pub const SYNC_VARIANCE: f64 = 0.001;

const NOISE_BAND: f64 = 0.5;
const DRIFT_LIMIT: f64 = 10.0;
const DRIFT_PULL: f64 = 0.05;

/// What to do when the detected tempo is 10 BPM or more away from the
/// applied one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LargeJumpPolicy {
    /// Adopt the detected tempo immediately.
    #[default]
    Relock,
    /// Leave the applied tempo alone.
    Ignore,
}

impl fmt::Display for LargeJumpPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LargeJumpPolicy::Relock => write!(f, "relock"),
            LargeJumpPolicy::Ignore => write!(f, "ignore"),
        }
    }
}

impl FromStr for LargeJumpPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "relock" => Ok(LargeJumpPolicy::Relock),
            "ignore" => Ok(LargeJumpPolicy::Ignore),
            other => Err(format!("unknown large jump policy '{}'", other)),
        }
    }
}

/// Result of feeding one smoothed interval to the estimator.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TempoUpdate {
    /// Set when a quarter note worth of pulses completed.
    pub detected_bpm: Option<f64>,
    /// Set when the applied tempo should change.
    pub applied_bpm: Option<f64>,
    /// Set when the synced flag flipped.
    pub sync_changed: Option<bool>,
}

/// Estimates tempo from smoothed pulse intervals.
#[derive(Debug)]
pub struct TempoEstimator {
    ppq: u32,
    policy: LargeJumpPolicy,
    quarter_sum: f64,
    quarter_count: u32,
    sync_window: VecDeque<f64>,
    consecutive: usize,
    detected_bpm: Option<f64>,
    synced: bool,
}

impl TempoEstimator {
    pub fn new(ppq: u32, policy: LargeJumpPolicy) -> Self {
        Self {
            ppq: ppq.max(1),
            policy,
            quarter_sum: 0.0,
            quarter_count: 0,
            sync_window: VecDeque::with_capacity(SYNC_WINDOW),
            consecutive: 0,
            detected_bpm: None,
            synced: false,
        }
    }

    pub fn is_synced(&self) -> bool {
        self.synced
    }

    pub fn detected_bpm(&self) -> Option<f64> {
        self.detected_bpm
    }

    pub fn observe(&mut self, smoothed: f64, applied_bpm: f64) -> TempoUpdate {
        let mut update = TempoUpdate::default();

        if self.sync_window.len() == SYNC_WINDOW {
            self.sync_window.pop_front();
        }
        self.sync_window.push_back(smoothed);
        self.consecutive = self.consecutive.saturating_add(1);

        let synced = self.consecutive >= SYNC_WINDOW && self.window_variance() < SYNC_VARIANCE;
        if synced != self.synced {
            self.synced = synced;
            update.sync_changed = Some(synced);
        }

        self.quarter_sum += smoothed;
        self.quarter_count += 1;
        if self.quarter_count >= self.ppq {
            let avg = self.quarter_sum / f64::from(self.quarter_count);
            self.quarter_sum = 0.0;
            self.quarter_count = 0;

            if avg > 0.0 {
                let detected = 60.0 / (avg * f64::from(self.ppq));
                self.detected_bpm = Some(detected);
                update.detected_bpm = Some(detected);
                update.applied_bpm = correct_tempo(applied_bpm, detected, self.policy);
                debug!(
                    "Detected {:.2} BPM against applied {:.2} BPM, correction: {:?}",
                    detected, applied_bpm, update.applied_bpm
                );
            }
        }

        update
    }

    /// Forgets the sync and quarter-note windows. Returns true if we were synced.
    pub fn drop_out(&mut self) -> bool {
        let was_synced = self.synced;
        self.synced = false;
        self.consecutive = 0;
        self.sync_window.clear();
        self.quarter_sum = 0.0;
        self.quarter_count = 0;
        was_synced
    }

    pub fn reset(&mut self) {
        self.drop_out();
        self.detected_bpm = None;
    }

    fn window_variance(&self) -> f64 {
        let n = self.sync_window.len() as f64;
        if n == 0.0 {
            return f64::INFINITY;
        }
        let mean = self.sync_window.iter().sum::<f64>() / n;
        self.sync_window
            .iter()
            .map(|i| (i - mean).powi(2))
            .sum::<f64>()
            / n
    }
}

/// Returns the new applied tempo, or None when no correction applies.
pub fn correct_tempo(applied: f64, detected: f64, policy: LargeJumpPolicy) -> Option<f64> {
    let delta = (detected - applied).abs();
    let corrected = if delta <= NOISE_BAND {
        return None;
    } else if delta < DRIFT_LIMIT {
        (1.0 - DRIFT_PULL) * applied + DRIFT_PULL * detected
    } else {
        match policy {
            LargeJumpPolicy::Relock => detected,
            LargeJumpPolicy::Ignore => return None,
        }
    };
    Some(corrected.clamp(MIN_BPM, MAX_BPM))
}
