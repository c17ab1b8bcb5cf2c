use super::{AccuracyReport, LargeJumpPolicy, PulseFilter, SyncMode, TempoEstimator, TempoUpdate};
use crate::config::clamp_dropout_tolerance;
use crate::observer::SyncEvent;
use log::{info, trace, warn};

/// Time limits used by [`ClockSource`], in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceTimings {
    pub dropout_tolerance: f64,
    pub recovery_delay: f64,
    pub auto_fallback: f64,
}

impl Default for SourceTimings {
    fn default() -> Self {
        Self {
            dropout_tolerance: 0.5,
            recovery_delay: 1.0,
            auto_fallback: 5.0,
        }
    }
}

/// What happened to a received pulse.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PulseOutcome {
    /// Not following an external clock, or out of order.
    Ignored,
    /// First pulse after (re)arming; no interval to measure yet.
    First,
    Accepted(TempoUpdate),
    /// The interval exceeded the dropout tolerance and was discarded.
    Dropout,
}

#[derive(Debug, Clone, Copy)]
struct Dropout {
    declared_at: f64,
    /// Timestamp of the last pulse before the gap.
    gap_start: f64,
    recovery_notified: bool,
}

/// Tracks the sync mode and the health of the incoming pulse train.
#[derive(Debug)]
pub struct ClockSource {
    mode: SyncMode,
    timings: SourceTimings,
    filter: PulseFilter,
    estimator: TempoEstimator,
    last_pulse: Option<f64>,
    last_smoothed: Option<f64>,
    last_generated: Option<f64>,
    dropout: Option<Dropout>,
    auto_deadline: Option<f64>,
    fell_back: bool,
}

impl ClockSource {
    pub fn new(mode: SyncMode, ppq: u32, policy: LargeJumpPolicy, timings: SourceTimings) -> Self {
        let mut source = Self {
            mode,
            timings: SourceTimings {
                dropout_tolerance: clamp_dropout_tolerance(timings.dropout_tolerance),
                ..timings
            },
            filter: PulseFilter::new(),
            estimator: TempoEstimator::new(ppq, policy),
            last_pulse: None,
            last_smoothed: None,
            last_generated: None,
            dropout: None,
            auto_deadline: None,
            fell_back: false,
        };
        source.set_mode(mode, 0.0);
        source
    }

    pub fn mode(&self) -> SyncMode {
        self.mode
    }

    /// Switches mode and forgets everything learned about the previous
    /// source. Entering Auto re-arms the fallback window from `now`.
    pub fn set_mode(&mut self, mode: SyncMode, now: f64) {
        self.mode = mode;
        self.fell_back = false;
        self.auto_deadline = match mode {
            SyncMode::Auto => Some(now + self.timings.auto_fallback),
            _ => None,
        };
        self.last_pulse = None;
        self.last_smoothed = None;
        self.last_generated = None;
        self.dropout = None;
        self.filter.reset();
        self.estimator.reset();
    }

    /// Timestamp of the last external pulse taken from the current source.
    pub fn last_pulse(&self) -> Option<f64> {
        self.last_pulse
    }

    /// Smoothed interval of the last accepted pulse.
    pub fn last_smoothed_interval(&self) -> Option<f64> {
        self.last_smoothed
    }

    /// Start of the silence currently treated as a dropout, while no pulse
    /// has ended it yet.
    pub fn open_gap(&self) -> Option<f64> {
        match (self.dropout, self.last_pulse) {
            (Some(dropout), Some(last)) if dropout.gap_start == last => Some(last),
            _ => None,
        }
    }

    pub fn set_dropout_tolerance(&mut self, seconds: f64) -> f64 {
        self.timings.dropout_tolerance = clamp_dropout_tolerance(seconds);
        self.timings.dropout_tolerance
    }

    pub fn timings(&self) -> SourceTimings {
        self.timings
    }

    /// True when pulses should come from the internal generator.
    pub fn is_generating(&self) -> bool {
        match self.mode {
            SyncMode::Internal => true,
            SyncMode::External => false,
            SyncMode::Auto => self.fell_back,
        }
    }

    pub fn follows_external(&self) -> bool {
        !self.is_generating()
    }

    pub fn has_fallen_back(&self) -> bool {
        self.fell_back
    }

    pub fn is_synced(&self) -> bool {
        self.follows_external() && self.estimator.is_synced()
    }

    pub fn detected_bpm(&self) -> Option<f64> {
        self.estimator.detected_bpm()
    }

    pub fn report(&self) -> AccuracyReport {
        self.filter.report()
    }

    pub fn receive_pulse(
        &mut self,
        timestamp: f64,
        applied_bpm: f64,
        events: &mut Vec<SyncEvent>,
    ) -> PulseOutcome {
        if !self.follows_external() {
            trace!("Ignoring external pulse at {:.6} in {} mode", timestamp, self.mode);
            return PulseOutcome::Ignored;
        }

        let previous = match self.last_pulse {
            Some(previous) if timestamp <= previous => {
                trace!("Ignoring out of order pulse at {:.6}", timestamp);
                return PulseOutcome::Ignored;
            }
            previous => previous,
        };
        self.last_pulse = Some(timestamp);

        let Some(previous) = previous else {
            events.push(SyncEvent::PulseReceived { timestamp });
            return PulseOutcome::First;
        };

        let raw = timestamp - previous;
        if raw > self.timings.dropout_tolerance {
            let already_reported = self
                .dropout
                .map_or(false, |dropout| dropout.gap_start == previous);
            if !already_reported {
                self.declare_dropout(previous, events);
            }
            return PulseOutcome::Dropout;
        }

        let smoothed = self.filter.push(raw);
        self.last_smoothed = Some(smoothed);
        let update = self.estimator.observe(smoothed, applied_bpm);
        match update.sync_changed {
            Some(true) => {
                info!("External clock synced at {:.6}", timestamp);
                self.dropout = None;
                self.auto_deadline = None;
                events.push(SyncEvent::SyncAcquired);
            }
            Some(false) => {
                warn!("External clock became unstable at {:.6}", timestamp);
                events.push(SyncEvent::SyncLost);
            }
            None => {}
        }

        self.check_recovery(timestamp, events);
        events.push(SyncEvent::PulseReceived { timestamp });
        PulseOutcome::Accepted(update)
    }

    /// Records the interval between internally generated pulses so the
    /// accuracy report covers the internal clock too.
    pub fn generated_pulse(&mut self, timestamp: f64) {
        if let Some(previous) = self.last_generated.replace(timestamp) {
            if timestamp > previous {
                self.filter.push(timestamp - previous);
            }
        }
    }

    pub fn restart_generation(&mut self) {
        self.last_generated = None;
    }

    /// Periodic housekeeping: silence dropouts, recovery and the Auto
    /// fallback. Returns true when Auto just fell back to Internal.
    pub fn poll(&mut self, now: f64, events: &mut Vec<SyncEvent>) -> bool {
        if !self.follows_external() {
            return false;
        }

        if let Some(last) = self.last_pulse {
            let reported = self.dropout.map_or(false, |dropout| dropout.gap_start == last);
            if now - last > self.timings.dropout_tolerance && !reported {
                self.declare_dropout(last, events);
            }
        }
        if let Some(last) = self.last_pulse {
            if now - last <= self.timings.dropout_tolerance {
                self.check_recovery(now, events);
            }
        }

        match (self.mode, self.auto_deadline) {
            (SyncMode::Auto, Some(deadline)) if now >= deadline && !self.estimator.is_synced() => {
                warn!(
                    "No external sync within {:.1}s, falling back to internal clock",
                    self.timings.auto_fallback
                );
                self.fell_back = true;
                self.auto_deadline = None;
                self.last_pulse = None;
                self.last_smoothed = None;
                self.dropout = None;
                self.estimator.reset();
                self.filter.reset();
                events.push(SyncEvent::FellBackToInternal);
                true
            }
            _ => false,
        }
    }

    /// The dropout counts from the moment the tolerance ran out, whether a
    /// poll or the pulse ending the gap noticed it.
    fn declare_dropout(&mut self, gap_start: f64, events: &mut Vec<SyncEvent>) {
        let declared_at = gap_start + self.timings.dropout_tolerance;
        warn!(
            "Clock dropout: no pulse since {:.3}s (tolerance {:.3}s)",
            gap_start, self.timings.dropout_tolerance
        );
        self.estimator.drop_out();
        self.dropout = Some(Dropout {
            declared_at,
            gap_start,
            recovery_notified: false,
        });
        events.push(SyncEvent::SyncLost);
    }

    fn check_recovery(&mut self, now: f64, events: &mut Vec<SyncEvent>) {
        let resumed = self.last_pulse;
        let synced = self.estimator.is_synced();
        let delay = self.timings.recovery_delay;
        if let Some(dropout) = self.dropout.as_mut() {
            let pulses_resumed = resumed.map_or(false, |last| last > dropout.gap_start);
            if pulses_resumed
                && !synced
                && !dropout.recovery_notified
                && now - dropout.declared_at >= delay
            {
                info!("Recovering external clock after dropout");
                dropout.recovery_notified = true;
                events.push(SyncEvent::Recovering);
            }
        }
    }
}
