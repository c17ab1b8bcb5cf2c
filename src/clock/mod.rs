//! Clock recovery and generation
//!
//! This module turns pulse trains into tempo and position:
//! - [`PulseFilter`] smooths jittery inter-pulse intervals
//! - [`TempoEstimator`] derives BPM and decides when we are synced
//! - [`ClockSource`] tracks the sync mode, dropouts and the Auto fallback
//! - [`ClockGenerator`] produces pulses on a dedicated thread
//! - [`TempoRamp`] interpolates between tempos over time
mod filter;
mod generator;
mod ramp;
mod source;
mod tempo;

pub use filter::{AccuracyReport, PulseFilter, HISTORY_LEN, SMOOTHING_WINDOW};
pub use generator::{
    next_boundary, quantized_start_delay, wall_clock_secs, ClockGenerator, StartQuantize,
};
pub use ramp::TempoRamp;
pub use source::{ClockSource, PulseOutcome, SourceTimings};
pub use tempo::{LargeJumpPolicy, TempoEstimator, TempoUpdate, SYNC_WINDOW, SYNC_VARIANCE};

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Where pulses come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    #[default]
    Internal,
    External,
    /// External first, falling back to Internal if no sync is achieved.
    Auto,
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncMode::Internal => write!(f, "internal"),
            SyncMode::External => write!(f, "external"),
            SyncMode::Auto => write!(f, "auto"),
        }
    }
}

impl FromStr for SyncMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "internal" => Ok(SyncMode::Internal),
            "external" => Ok(SyncMode::External),
            "auto" => Ok(SyncMode::Auto),
            other => Err(format!("unknown sync mode '{}'", other)),
        }
    }
}

/// Seconds between pulses at `bpm` with `ppq` pulses per quarter note.
pub fn pulse_interval_secs(bpm: f64, ppq: u32) -> f64 {
    60.0 / (bpm * f64::from(ppq))
}

pub fn pulse_interval(bpm: f64, ppq: u32) -> Duration {
    Duration::from_secs_f64(pulse_interval_secs(bpm, ppq))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pulse_interval_120bpm() {
        // 500ms per quarter / 24
        let interval = pulse_interval_secs(120.0, 24);
        assert!((interval - 0.020_833_333).abs() < 1e-9);
    }

    #[test]
    fn test_pulse_interval_matches_frequency_across_range() {
        for bpm in [20.0, 60.0, 120.0, 174.5, 300.0, 999.0] {
            let hz = bpm * 24.0 / 60.0;
            let interval = pulse_interval(bpm, 24).as_secs_f64();
            assert!((interval - 1.0 / hz).abs() < 1e-9, "bpm {}", bpm);
        }
    }

    #[test]
    fn test_sync_mode_parsing() {
        assert_eq!("Auto".parse::<SyncMode>().unwrap(), SyncMode::Auto);
        assert_eq!(SyncMode::External.to_string(), "external");
        assert!("midi".parse::<SyncMode>().is_err());
    }
}
