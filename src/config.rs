// config.rs

use crate::clock::{LargeJumpPolicy, StartQuantize, SyncMode};
use crate::error::{ClockError, Result};
use crate::sequencer::Quantize;
use config::{Config, Environment, File};
use log::{debug, info};
use std::path::Path;
use std::str::FromStr;

pub const DEFAULT_PPQ: u32 = 24;
pub const DEFAULT_TICKS_PER_QUARTER: u32 = 96;
pub const BEATS_PER_BAR: u32 = 4;

pub const MIN_BPM: f64 = 20.0;
pub const MAX_BPM: f64 = 999.0;

pub const MIN_DROPOUT_TOLERANCE: f64 = 0.1;
pub const MAX_DROPOUT_TOLERANCE: f64 = 5.0;
pub const MIN_RAMP_TIME: f64 = 0.1;
pub const MAX_RAMP_TIME: f64 = 10.0;

const ENV_PREFIX: &str = "CLOCKSYNC";

/// Tunables for a [`crate::ClockSync`] instance. All durations are seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    pub bpm: f64,
    pub mode: SyncMode,
    pub ppq: u32,
    pub ticks_per_quarter: u32,
    pub beats_per_bar: u32,
    pub dropout_tolerance: f64,
    pub recovery_delay: f64,
    pub auto_fallback: f64,
    pub ramp_time: f64,
    pub start_quantize: StartQuantize,
    pub record_quantize: Quantize,
    /// Note length for pattern triggers, in beats.
    pub gate_beats: f64,
    pub large_jump: LargeJumpPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            bpm: 120.0,
            mode: SyncMode::Internal,
            ppq: DEFAULT_PPQ,
            ticks_per_quarter: DEFAULT_TICKS_PER_QUARTER,
            beats_per_bar: BEATS_PER_BAR,
            dropout_tolerance: 0.5,
            recovery_delay: 1.0,
            auto_fallback: 5.0,
            ramp_time: 1.0,
            start_quantize: StartQuantize::None,
            record_quantize: Quantize::Sixteenth,
            gate_beats: 0.25,
            large_jump: LargeJumpPolicy::Relock,
        }
    }
}

impl SyncConfig {
    /// Loads settings from an optional file, then `CLOCKSYNC_*` environment
    /// variables, falling back to the defaults for anything unset.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = Self::default();
        let mut builder = Config::builder()
            .set_default("bpm", defaults.bpm)?
            .set_default("mode", defaults.mode.to_string())?
            .set_default("ppq", i64::from(defaults.ppq))?
            .set_default("ticks_per_quarter", i64::from(defaults.ticks_per_quarter))?
            .set_default("beats_per_bar", i64::from(defaults.beats_per_bar))?
            .set_default("dropout_tolerance", defaults.dropout_tolerance)?
            .set_default("recovery_delay", defaults.recovery_delay)?
            .set_default("auto_fallback", defaults.auto_fallback)?
            .set_default("ramp_time", defaults.ramp_time)?
            .set_default("start_quantize", defaults.start_quantize.to_string())?
            .set_default("record_quantize", defaults.record_quantize.to_string())?
            .set_default("gate_beats", defaults.gate_beats)?
            .set_default("large_jump", defaults.large_jump.to_string())?;

        if let Some(path) = path {
            info!("Loading settings from {}", path.display());
            builder = builder.add_source(File::from(path));
        }
        builder = builder.add_source(Environment::with_prefix(ENV_PREFIX));

        let settings = builder.build()?;
        Self::from_settings(&settings)
    }

    fn from_settings(settings: &Config) -> Result<Self> {
        let config = Self {
            bpm: settings.get_float("bpm")?,
            mode: parse_setting(settings, "mode")?,
            ppq: get_u32(settings, "ppq")?,
            ticks_per_quarter: get_u32(settings, "ticks_per_quarter")?,
            beats_per_bar: get_u32(settings, "beats_per_bar")?,
            dropout_tolerance: settings.get_float("dropout_tolerance")?,
            recovery_delay: settings.get_float("recovery_delay")?,
            auto_fallback: settings.get_float("auto_fallback")?,
            ramp_time: settings.get_float("ramp_time")?,
            start_quantize: parse_setting(settings, "start_quantize")?,
            record_quantize: parse_setting(settings, "record_quantize")?,
            gate_beats: settings.get_float("gate_beats")?,
            large_jump: parse_setting(settings, "large_jump")?,
        };
        debug!("Loaded settings: {:?}", config);
        config.validate()
    }

    /// Rejects invalid tempo/resolution values and clamps the tolerances
    /// into their supported ranges.
    pub fn validate(mut self) -> Result<Self> {
        validate_bpm(self.bpm)?;
        validate_resolution(self.ppq, self.ticks_per_quarter)?;
        if self.beats_per_bar == 0 {
            return Err(invalid("beats_per_bar", self.beats_per_bar));
        }
        if !(self.gate_beats.is_finite() && self.gate_beats > 0.0) {
            return Err(invalid("gate_beats", self.gate_beats));
        }
        if !(self.auto_fallback.is_finite() && self.auto_fallback > 0.0) {
            return Err(invalid("auto_fallback", self.auto_fallback));
        }
        if !(self.recovery_delay.is_finite() && self.recovery_delay >= 0.0) {
            return Err(invalid("recovery_delay", self.recovery_delay));
        }

        self.dropout_tolerance = clamp_dropout_tolerance(self.dropout_tolerance);
        self.ramp_time = clamp_ramp_time(self.ramp_time);
        Ok(self)
    }
}

pub fn validate_bpm(bpm: f64) -> Result<()> {
    if bpm.is_finite() && (MIN_BPM..=MAX_BPM).contains(&bpm) {
        Ok(())
    } else {
        Err(ClockError::InvalidBpm(bpm))
    }
}

pub fn validate_resolution(ppq: u32, ticks_per_quarter: u32) -> Result<()> {
    if ppq == 0 {
        return Err(ClockError::InvalidPpq(ppq));
    }
    if ticks_per_quarter == 0 || ticks_per_quarter % ppq != 0 {
        return Err(ClockError::InvalidTickResolution {
            ticks_per_quarter,
            ppq,
        });
    }
    Ok(())
}

pub fn clamp_dropout_tolerance(seconds: f64) -> f64 {
    if seconds.is_nan() {
        return SyncConfig::default().dropout_tolerance;
    }
    seconds.clamp(MIN_DROPOUT_TOLERANCE, MAX_DROPOUT_TOLERANCE)
}

pub fn clamp_ramp_time(seconds: f64) -> f64 {
    if seconds.is_nan() {
        return SyncConfig::default().ramp_time;
    }
    seconds.clamp(MIN_RAMP_TIME, MAX_RAMP_TIME)
}

fn invalid(key: &str, value: impl ToString) -> ClockError {
    ClockError::InvalidSetting {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn get_u32(settings: &Config, key: &str) -> Result<u32> {
    let raw = settings.get_int(key)?;
    u32::try_from(raw).map_err(|_| invalid(key, raw))
}

fn parse_setting<T: FromStr>(settings: &Config, key: &str) -> Result<T> {
    let raw = settings.get_string(key)?;
    raw.parse::<T>().map_err(|_| invalid(key, raw))
}
