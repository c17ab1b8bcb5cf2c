use crate::sequencer::TrackId;
use thiserror::Error;

/// Errors rejected at the API boundary. State is left untouched when one
/// of these is returned.
#[derive(Debug, Error)]
pub enum ClockError {
    #[error("BPM {0} is outside the supported range 20-999")]
    InvalidBpm(f64),

    #[error("PPQ must be greater than zero, got {0}")]
    InvalidPpq(u32),

    #[error("ticks per quarter ({ticks_per_quarter}) must be a positive multiple of PPQ ({ppq})")]
    InvalidTickResolution { ticks_per_quarter: u32, ppq: u32 },

    #[error("invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("unknown track id {0}")]
    UnknownTrack(TrackId),

    #[error("invalid value '{value}' for setting '{key}'")]
    InvalidSetting { key: String, value: String },

    #[error("settings error: {0}")]
    Settings(#[from] config::ConfigError),
}

pub type Result<T> = std::result::Result<T, ClockError>;
