//! Snapshots of the clock's musical position

use crate::clock::SyncMode;
use crate::transport::TransportState;

/// The clock state owned by [`crate::ClockSync`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockState {
    pub mode: SyncMode,
    pub bpm: f64,
    pub position_ticks: u64,
    pub beat_position: f64,
    pub is_playing: bool,
    pub is_synced: bool,
}

/// Everything a display or a collaborator needs to know about "where are we".
///
/// `bar` and `beat_in_bar` count from 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimingInfo {
    pub bpm: f64,
    pub detected_bpm: Option<f64>,
    pub position_ticks: u64,
    pub beat_position: f64,
    pub bar: u32,
    pub beat_in_bar: u32,
    pub tick_in_beat: u32,
    pub is_playing: bool,
    pub is_synced: bool,
    pub mode: SyncMode,
    pub transport_state: TransportState,
}

impl TimingInfo {
    pub fn new(
        state: &ClockState,
        detected_bpm: Option<f64>,
        transport_state: TransportState,
        ticks_per_quarter: u32,
        beats_per_bar: u32,
    ) -> Self {
        let tpq = u64::from(ticks_per_quarter.max(1));
        let beats = state.position_ticks / tpq;
        let bpb = u64::from(beats_per_bar.max(1));

        Self {
            bpm: state.bpm,
            detected_bpm,
            position_ticks: state.position_ticks,
            beat_position: state.beat_position,
            bar: u32::try_from((beats / bpb).saturating_add(1)).unwrap_or(u32::MAX),
            beat_in_bar: (beats % bpb + 1) as u32,
            tick_in_beat: (state.position_ticks % tpq) as u32,
            is_playing: state.is_playing,
            is_synced: state.is_synced,
            mode: state.mode,
            transport_state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_at(ticks: u64) -> ClockState {
        ClockState {
            mode: SyncMode::Internal,
            bpm: 120.0,
            position_ticks: ticks,
            beat_position: ticks as f64 / 96.0,
            is_playing: true,
            is_synced: false,
        }
    }

    #[test]
    fn test_start_of_song_is_bar_one_beat_one() {
        let info = TimingInfo::new(&state_at(0), None, TransportState::Playing, 96, 4);
        assert_eq!(info.bar, 1);
        assert_eq!(info.beat_in_bar, 1);
        assert_eq!(info.tick_in_beat, 0);
    }

    #[test]
    fn test_bar_and_beat_rollover() {
        // Bar 2, beat 3, tick 5
        let ticks = 96 * 4 + 96 * 2 + 5;
        let info = TimingInfo::new(&state_at(ticks), Some(119.8), TransportState::Playing, 96, 4);
        assert_eq!(info.bar, 2);
        assert_eq!(info.beat_in_bar, 3);
        assert_eq!(info.tick_in_beat, 5);
        assert_eq!(info.detected_bpm, Some(119.8));
    }

    #[test]
    fn test_odd_meter() {
        let info = TimingInfo::new(&state_at(96 * 3), None, TransportState::Stopped, 96, 3);
        assert_eq!(info.bar, 2);
        assert_eq!(info.beat_in_bar, 1);
    }

    #[test]
    fn test_bar_saturates_on_huge_positions() {
        let info = TimingInfo::new(&state_at(u64::MAX), None, TransportState::Playing, 1, 1);
        assert_eq!(info.bar, u32::MAX);
        assert_eq!(info.beat_in_bar, 1);
        assert_eq!(info.tick_in_beat, 0);
    }
}
