//! A real-time musical clock for a step sequencer.
//!
//! [`ClockSync`] keeps the song position locked to either an internally
//! generated tempo or an incoming MIDI clock, survives dropouts in that
//! clock, and dispatches track and pattern events as the position moves.
pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod logging;
pub mod midi;
pub mod observer;
pub mod sequencer;
pub mod state;
pub mod sync;
pub mod transport;

pub use cli::{validate_device, Args};
pub use clock::{AccuracyReport, LargeJumpPolicy, PulseOutcome, StartQuantize, SyncMode};
pub use config::SyncConfig;
pub use error::{ClockError, Result};
pub use observer::{Subscription, SubscriptionId, SyncEvent};
pub use sequencer::{EventKind, MidiEvent, Pattern, Quantize, Track, TrackId};
pub use state::{ClockState, TimingInfo};
pub use sync::{ClockSync, MaintenanceHandle};
pub use transport::{TransportMessage, TransportState};

/// Names of the MIDI input devices currently available.
pub fn handle_device_list() -> Vec<String> {
    midi::list_devices()
}
