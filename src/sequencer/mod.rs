//! Step sequencer playback and recording
mod event;
mod quantize;
mod scheduler;
mod track;

pub use event::{EventId, EventKind, MidiEvent};
pub use quantize::Quantize;
pub use scheduler::{scale_velocity, transpose_note, EventScheduler, EVENT_TOLERANCE_BEATS};
pub use track::{Pattern, Track, TrackId, Trigger};
