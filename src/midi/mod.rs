//! MIDI device I/O for the clock
//!
//! - [`MidiMessage`] byte parsing and encoding
//! - the [`MidiEngine`] trait, with [`MidirEngine`] for real devices and
//!   [`MockMidiEngine`] for tests
//! - the [`bridge`] that connects an engine to a [`crate::ClockSync`]
pub mod bridge;
mod engine;
pub mod midir_engine;
pub mod mock_engine;

pub use bridge::{route_message, run_input_loop, run_output_loop, MidiBridge};
pub use engine::{MidiEngine, MidiError, MidiMessage, Result, TimedMessage};
pub use midir_engine::{list_devices, MidirEngine};
pub use mock_engine::MockMidiEngine;

pub type DefaultMidiEngine = MidirEngine;
