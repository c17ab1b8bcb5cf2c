use crate::midi::MidiMessage;

pub type EventId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    NoteOn,
    NoteOff,
    ControlChange,
    ProgramChange,
    PitchBend,
}

/// A channel event placed on a track at a beat position.
///
/// Which of the optional fields matter depends on `kind`: notes use `note`
/// and `velocity`, control changes use `controller` and `value`, program
/// changes and pitch bends use `value` only.
#[derive(Debug, Clone, PartialEq)]
pub struct MidiEvent {
    /// Assigned by the owning track on insertion.
    pub id: EventId,
    pub kind: EventKind,
    pub channel: u8,
    pub note: Option<u8>,
    pub velocity: Option<u8>,
    pub controller: Option<u8>,
    pub value: Option<u16>,
    pub position_beats: f64,
    pub duration_beats: Option<f64>,
}

impl MidiEvent {
    fn blank(kind: EventKind, channel: u8, position_beats: f64) -> Self {
        Self {
            id: 0,
            kind,
            channel: channel & 0x0F,
            note: None,
            velocity: None,
            controller: None,
            value: None,
            position_beats: position_beats.max(0.0),
            duration_beats: None,
        }
    }

    pub fn note_on(
        channel: u8,
        note: u8,
        velocity: u8,
        position_beats: f64,
        duration_beats: Option<f64>,
    ) -> Self {
        Self {
            note: Some(note),
            velocity: Some(velocity),
            duration_beats,
            ..Self::blank(EventKind::NoteOn, channel, position_beats)
        }
    }

    pub fn note_off(channel: u8, note: u8, position_beats: f64) -> Self {
        Self {
            note: Some(note),
            velocity: Some(0),
            ..Self::blank(EventKind::NoteOff, channel, position_beats)
        }
    }

    pub fn control_change(channel: u8, controller: u8, value: u8, position_beats: f64) -> Self {
        Self {
            controller: Some(controller),
            value: Some(u16::from(value)),
            ..Self::blank(EventKind::ControlChange, channel, position_beats)
        }
    }

    pub fn program_change(channel: u8, program: u8, position_beats: f64) -> Self {
        Self {
            value: Some(u16::from(program)),
            ..Self::blank(EventKind::ProgramChange, channel, position_beats)
        }
    }

    /// `value` is the 14-bit bend amount, 8192 being centered.
    pub fn pitch_bend(channel: u8, value: u16, position_beats: f64) -> Self {
        Self {
            value: Some(value.min(0x3FFF)),
            ..Self::blank(EventKind::PitchBend, channel, position_beats)
        }
    }

    /// Builds an event from an incoming channel message. Clock and transport
    /// messages have no event form.
    pub fn from_message(message: &MidiMessage, position_beats: f64) -> Option<Self> {
        let event = match *message {
            MidiMessage::NoteOn {
                channel,
                note,
                velocity,
            } if velocity > 0 => Self::note_on(channel, note, velocity, position_beats, None),
            MidiMessage::NoteOn { channel, note, .. } | MidiMessage::NoteOff { channel, note, .. } => {
                Self::note_off(channel, note, position_beats)
            }
            MidiMessage::ControlChange {
                channel,
                controller,
                value,
            } => Self::control_change(channel, controller, value, position_beats),
            MidiMessage::ProgramChange { channel, program } => {
                Self::program_change(channel, program, position_beats)
            }
            MidiMessage::PitchBend { channel, value } => {
                Self::pitch_bend(channel, value, position_beats)
            }
            _ => return None,
        };
        Some(event)
    }
}
