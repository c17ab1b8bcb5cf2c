use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors from MIDI device I/O
#[derive(Debug, Error)]
pub enum MidiError {
    #[error("MIDI send error: {0}")]
    Send(String),

    #[error("MIDI receive error: {0}")]
    Recv(String),

    #[error("MIDI connection error: {0}")]
    Connection(String),

    #[error("MIDI device '{0}' not found")]
    DeviceNotFound(String),

    #[error("MIDI input disconnected")]
    Disconnected,
}

/// A MIDI message that can be sent or received
#[derive(Debug, Clone, PartialEq)]
pub enum MidiMessage {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8, velocity: u8 },
    ControlChange {
        channel: u8,
        controller: u8,
        value: u8,
    },
    ProgramChange { channel: u8, program: u8 },
    /// 14-bit bend, 8192 is centered
    PitchBend { channel: u8, value: u16 },
    /// Song Position Pointer, counted in sixteenth notes
    SongPosition { sixteenths: u16 },
    Clock,
    Start,
    Stop,
    Continue,
}

impl MidiMessage {
    /// Parses a single message. Running status, SysEx and unsupported
    /// messages yield `None`.
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        let status = *data.first()?;
        let channel = status & 0x0F;

        match status {
            0xF8 => return Some(MidiMessage::Clock),
            0xFA => return Some(MidiMessage::Start),
            0xFB => return Some(MidiMessage::Continue),
            0xFC => return Some(MidiMessage::Stop),
            0xF2 if data.len() >= 3 => {
                return Some(MidiMessage::SongPosition {
                    sixteenths: u16::from(data[1] & 0x7F) | (u16::from(data[2] & 0x7F) << 7),
                })
            }
            0xF0..=0xFF => return None,
            _ => {}
        }

        match status & 0xF0 {
            0x90 if data.len() >= 3 => Some(MidiMessage::NoteOn {
                channel,
                note: data[1],
                velocity: data[2],
            }),
            0x80 if data.len() >= 3 => Some(MidiMessage::NoteOff {
                channel,
                note: data[1],
                velocity: data[2],
            }),
            0xB0 if data.len() >= 3 => Some(MidiMessage::ControlChange {
                channel,
                controller: data[1],
                value: data[2],
            }),
            0xC0 if data.len() >= 2 => Some(MidiMessage::ProgramChange {
                channel,
                program: data[1],
            }),
            0xE0 if data.len() >= 3 => Some(MidiMessage::PitchBend {
                channel,
                value: u16::from(data[1] & 0x7F) | (u16::from(data[2] & 0x7F) << 7),
            }),
            _ => None,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            MidiMessage::NoteOn {
                channel,
                note,
                velocity,
            } => vec![0x90 | (channel & 0x0F), note & 0x7F, velocity & 0x7F],
            MidiMessage::NoteOff {
                channel,
                note,
                velocity,
            } => vec![0x80 | (channel & 0x0F), note & 0x7F, velocity & 0x7F],
            MidiMessage::ControlChange {
                channel,
                controller,
                value,
            } => vec![0xB0 | (channel & 0x0F), controller & 0x7F, value & 0x7F],
            MidiMessage::ProgramChange { channel, program } => {
                vec![0xC0 | (channel & 0x0F), program & 0x7F]
            }
            MidiMessage::PitchBend { channel, value } => vec![
                0xE0 | (channel & 0x0F),
                (value & 0x7F) as u8,
                ((value >> 7) & 0x7F) as u8,
            ],
            MidiMessage::SongPosition { sixteenths } => vec![
                0xF2,
                (sixteenths & 0x7F) as u8,
                ((sixteenths >> 7) & 0x7F) as u8,
            ],
            MidiMessage::Clock => vec![0xF8],
            MidiMessage::Start => vec![0xFA],
            MidiMessage::Stop => vec![0xFC],
            MidiMessage::Continue => vec![0xFB],
        }
    }

    /// Clock and transport messages travel on the system real-time lane.
    pub fn is_realtime(&self) -> bool {
        matches!(
            self,
            MidiMessage::Clock | MidiMessage::Start | MidiMessage::Stop | MidiMessage::Continue
        )
    }
}

/// A received message stamped when it reached the process.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedMessage {
    pub message: MidiMessage,
    pub received_at: Instant,
}

impl TimedMessage {
    pub fn now(message: MidiMessage) -> Self {
        Self {
            message,
            received_at: Instant::now(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MidiError>;

/// Interface for MIDI engine implementations. Input and output are used
/// from separate threads, so both take `&self`.
pub trait MidiEngine: Send + Sync {
    fn send(&self, msg: &MidiMessage) -> Result<()>;

    /// Waits up to `timeout` for the next message. `Ok(None)` on timeout.
    fn recv_timeout(&self, timeout: Duration) -> Result<Option<TimedMessage>>;

    fn list_devices(&self) -> Vec<String>;
}
