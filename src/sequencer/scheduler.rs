//! Tick-driven event dispatch
//!
//! Each incoming or generated pulse advances the scheduler by
//! `ticks_per_quarter / ppq` ticks. Every tick is processed at the current
//! position and then the counter moves on, so the downbeat after a Start is
//! the first tick handled.

use super::event::{EventId, EventKind, MidiEvent};
use super::quantize::Quantize;
use super::track::{Track, TrackId};
use crate::config::validate_resolution;
use crate::error::{ClockError, Result};
use crate::midi::MidiMessage;
use log::{debug, trace};
use std::collections::HashMap;

/// How far (in beats) an event may sit from the current tick and still fire.
pub const EVENT_TOLERANCE_BEATS: f64 = 0.01;

#[derive(Debug, Clone, Copy)]
struct PendingNoteOff {
    remaining: u64,
    channel: u8,
    note: u8,
}

pub struct EventScheduler {
    ticks_per_quarter: u32,
    ticks_per_pulse: u32,
    gate_ticks: u64,
    tick: u64,
    /// Bumped whenever the position is reset or relocated; an event fires
    /// at most once per pass.
    pass: u64,
    tracks: Vec<Track>,
    next_track_id: TrackId,
    fired: HashMap<(TrackId, EventId), u64>,
    pending_offs: Vec<PendingNoteOff>,
}

impl EventScheduler {
    pub fn new(ppq: u32, ticks_per_quarter: u32, gate_beats: f64) -> Result<Self> {
        validate_resolution(ppq, ticks_per_quarter)?;
        Ok(Self {
            ticks_per_quarter,
            ticks_per_pulse: ticks_per_quarter / ppq,
            gate_ticks: beats_to_ticks(gate_beats, ticks_per_quarter),
            tick: 0,
            pass: 0,
            tracks: Vec::new(),
            next_track_id: 1,
            fired: HashMap::new(),
            pending_offs: Vec::new(),
        })
    }

    pub fn ticks_per_quarter(&self) -> u32 {
        self.ticks_per_quarter
    }

    pub fn ticks_per_pulse(&self) -> u32 {
        self.ticks_per_pulse
    }

    pub fn position_ticks(&self) -> u64 {
        self.tick
    }

    pub fn beat_position(&self) -> f64 {
        self.tick as f64 / f64::from(self.ticks_per_quarter)
    }

    /// Tick index inside the current beat, in `[0, ticks_per_quarter)`.
    pub fn tick_in_beat(&self) -> u32 {
        (self.tick % u64::from(self.ticks_per_quarter)) as u32
    }

    /// Back to zero. Sounding notes are released into `out`.
    pub fn reset(&mut self, out: &mut Vec<MidiMessage>) {
        self.flush_note_offs(out);
        self.tick = 0;
        self.pass += 1;
    }

    /// Moves to an absolute beat position without releasing notes.
    pub fn locate(&mut self, beats: f64) {
        self.tick = beats_to_position(beats, self.ticks_per_quarter);
        self.pass += 1;
        debug!("Located to tick {} ({:.3} beats)", self.tick, beats);
    }

    pub fn flush_note_offs(&mut self, out: &mut Vec<MidiMessage>) {
        out.extend(self.pending_offs.drain(..).map(|off| MidiMessage::NoteOff {
            channel: off.channel,
            note: off.note,
            velocity: 0,
        }));
    }

    pub fn pending_note_offs(&self) -> usize {
        self.pending_offs.len()
    }

    /// Processes one pulse worth of ticks, appending dispatched messages.
    pub fn on_pulse(&mut self, out: &mut Vec<MidiMessage>) {
        for _ in 0..self.ticks_per_pulse {
            self.process_tick(out);
            self.tick += 1;
        }
    }

    fn process_tick(&mut self, out: &mut Vec<MidiMessage>) {
        let tick = self.tick;
        let beat = tick as f64 / f64::from(self.ticks_per_quarter);

        self.pending_offs.retain_mut(|off| {
            off.remaining = off.remaining.saturating_sub(1);
            if off.remaining == 0 {
                out.push(MidiMessage::NoteOff {
                    channel: off.channel,
                    note: off.note,
                    velocity: 0,
                });
                false
            } else {
                true
            }
        });

        let any_solo = self.tracks.iter().any(|t| t.solo);
        for track in &self.tracks {
            if track.muted || (any_solo && !track.solo) {
                continue;
            }

            if let Some(pattern) = &track.pattern {
                let gate = pattern.gate_ticks().unwrap_or(self.gate_ticks);
                for trigger in pattern.triggers_at(tick) {
                    let note = transpose_note(trigger.note, track.transpose);
                    out.push(MidiMessage::NoteOn {
                        channel: track.channel,
                        note,
                        velocity: scale_velocity(trigger.velocity, track.velocity_scale),
                    });
                    self.pending_offs.push(PendingNoteOff {
                        remaining: gate,
                        channel: track.channel,
                        note,
                    });
                }
            }

            for event in track.events_near(beat, EVENT_TOLERANCE_BEATS) {
                let key = (track.id, event.id);
                if self.fired.get(&key) == Some(&self.pass) {
                    continue;
                }
                self.fired.insert(key, self.pass);

                let Some(message) = render_event(event, track) else {
                    trace!("Skipping incomplete event {:?}", event);
                    continue;
                };
                if let (MidiMessage::NoteOn { channel, note, .. }, Some(duration)) =
                    (&message, event.duration_beats)
                {
                    self.pending_offs.push(PendingNoteOff {
                        remaining: beats_to_ticks(duration, self.ticks_per_quarter),
                        channel: *channel,
                        note: *note,
                    });
                }
                out.push(message);
            }
        }
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track(&self, id: TrackId) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == id)
    }

    pub fn track_mut(&mut self, id: TrackId) -> Option<&mut Track> {
        self.tracks.iter_mut().find(|t| t.id == id)
    }

    /// Takes ownership of a track for playback and returns its new id.
    pub fn add_track(&mut self, mut track: Track) -> TrackId {
        track.id = self.next_track_id;
        self.next_track_id += 1;
        let id = track.id;
        self.tracks.push(track);
        id
    }

    /// Replaces every track, e.g. when a project is loaded.
    pub fn set_tracks(&mut self, tracks: Vec<Track>) -> Vec<TrackId> {
        self.tracks.clear();
        self.fired.clear();
        tracks.into_iter().map(|t| self.add_track(t)).collect()
    }

    pub fn remove_track(&mut self, id: TrackId) -> Option<Track> {
        let index = self.tracks.iter().position(|t| t.id == id)?;
        self.fired.retain(|(track_id, _), _| *track_id != id);
        Some(self.tracks.remove(index))
    }

    /// Stores an incoming event on a track at its quantized arrival time.
    /// The event has already been heard live, so it does not fire again in
    /// the current pass.
    pub fn record(
        &mut self,
        track_id: TrackId,
        mut event: MidiEvent,
        arrival_beats: f64,
        quantize: Quantize,
    ) -> Result<EventId> {
        let pass = self.pass;
        let track = self
            .tracks
            .iter_mut()
            .find(|t| t.id == track_id)
            .ok_or(ClockError::UnknownTrack(track_id))?;

        event.position_beats = quantize.apply(arrival_beats.max(0.0));
        debug!(
            "Recording {:?} on track {} at {:.3} (arrived {:.3})",
            event.kind, track_id, event.position_beats, arrival_beats
        );
        let id = track.insert_event(event);
        self.fired.insert((track_id, id), pass);
        Ok(id)
    }
}

fn beats_to_ticks(beats: f64, ticks_per_quarter: u32) -> u64 {
    let ticks = (beats * f64::from(ticks_per_quarter)).round();
    if ticks.is_finite() && ticks >= 1.0 {
        ticks as u64
    } else {
        1
    }
}

fn beats_to_position(beats: f64, ticks_per_quarter: u32) -> u64 {
    let ticks = (beats * f64::from(ticks_per_quarter)).round();
    if ticks.is_finite() && ticks > 0.0 {
        ticks as u64
    } else {
        0
    }
}

pub fn scale_velocity(velocity: u8, scale: f64) -> u8 {
    let scaled = (f64::from(velocity) * scale).round();
    if scaled.is_nan() {
        return velocity.clamp(1, 127);
    }
    scaled.clamp(1.0, 127.0) as u8
}

pub fn transpose_note(note: u8, transpose: i8) -> u8 {
    (i16::from(note) + i16::from(transpose)).clamp(0, 127) as u8
}

fn render_event(event: &MidiEvent, track: &Track) -> Option<MidiMessage> {
    let channel = event.channel;
    let message = match event.kind {
        EventKind::NoteOn => MidiMessage::NoteOn {
            channel,
            note: transpose_note(event.note?, track.transpose),
            velocity: scale_velocity(event.velocity?, track.velocity_scale),
        },
        EventKind::NoteOff => MidiMessage::NoteOff {
            channel,
            note: transpose_note(event.note?, track.transpose),
            velocity: event.velocity.unwrap_or(0),
        },
        EventKind::ControlChange => MidiMessage::ControlChange {
            channel,
            controller: event.controller?,
            value: event.value?.min(127) as u8,
        },
        EventKind::ProgramChange => MidiMessage::ProgramChange {
            channel,
            program: event.value?.min(127) as u8,
        },
        EventKind::PitchBend => MidiMessage::PitchBend {
            channel,
            value: event.value?.min(0x3FFF),
        },
    };
    Some(message)
}
