use super::event::{EventId, MidiEvent};
use crate::error::{ClockError, Result};
use std::collections::BTreeMap;

pub type TrackId = u32;

/// A note fired by a pattern step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trigger {
    pub note: u8,
    pub velocity: u8,
}

/// A looping step pattern, addressed in scheduler ticks.
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    length_ticks: u64,
    step_ticks: u64,
    gate_ticks: Option<u64>,
    triggers: BTreeMap<u64, Vec<Trigger>>,
}

impl Pattern {
    /// `steps` steps of `step_ticks` each. A 16-step pattern of 16th notes
    /// at 96 ticks per quarter is `Pattern::from_steps(16, 24)`.
    pub fn from_steps(steps: u32, step_ticks: u32) -> Result<Self> {
        if steps == 0 || step_ticks == 0 {
            return Err(ClockError::InvalidPattern(format!(
                "{} steps of {} ticks",
                steps, step_ticks
            )));
        }
        Ok(Self {
            length_ticks: u64::from(steps) * u64::from(step_ticks),
            step_ticks: u64::from(step_ticks),
            gate_ticks: None,
            triggers: BTreeMap::new(),
        })
    }

    /// Overrides the scheduler's default note length for this pattern.
    pub fn with_gate_ticks(mut self, gate_ticks: u64) -> Self {
        self.gate_ticks = Some(gate_ticks.max(1));
        self
    }

    pub fn length_ticks(&self) -> u64 {
        self.length_ticks
    }

    pub fn steps(&self) -> u64 {
        self.length_ticks / self.step_ticks
    }

    pub fn gate_ticks(&self) -> Option<u64> {
        self.gate_ticks
    }

    pub fn add_trigger(&mut self, step: u32, note: u8, velocity: u8) -> Result<()> {
        let tick = u64::from(step) * self.step_ticks;
        self.add_trigger_at_tick(tick, Trigger { note, velocity })
    }

    pub fn add_trigger_at_tick(&mut self, tick: u64, trigger: Trigger) -> Result<()> {
        if tick >= self.length_ticks {
            return Err(ClockError::InvalidPattern(format!(
                "trigger at tick {} is past the pattern end ({} ticks)",
                tick, self.length_ticks
            )));
        }
        self.triggers.entry(tick).or_default().push(trigger);
        Ok(())
    }

    pub fn clear_step(&mut self, step: u32) {
        self.triggers.remove(&(u64::from(step) * self.step_ticks));
    }

    /// Triggers for an absolute song tick, wrapping at the pattern length.
    pub fn triggers_at(&self, tick: u64) -> &[Trigger] {
        self.triggers
            .get(&(tick % self.length_ticks))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// A sequencer track as supplied by the persistence layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub id: TrackId,
    pub name: String,
    pub channel: u8,
    pub muted: bool,
    pub solo: bool,
    pub velocity_scale: f64,
    pub transpose: i8,
    pub pattern: Option<Pattern>,
    events: Vec<MidiEvent>,
    next_event_id: EventId,
}

impl Track {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            channel: 0,
            muted: false,
            solo: false,
            velocity_scale: 1.0,
            transpose: 0,
            pattern: None,
            events: Vec::new(),
            next_event_id: 1,
        }
    }

    pub fn with_channel(mut self, channel: u8) -> Self {
        self.channel = channel & 0x0F;
        self
    }

    pub fn with_pattern(mut self, pattern: Pattern) -> Self {
        self.pattern = Some(pattern);
        self
    }

    pub fn events(&self) -> &[MidiEvent] {
        &self.events
    }

    /// Inserts in position order, after any events already at the same
    /// position, and returns the id given to the event.
    pub fn insert_event(&mut self, mut event: MidiEvent) -> EventId {
        event.id = self.next_event_id;
        self.next_event_id += 1;

        let index = self
            .events
            .partition_point(|e| e.position_beats <= event.position_beats);
        let id = event.id;
        self.events.insert(index, event);
        id
    }

    pub fn remove_event(&mut self, id: EventId) -> Option<MidiEvent> {
        let index = self.events.iter().position(|e| e.id == id)?;
        Some(self.events.remove(index))
    }

    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    /// Events within `tolerance` beats of `beat`.
    pub(crate) fn events_near(&self, beat: f64, tolerance: f64) -> &[MidiEvent] {
        let start = self
            .events
            .partition_point(|e| e.position_beats < beat - tolerance);
        let end = self
            .events
            .partition_point(|e| e.position_beats <= beat + tolerance);
        &self.events[start..end.max(start)]
    }
}
