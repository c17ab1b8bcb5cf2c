//! The clock facade
//!
//! [`ClockSync`] is a cheap, cloneable handle shared by the MIDI input
//! thread, the pulse generator, the maintenance thread and the host. All
//! mutable state lives in one `SyncCore` behind a single mutex. Outgoing
//! MIDI and notifications are collected while it is held and delivered once
//! it is released, so the pulse path never waits on a slow consumer.

use crate::clock::{
    pulse_interval, pulse_interval_secs, quantized_start_delay, wall_clock_secs, AccuracyReport, ClockGenerator,
    ClockSource, PulseOutcome, SourceTimings, StartQuantize, SyncMode, TempoRamp,
};
use crate::config::{clamp_ramp_time, validate_bpm, SyncConfig, MAX_BPM, MIN_BPM};
use crate::error::{ClockError, Result};
use crate::midi::MidiMessage;
use crate::observer::{Notifier, Subscription, SubscriptionId, SyncEvent};
use crate::sequencer::{EventId, EventScheduler, MidiEvent, Quantize, Track, TrackId};
use crate::state::{ClockState, TimingInfo};
use crate::transport::{TransportController, TransportMessage, TransportState, TransportTransition};
use crossbeam::channel::{bounded, select, tick, Receiver, Sender, TrySendError};
use log::{debug, error, info, trace, warn};
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const OUTPUT_CAPACITY: usize = 4096;

/// How often the maintenance thread polls.
pub const MAINTENANCE_INTERVAL: Duration = Duration::from_millis(50);

/// Work produced under the lock, delivered after it is released.
#[derive(Default)]
struct Outbox {
    events: Vec<SyncEvent>,
    messages: Vec<MidiMessage>,
}

struct SyncCore {
    config: SyncConfig,
    bpm: f64,
    ramp: Option<TempoRamp>,
    ramp_time: f64,
    source: ClockSource,
    transport: TransportController,
    scheduler: EventScheduler,
    record_track: Option<TrackId>,
    record_quantize: Quantize,
    /// Pulses played from the tempo estimate during the current dropout.
    coasted: u64,
    /// Timestamp of the pulse that last moved the position.
    last_advance: Option<f64>,
}

impl SyncCore {
    fn new(config: SyncConfig) -> Result<Self> {
        let config = config.validate()?;
        let scheduler =
            EventScheduler::new(config.ppq, config.ticks_per_quarter, config.gate_beats)?;
        let source = ClockSource::new(
            config.mode,
            config.ppq,
            config.large_jump,
            SourceTimings {
                dropout_tolerance: config.dropout_tolerance,
                recovery_delay: config.recovery_delay,
                auto_fallback: config.auto_fallback,
            },
        );

        Ok(Self {
            bpm: config.bpm,
            ramp: None,
            ramp_time: config.ramp_time,
            source,
            transport: TransportController::new(),
            scheduler,
            record_track: None,
            record_quantize: config.record_quantize,
            coasted: 0,
            last_advance: None,
            config,
        })
    }

    fn wants_generator(&self) -> bool {
        self.source.is_generating() && self.transport.is_playing()
    }

    fn set_applied_bpm(&mut self, bpm: f64, out: &mut Outbox) {
        let bpm = bpm.clamp(MIN_BPM, MAX_BPM);
        if bpm != self.bpm {
            self.bpm = bpm;
            out.events.push(SyncEvent::TempoChanged { bpm });
        }
    }

    fn advance(&mut self, at: f64, out: &mut Outbox) {
        self.last_advance = Some(at);
        if self.transport.is_playing() {
            self.scheduler.on_pulse(&mut out.messages);
        }
    }

    /// Last known pulse interval of the external clock, falling back to the
    /// applied tempo.
    fn estimated_interval(&self) -> f64 {
        self.source
            .last_smoothed_interval()
            .filter(|interval| *interval > 0.0)
            .unwrap_or_else(|| pulse_interval_secs(self.bpm, self.config.ppq))
    }

    /// Keeps playback moving through a dropout, one pulse per estimated
    /// interval since the gap began.
    fn coast(&mut self, now: f64, out: &mut Outbox) {
        let Some(gap_start) = self.source.open_gap() else {
            return;
        };
        let interval = self.estimated_interval();
        let due = ((now - gap_start) / interval).floor() as u64;
        if due > self.coasted {
            trace!("Coasting {} pulses through dropout", due - self.coasted);
        }
        while self.coasted < due {
            self.coasted += 1;
            self.advance(gap_start + self.coasted as f64 * interval, out);
        }
    }

    /// Beat position of something that arrived at `timestamp`, placed between
    /// the last pulse and the next one.
    fn arrival_beats(&self, timestamp: f64) -> f64 {
        let position = self.scheduler.beat_position();
        let Some(last) = self.last_advance.filter(|_| self.transport.is_playing()) else {
            return position;
        };
        let pulse_beats = 1.0 / f64::from(self.config.ppq);
        let offset = ((timestamp - last) * self.bpm / 60.0).clamp(0.0, pulse_beats);
        (position - pulse_beats).max(0.0) + offset
    }

    fn apply_transport(
        &mut self,
        message: TransportMessage,
        echo: bool,
        out: &mut Outbox,
    ) -> TransportTransition {
        let transition = self.transport.apply(message);

        if transition.reset_position {
            self.last_advance = None;
            self.scheduler.reset(&mut out.messages);
            out.events.push(SyncEvent::PositionChanged { beats: 0.0 });
        } else if transition.stopped() {
            self.scheduler.flush_note_offs(&mut out.messages);
        }

        if transition.changed() {
            out.events.push(SyncEvent::TransportChanged(transition.to));
            if echo {
                out.messages.push(match (message, transition.reset_position) {
                    (TransportMessage::Stop, _) => MidiMessage::Stop,
                    (_, true) => MidiMessage::Start,
                    (_, false) => MidiMessage::Continue,
                });
            }
        }
        transition
    }

    fn receive_pulse(&mut self, timestamp: f64, out: &mut Outbox) -> PulseOutcome {
        let gap_start = self.source.last_pulse();
        let interval = self.estimated_interval();
        let outcome = self
            .source
            .receive_pulse(timestamp, self.bpm, &mut out.events);
        match outcome {
            PulseOutcome::Accepted(update) => {
                if let Some(bpm) = update.applied_bpm {
                    self.ramp = None;
                    self.set_applied_bpm(bpm, out);
                }
                self.coasted = 0;
                self.advance(timestamp, out);
            }
            PulseOutcome::Dropout => {
                // Fill in whatever the maintenance poll has not already played.
                let due = gap_start
                    .map_or(1, |start| ((timestamp - start) / interval).round() as u64);
                let missing = due.saturating_sub(self.coasted);
                debug!(
                    "Pulse after dropout at {:.6}: {} due, {} coasted",
                    timestamp, due, self.coasted
                );
                self.coasted = 0;
                for _ in 0..missing {
                    self.advance(timestamp, out);
                }
                self.last_advance = Some(timestamp);
            }
            PulseOutcome::First => {
                self.coasted = 0;
                self.advance(timestamp, out);
            }
            PulseOutcome::Ignored => {}
        }
        outcome
    }

    /// One internally generated pulse. Returns the wait until the next one,
    /// or `None` once generation should end.
    fn generated_pulse(&mut self, timestamp: f64, out: &mut Outbox) -> Option<Duration> {
        if !self.wants_generator() {
            return None;
        }
        trace!("Generated pulse at {:.6}", timestamp);
        self.source.generated_pulse(timestamp);
        out.messages.push(MidiMessage::Clock);
        self.advance(timestamp, out);
        Some(pulse_interval(self.bpm, self.config.ppq))
    }

    fn locate(&mut self, beats: f64, out: &mut Outbox) {
        self.last_advance = None;
        self.scheduler.locate(beats);
        out.events.push(SyncEvent::PositionChanged {
            beats: self.scheduler.beat_position(),
        });
    }

    fn set_mode(&mut self, mode: SyncMode, now: f64, out: &mut Outbox) {
        info!("Sync mode {} -> {}", self.source.mode(), mode);
        self.source.set_mode(mode, now);
        self.coasted = 0;
        out.events.push(SyncEvent::ModeChanged(mode));
    }

    fn poll(&mut self, now: f64, out: &mut Outbox) -> bool {
        let fell_back = self.source.poll(now, &mut out.events);
        self.coast(now, out);
        if let Some(ramp) = self.ramp {
            self.set_applied_bpm(ramp.bpm_at(now), out);
            if ramp.is_finished(now) {
                debug!("Tempo ramp reached {:.2} BPM", ramp.target());
                self.ramp = None;
            }
        }
        fell_back
    }

    fn record(&mut self, track: TrackId, event: MidiEvent, beats: f64) -> Result<EventId> {
        let quantize = self.record_quantize;
        self.scheduler.record(track, event, beats, quantize)
    }

    fn state(&self) -> ClockState {
        ClockState {
            mode: self.source.mode(),
            bpm: self.bpm,
            position_ticks: self.scheduler.position_ticks(),
            beat_position: self.scheduler.beat_position(),
            is_playing: self.transport.is_playing(),
            is_synced: self.source.is_synced(),
        }
    }

    fn timing_info(&self) -> TimingInfo {
        TimingInfo::new(
            &self.state(),
            self.source.detected_bpm(),
            self.transport.state(),
            self.config.ticks_per_quarter,
            self.config.beats_per_bar,
        )
    }
}

struct Inner {
    core: Mutex<SyncCore>,
    generator: Mutex<Option<ClockGenerator>>,
    notifier: Notifier,
    output_tx: Sender<MidiMessage>,
    output_rx: Receiver<MidiMessage>,
    epoch: Instant,
}

/// Handle to a running clock. Clones share the same clock.
#[derive(Clone)]
pub struct ClockSync {
    inner: Arc<Inner>,
}

impl ClockSync {
    pub fn new(config: SyncConfig) -> Result<Self> {
        let core = SyncCore::new(config)?;
        info!(
            "Clock created: {:.2} BPM, {} mode, {} PPQ, {} ticks per quarter",
            core.bpm,
            core.source.mode(),
            core.config.ppq,
            core.config.ticks_per_quarter
        );

        let (output_tx, output_rx) = bounded(OUTPUT_CAPACITY);
        Ok(Self {
            inner: Arc::new(Inner {
                core: Mutex::new(core),
                generator: Mutex::new(None),
                notifier: Notifier::new(),
                output_tx,
                output_rx,
                epoch: Instant::now(),
            }),
        })
    }

    /// Seconds since this clock was created. All pulse timestamps use this
    /// time base.
    pub fn now(&self) -> f64 {
        self.inner.epoch.elapsed().as_secs_f64()
    }

    pub fn seconds_at(&self, instant: Instant) -> f64 {
        instant
            .saturating_duration_since(self.inner.epoch)
            .as_secs_f64()
    }

    fn with_core<R>(&self, f: impl FnOnce(&mut SyncCore, &mut Outbox) -> R) -> R {
        let mut outbox = Outbox::default();
        let result = {
            let mut core = self.inner.core.lock();
            f(&mut core, &mut outbox)
        };
        self.deliver(outbox);
        result
    }

    fn deliver(&self, outbox: Outbox) {
        for message in outbox.messages {
            if let Err(TrySendError::Full(message)) = self.inner.output_tx.try_send(message) {
                warn!("MIDI output queue full, dropping {:?}", message);
            }
        }
        self.inner.notifier.publish(&outbox.events);
    }

    // Tempo and mode

    pub fn set_sync_mode(&self, mode: SyncMode) {
        let now = self.now();
        self.with_core(|core, out| core.set_mode(mode, now, out));
        self.sync_generator(false);
    }

    pub fn sync_mode(&self) -> SyncMode {
        self.inner.core.lock().source.mode()
    }

    /// Sets the applied tempo immediately, cancelling any ramp.
    pub fn set_bpm(&self, bpm: f64) -> Result<()> {
        validate_bpm(bpm)?;
        self.with_core(|core, out| {
            core.ramp = None;
            core.set_applied_bpm(bpm, out);
        });
        info!("Tempo set to {:.2} BPM", bpm);
        Ok(())
    }

    pub fn bpm(&self) -> f64 {
        self.inner.core.lock().bpm
    }

    /// Moves linearly to `target` over the ramp time. A ramp already in
    /// flight is replaced, starting from the current tempo.
    pub fn ramp_to_bpm(&self, target: f64) -> Result<()> {
        validate_bpm(target)?;
        let now = self.now();
        self.with_core(|core, _| {
            info!(
                "Ramping tempo {:.2} -> {:.2} BPM over {:.2}s",
                core.bpm, target, core.ramp_time
            );
            core.ramp = Some(TempoRamp::new(core.bpm, target, now, core.ramp_time));
        });
        Ok(())
    }

    /// Returns the ramp time actually used after clamping.
    pub fn set_ramp_time(&self, seconds: f64) -> f64 {
        let seconds = clamp_ramp_time(seconds);
        self.inner.core.lock().ramp_time = seconds;
        seconds
    }

    /// Returns the tolerance actually used after clamping.
    pub fn set_dropout_tolerance(&self, seconds: f64) -> f64 {
        self.inner.core.lock().source.set_dropout_tolerance(seconds)
    }

    pub fn set_start_quantize(&self, quantize: StartQuantize) {
        self.inner.core.lock().config.start_quantize = quantize;
    }

    // Transport

    pub fn start(&self) {
        self.transport_command(TransportMessage::Start);
    }

    /// Stops playback. The generator thread has exited when this returns.
    pub fn stop(&self) {
        self.transport_command(TransportMessage::Stop);
    }

    pub fn continue_playback(&self) {
        self.transport_command(TransportMessage::Continue);
    }

    fn transport_command(&self, message: TransportMessage) {
        let transition = self.with_core(|core, out| {
            let echo = core.source.is_generating();
            core.apply_transport(message, echo, out)
        });
        self.sync_generator(transition.reset_position);
    }

    pub fn transport_state(&self) -> TransportState {
        self.inner.core.lock().transport.state()
    }

    // Incoming clock

    pub fn receive_clock_pulse(&self, timestamp: f64) -> PulseOutcome {
        self.with_core(|core, out| core.receive_pulse(timestamp, out))
    }

    /// Applies a Start/Stop/Continue received from outside. Never echoed.
    pub fn receive_transport(&self, message: TransportMessage, timestamp: f64) {
        trace!("Received {:?} at {:.6}", message, timestamp);
        let transition = self.with_core(|core, out| core.apply_transport(message, false, out));
        self.sync_generator(transition.reset_position);
    }

    /// Song Position Pointer in beats. Works in every transport state and
    /// never changes it.
    pub fn receive_song_position(&self, beats: u32, timestamp: f64) {
        trace!("Received song position {} at {:.6}", beats, timestamp);
        self.locate(f64::from(beats));
    }

    pub fn locate(&self, beats: f64) {
        self.with_core(|core, out| core.locate(beats, out));
    }

    // Reporting

    pub fn state(&self) -> ClockState {
        self.inner.core.lock().state()
    }

    pub fn get_timing_info(&self) -> TimingInfo {
        self.inner.core.lock().timing_info()
    }

    pub fn get_clock_accuracy_report(&self) -> AccuracyReport {
        self.inner.core.lock().source.report()
    }

    pub fn ticks_per_quarter(&self) -> u32 {
        self.inner.core.lock().config.ticks_per_quarter
    }

    pub fn is_synced(&self) -> bool {
        self.inner.core.lock().source.is_synced()
    }

    pub fn detected_bpm(&self) -> Option<f64> {
        self.inner.core.lock().source.detected_bpm()
    }

    /// Whether the internal pulse thread is currently alive.
    pub fn is_generating(&self) -> bool {
        self.inner
            .generator
            .lock()
            .as_ref()
            .map_or(false, ClockGenerator::is_running)
    }

    pub fn subscribe(&self) -> Subscription {
        self.inner.notifier.subscribe()
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.notifier.unsubscribe(id)
    }

    /// Outgoing MIDI for the hardware binding. Every clone of the receiver
    /// competes for the same messages.
    pub fn output(&self) -> Receiver<MidiMessage> {
        self.inner.output_rx.clone()
    }

    // Tracks and recording

    pub fn add_track(&self, track: Track) -> TrackId {
        self.inner.core.lock().scheduler.add_track(track)
    }

    pub fn set_tracks(&self, tracks: Vec<Track>) -> Vec<TrackId> {
        let mut core = self.inner.core.lock();
        core.record_track = None;
        core.scheduler.set_tracks(tracks)
    }

    pub fn remove_track(&self, id: TrackId) -> Option<Track> {
        let mut core = self.inner.core.lock();
        if core.record_track == Some(id) {
            core.record_track = None;
        }
        core.scheduler.remove_track(id)
    }

    pub fn track(&self, id: TrackId) -> Option<Track> {
        self.inner.core.lock().scheduler.track(id).cloned()
    }

    /// Runs `f` against a track while the clock is locked. Keep it short.
    pub fn with_track<R>(&self, id: TrackId, f: impl FnOnce(&mut Track) -> R) -> Result<R> {
        let mut core = self.inner.core.lock();
        let track = core
            .scheduler
            .track_mut(id)
            .ok_or(ClockError::UnknownTrack(id))?;
        Ok(f(track))
    }

    /// Selects the track incoming channel messages are recorded onto.
    pub fn arm_recording(&self, track: Option<TrackId>) -> Result<()> {
        let mut core = self.inner.core.lock();
        if let Some(id) = track {
            if core.scheduler.track(id).is_none() {
                return Err(ClockError::UnknownTrack(id));
            }
        }
        info!("Recording armed on {:?}", track);
        core.record_track = track;
        Ok(())
    }

    pub fn armed_track(&self) -> Option<TrackId> {
        self.inner.core.lock().record_track
    }

    pub fn set_record_quantize(&self, quantize: Quantize) {
        self.inner.core.lock().record_quantize = quantize;
    }

    pub fn record_quantize(&self) -> Quantize {
        self.inner.core.lock().record_quantize
    }

    /// Records at the current song position.
    pub fn record_event(&self, track: TrackId, event: MidiEvent) -> Result<EventId> {
        self.with_core(|core, _| {
            let beats = core.scheduler.beat_position();
            core.record(track, event, beats)
        })
    }

    /// Records as if the event arrived at `beats`.
    pub fn record_event_at(&self, track: TrackId, event: MidiEvent, beats: f64) -> Result<EventId> {
        self.with_core(|core, _| core.record(track, event, beats))
    }

    /// Records a channel message that arrived at `timestamp` onto the armed
    /// track, if any.
    pub fn record_message(
        &self,
        message: &MidiMessage,
        timestamp: f64,
    ) -> Result<Option<EventId>> {
        self.with_core(|core, _| {
            let Some(track) = core.record_track else {
                return Ok(None);
            };
            let beats = core.arrival_beats(timestamp);
            let Some(event) = MidiEvent::from_message(message, beats) else {
                return Ok(None);
            };
            core.record(track, event, beats).map(Some)
        })
    }

    // Maintenance

    pub fn poll(&self) {
        self.poll_at(self.now());
    }

    /// Advances the tempo ramp and checks for silence and the Auto
    /// fallback as of `now`.
    pub fn poll_at(&self, now: f64) {
        let fell_back = self.with_core(|core, out| core.poll(now, out));
        if fell_back {
            self.sync_generator(false);
        }
    }

    /// Starts the low-priority thread that calls [`ClockSync::poll`] every
    /// [`MAINTENANCE_INTERVAL`]. It holds no strong reference to the clock.
    pub fn spawn_maintenance(&self) -> io::Result<MaintenanceHandle> {
        let weak = Arc::downgrade(&self.inner);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let ticker = tick(MAINTENANCE_INTERVAL);

        let thread_handle = thread::Builder::new()
            .name("clocksync-maint".to_string())
            .spawn(move || {
                loop {
                    let keep_going = select! {
                        recv(ticker) -> _ => match weak.upgrade() {
                            Some(inner) => {
                                ClockSync { inner }.poll();
                                true
                            }
                            None => false,
                        },
                        recv(shutdown_rx) -> _ => false,
                    };
                    if !keep_going {
                        break;
                    }
                }
                debug!("Maintenance thread exiting");
            })?;

        Ok(MaintenanceHandle {
            shutdown: Some(shutdown_tx),
            thread_handle: Some(thread_handle),
        })
    }

    /// Starts, restarts or stops the pulse thread to match the mode and
    /// transport. The generator slot lock is always taken before the core
    /// lock, and never while the core lock is held.
    fn sync_generator(&self, restart: bool) {
        let plan = {
            let core = self.inner.core.lock();
            core.wants_generator().then(|| {
                (
                    core.bpm,
                    core.config.beats_per_bar,
                    core.config.start_quantize,
                )
            })
        };

        let mut slot = self.inner.generator.lock();
        let Some((bpm, beats_per_bar, quantize)) = plan else {
            if let Some(mut generator) = slot.take() {
                generator.stop();
            }
            return;
        };

        if !restart && slot.as_ref().map_or(false, ClockGenerator::is_running) {
            return;
        }
        if let Some(mut generator) = slot.take() {
            generator.stop();
        }

        self.inner.core.lock().source.restart_generation();
        let delay = quantized_start_delay(wall_clock_secs(), bpm, beats_per_bar, quantize);
        let weak = Arc::downgrade(&self.inner);
        let started = ClockGenerator::start(delay, move |fired| {
            let sync = ClockSync {
                inner: weak.upgrade()?,
            };
            sync.generated_pulse(fired)
        });
        match started {
            Ok(generator) => *slot = Some(generator),
            Err(e) => error!("Failed to start clock generator: {}", e),
        }
    }

    fn generated_pulse(&self, fired: Instant) -> Option<Duration> {
        let timestamp = self.seconds_at(fired);
        self.with_core(|core, out| core.generated_pulse(timestamp, out))
    }
}

/// Owns the maintenance thread; stops it when dropped.
pub struct MaintenanceHandle {
    shutdown: Option<Sender<()>>,
    thread_handle: Option<JoinHandle<()>>,
}

impl MaintenanceHandle {
    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map_or(false, |handle| !handle.is_finished())
    }

    pub fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.try_send(());
        }
        if let Some(handle) = self.thread_handle.take() {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for MaintenanceHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock() -> ClockSync {
        ClockSync::new(SyncConfig::default()).unwrap()
    }

    fn drain(rx: &Receiver<MidiMessage>) -> Vec<MidiMessage> {
        rx.try_iter().collect()
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = SyncConfig {
            bpm: 5.0,
            ..SyncConfig::default()
        };
        assert!(matches!(ClockSync::new(config), Err(ClockError::InvalidBpm(_))));
    }

    #[test]
    fn test_set_bpm_bounds_leave_state_alone() {
        let sync = clock();
        assert!(sync.set_bpm(19.9).is_err());
        assert!(sync.set_bpm(1000.0).is_err());
        assert!(sync.set_bpm(f64::NAN).is_err());
        assert_eq!(sync.bpm(), 120.0);
        sync.set_bpm(999.0).unwrap();
        assert_eq!(sync.bpm(), 999.0);
    }

    #[test]
    fn test_internal_transport_is_echoed() {
        let sync = clock();
        let rx = sync.output();
        sync.start();
        sync.stop();
        let sent: Vec<_> = drain(&rx)
            .into_iter()
            .filter(|m| *m != MidiMessage::Clock)
            .collect();
        assert_eq!(sent, vec![MidiMessage::Start, MidiMessage::Stop]);
        assert!(!sync.is_generating());
    }

    #[test]
    fn test_external_transport_is_not_echoed() {
        let sync = ClockSync::new(SyncConfig {
            mode: SyncMode::External,
            ..SyncConfig::default()
        })
        .unwrap();
        let rx = sync.output();
        sync.receive_transport(TransportMessage::Start, 0.0);
        assert!(sync.state().is_playing);
        assert!(drain(&rx).is_empty());
        assert!(!sync.is_generating());
    }

    #[test]
    fn test_ramp_advances_on_poll() {
        let sync = clock();
        sync.set_ramp_time(1.0);
        sync.ramp_to_bpm(140.0).unwrap();
        let start = sync.now();
        sync.poll_at(start + 0.5);
        let midway = sync.bpm();
        assert!(midway > 120.0 && midway < 140.0, "midway was {}", midway);
        sync.poll_at(start + 2.0);
        assert_eq!(sync.bpm(), 140.0);
    }

    #[test]
    fn test_set_bpm_cancels_ramp() {
        let sync = clock();
        sync.ramp_to_bpm(200.0).unwrap();
        sync.set_bpm(90.0).unwrap();
        sync.poll_at(sync.now() + 5.0);
        assert_eq!(sync.bpm(), 90.0);
    }

    #[test]
    fn test_arm_unknown_track() {
        let sync = clock();
        assert!(matches!(
            sync.arm_recording(Some(7)),
            Err(ClockError::UnknownTrack(7))
        ));
        let id = sync.add_track(Track::new("rec"));
        sync.arm_recording(Some(id)).unwrap();
        assert_eq!(sync.armed_track(), Some(id));
        sync.remove_track(id);
        assert_eq!(sync.armed_track(), None);
    }

    #[test]
    fn test_record_message_needs_armed_track() {
        let sync = clock();
        let msg = MidiMessage::NoteOn {
            channel: 0,
            note: 60,
            velocity: 100,
        };
        assert_eq!(sync.record_message(&msg, 0.0).unwrap(), None);

        let id = sync.add_track(Track::new("rec"));
        sync.arm_recording(Some(id)).unwrap();
        assert!(sync.record_message(&msg, 0.0).unwrap().is_some());
        assert_eq!(sync.record_message(&MidiMessage::Clock, 0.0).unwrap(), None);
        assert_eq!(sync.track(id).unwrap().events().len(), 1);
    }

    #[test]
    fn test_with_track_edits_in_place() {
        let sync = clock();
        let id = sync.add_track(Track::new("bass"));
        sync.with_track(id, |t| t.muted = true).unwrap();
        assert!(sync.track(id).unwrap().muted);
        assert!(sync.with_track(99, |_| ()).is_err());
    }

    #[test]
    fn test_mode_change_is_published() {
        let sync = clock();
        let sub = sync.subscribe();
        sync.set_sync_mode(SyncMode::External);
        assert_eq!(
            sub.events.try_recv().unwrap(),
            SyncEvent::ModeChanged(SyncMode::External)
        );
        assert!(sync.unsubscribe(sub.id));
    }
}
