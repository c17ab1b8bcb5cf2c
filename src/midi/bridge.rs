//! Glue between a [`MidiEngine`] and a [`ClockSync`]
//!
//! Incoming clock, transport and Song Position messages become facade
//! calls; channel messages are recorded onto the armed track. Outgoing
//! messages are drained from [`ClockSync::output`] and sent to the device.

use crate::midi::{MidiEngine, MidiError, MidiMessage, TimedMessage};
use crate::sync::ClockSync;
use crate::transport::TransportMessage;
use crossbeam::channel::{bounded, select, Receiver, Sender, TryRecvError};
use log::{debug, error, info, trace, warn};
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const INPUT_POLL: Duration = Duration::from_millis(20);

/// Applies one received message to the clock. The arrival instant is
/// converted onto the clock's time base so jitter in this thread does not
/// reach the pulse filter.
pub fn route_message(sync: &ClockSync, timed: TimedMessage) {
    let timestamp = sync.seconds_at(timed.received_at);
    match timed.message {
        MidiMessage::Clock => {
            sync.receive_clock_pulse(timestamp);
        }
        MidiMessage::Start => sync.receive_transport(TransportMessage::Start, timestamp),
        MidiMessage::Stop => sync.receive_transport(TransportMessage::Stop, timestamp),
        MidiMessage::Continue => sync.receive_transport(TransportMessage::Continue, timestamp),
        MidiMessage::SongPosition { sixteenths } => {
            if sixteenths % 4 == 0 {
                sync.receive_song_position(u32::from(sixteenths / 4), timestamp);
            } else {
                sync.locate(f64::from(sixteenths) / 4.0);
            }
        }
        other => match sync.record_message(&other, timestamp) {
            Ok(Some(id)) => debug!("Recorded {:?} as event {}", other, id),
            Ok(None) => trace!("No route for {:?}", other),
            Err(e) => warn!("Could not record {:?}: {}", other, e),
        },
    }
}

/// Receives from `engine` until `shutdown` fires or is dropped, or the
/// device goes away.
pub fn run_input_loop<E: MidiEngine + ?Sized>(
    engine: &E,
    sync: &ClockSync,
    shutdown: &Receiver<()>,
) {
    info!("MIDI input loop started");
    loop {
        match shutdown.try_recv() {
            Err(TryRecvError::Empty) => {}
            Ok(()) | Err(TryRecvError::Disconnected) => break,
        }

        match engine.recv_timeout(INPUT_POLL) {
            Ok(Some(timed)) => route_message(sync, timed),
            Ok(None) => {}
            Err(MidiError::Disconnected) => {
                error!("MIDI input disconnected");
                break;
            }
            Err(e) => warn!("MIDI receive failed: {}", e),
        }
    }
    info!("MIDI input loop stopped");
}

/// Sends everything arriving on `messages` until `shutdown` fires or is
/// dropped.
pub fn run_output_loop<E: MidiEngine + ?Sized>(
    engine: &E,
    messages: &Receiver<MidiMessage>,
    shutdown: &Receiver<()>,
) {
    info!("MIDI output loop started");
    loop {
        let keep_going = select! {
            recv(messages) -> message => match message {
                Ok(message) => {
                    if let Err(e) = engine.send(&message) {
                        error!("Failed to send {:?}: {}", message, e);
                    }
                    true
                }
                Err(_) => false,
            },
            recv(shutdown) -> _ => false,
        };
        if !keep_going {
            break;
        }
    }
    info!("MIDI output loop stopped");
}

/// The input and output threads for one device.
pub struct MidiBridge {
    shutdown: Option<Sender<()>>,
    threads: Vec<JoinHandle<()>>,
}

impl MidiBridge {
    pub fn spawn<E: MidiEngine + 'static>(engine: Arc<E>, sync: ClockSync) -> io::Result<Self> {
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);

        let input_engine = Arc::clone(&engine);
        let input_sync = sync.clone();
        let input_shutdown = shutdown_rx.clone();
        let input = thread::Builder::new()
            .name("clocksync-midi-in".to_string())
            .spawn(move || run_input_loop(&*input_engine, &input_sync, &input_shutdown))?;

        let messages = sync.output();
        let output = thread::Builder::new()
            .name("clocksync-midi-out".to_string())
            .spawn(move || run_output_loop(&*engine, &messages, &shutdown_rx))?;

        Ok(Self {
            shutdown: Some(shutdown_tx),
            threads: vec![input, output],
        })
    }

    /// Signals both threads and waits for them.
    pub fn stop(&mut self) {
        // Dropping the sender disconnects every receiver.
        self.shutdown.take();
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for MidiBridge {
    fn drop(&mut self) {
        self.stop();
    }
}
