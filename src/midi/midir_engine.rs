use crate::midi::{MidiEngine, MidiError, MidiMessage, Result, TimedMessage};
use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError};
use log::{info, trace, warn};
use midir::{Ignore, MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use parking_lot::Mutex;
use std::time::{Duration, Instant};

const CLIENT_NAME: &str = "clocksyncrs";

pub struct MidirEngine {
    _input: Mutex<Option<MidiInputConnection<()>>>,
    output: Mutex<Option<MidiOutputConnection>>,
    rx: Option<Receiver<TimedMessage>>,
}

impl MidirEngine {
    /// Connects input and output ports whose names contain `device_name`.
    /// With no device the engine is inert: sends are dropped and nothing is
    /// ever received.
    pub fn new(device_name: Option<String>) -> Result<Self> {
        let Some(name) = device_name else {
            return Ok(Self {
                _input: Mutex::new(None),
                output: Mutex::new(None),
                rx: None,
            });
        };

        let mut midi_in = MidiInput::new(&format!("{}-in", CLIENT_NAME))
            .map_err(|e| MidiError::Connection(e.to_string()))?;
        // Clock and SysEx must both come through
        midi_in.ignore(Ignore::None);

        let in_ports = midi_in.ports();
        let in_port = in_ports
            .iter()
            .find(|p| midi_in.port_name(p).unwrap_or_default().contains(&name))
            .ok_or_else(|| MidiError::DeviceNotFound(name.clone()))?;
        info!(
            "Connecting to MIDI input port: {}",
            midi_in.port_name(in_port).unwrap_or_default()
        );

        let (tx, rx) = unbounded();
        let input = midi_in
            .connect(
                in_port,
                "clocksyncrs-input",
                move |_stamp, bytes, _| {
                    let received_at = Instant::now();
                    match MidiMessage::from_bytes(bytes) {
                        Some(message) => {
                            let _ = tx.send(TimedMessage {
                                message,
                                received_at,
                            });
                        }
                        None => trace!("Ignoring MIDI bytes {:02X?}", bytes),
                    }
                },
                (),
            )
            .map_err(|e| MidiError::Connection(e.to_string()))?;

        let midi_out = MidiOutput::new(&format!("{}-out", CLIENT_NAME))
            .map_err(|e| MidiError::Connection(e.to_string()))?;
        let out_ports = midi_out.ports();
        let output = match out_ports
            .iter()
            .find(|p| midi_out.port_name(p).unwrap_or_default().contains(&name))
        {
            Some(out_port) => {
                info!(
                    "Connecting to MIDI output port: {}",
                    midi_out.port_name(out_port).unwrap_or_default()
                );
                Some(
                    midi_out
                        .connect(out_port, "clocksyncrs-output")
                        .map_err(|e| MidiError::Connection(e.to_string()))?,
                )
            }
            None => {
                warn!("No MIDI output port matches '{}', input only", name);
                None
            }
        };

        Ok(Self {
            _input: Mutex::new(Some(input)),
            output: Mutex::new(output),
            rx: Some(rx),
        })
    }
}

impl MidiEngine for MidirEngine {
    fn send(&self, msg: &MidiMessage) -> Result<()> {
        if let Some(output) = self.output.lock().as_mut() {
            output
                .send(&msg.to_bytes())
                .map_err(|e| MidiError::Send(e.to_string()))?;
        }
        Ok(())
    }

    fn recv_timeout(&self, timeout: Duration) -> Result<Option<TimedMessage>> {
        let Some(rx) = &self.rx else {
            std::thread::sleep(timeout);
            return Ok(None);
        };
        match rx.recv_timeout(timeout) {
            Ok(message) => Ok(Some(message)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(MidiError::Disconnected),
        }
    }

    fn list_devices(&self) -> Vec<String> {
        list_devices()
    }
}

/// Names of the MIDI input ports currently visible to the system.
pub fn list_devices() -> Vec<String> {
    let mut devices = Vec::new();

    if let Ok(midi_in) = MidiInput::new(&format!("{}-list", CLIENT_NAME)) {
        for port in midi_in.ports() {
            if let Ok(name) = midi_in.port_name(&port) {
                devices.push(name);
            }
        }
    }

    devices
}
