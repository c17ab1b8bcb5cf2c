use crate::midi::{MidiEngine, MidiError, MidiMessage, Result, TimedMessage};
use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// In-memory engine: tests script the input side and inspect what was sent.
pub struct MockMidiEngine {
    input_tx: Sender<TimedMessage>,
    input_rx: Receiver<TimedMessage>,
    sent: Mutex<Vec<MidiMessage>>,
    devices: Vec<String>,
}

impl Default for MockMidiEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MockMidiEngine {
    pub fn new() -> Self {
        let (input_tx, input_rx) = unbounded();
        Self {
            input_tx,
            input_rx,
            sent: Mutex::new(Vec::new()),
            devices: vec!["Mock Device 1".to_string(), "Mock Device 2".to_string()],
        }
    }

    /// Queues a message as if it arrived now.
    pub fn push_input(&self, message: MidiMessage) {
        self.push_input_at(message, Instant::now());
    }

    pub fn push_input_at(&self, message: MidiMessage, received_at: Instant) {
        let _ = self.input_tx.send(TimedMessage {
            message,
            received_at,
        });
    }

    /// Queues raw bytes, parsed the way a device callback would.
    pub fn push_bytes(&self, bytes: &[u8]) -> bool {
        match MidiMessage::from_bytes(bytes) {
            Some(message) => {
                self.push_input(message);
                true
            }
            None => false,
        }
    }

    pub fn pending_input(&self) -> usize {
        self.input_rx.len()
    }

    pub fn sent(&self) -> Vec<MidiMessage> {
        self.sent.lock().clone()
    }

    pub fn clear_sent(&self) {
        self.sent.lock().clear();
    }
}

impl MidiEngine for MockMidiEngine {
    fn send(&self, msg: &MidiMessage) -> Result<()> {
        self.sent.lock().push(msg.clone());
        Ok(())
    }

    fn recv_timeout(&self, timeout: Duration) -> Result<Option<TimedMessage>> {
        match self.input_rx.recv_timeout(timeout) {
            Ok(message) => Ok(Some(message)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(MidiError::Disconnected),
        }
    }

    fn list_devices(&self) -> Vec<String> {
        self.devices.clone()
    }
}
