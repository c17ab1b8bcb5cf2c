//! Transport state machine
//!
//! Start/Stop/Continue never fail. Messages that make no sense in the
//! current state are mapped to the closest sensible transition.

use log::{debug, info};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    #[default]
    Stopped,
    Playing,
    Continuing,
}

impl TransportState {
    pub fn is_playing(&self) -> bool {
        matches!(self, TransportState::Playing | TransportState::Continuing)
    }
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportState::Stopped => write!(f, "stopped"),
            TransportState::Playing => write!(f, "playing"),
            TransportState::Continuing => write!(f, "continuing"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMessage {
    Start,
    Stop,
    Continue,
}

/// Outcome of applying a [`TransportMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportTransition {
    pub from: TransportState,
    pub to: TransportState,
    /// The song position must go back to zero.
    pub reset_position: bool,
}

impl TransportTransition {
    pub fn changed(&self) -> bool {
        self.from != self.to || self.reset_position
    }

    pub fn started(&self) -> bool {
        !self.from.is_playing() && self.to.is_playing()
    }

    pub fn stopped(&self) -> bool {
        self.from.is_playing() && !self.to.is_playing()
    }
}

#[derive(Debug, Default)]
pub struct TransportController {
    state: TransportState,
    has_started: bool,
}

impl TransportController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state.is_playing()
    }

    pub fn apply(&mut self, message: TransportMessage) -> TransportTransition {
        let from = self.state;
        let (to, reset_position) = match (message, from) {
            (TransportMessage::Start, _) => (TransportState::Playing, true),
            (TransportMessage::Stop, _) => (TransportState::Stopped, false),
            (TransportMessage::Continue, TransportState::Stopped) if !self.has_started => {
                debug!("Continue without a prior Start, treating it as Start");
                (TransportState::Playing, true)
            }
            (TransportMessage::Continue, _) => (TransportState::Continuing, false),
        };

        if to == TransportState::Playing && reset_position {
            self.has_started = true;
        }
        self.state = to;

        let transition = TransportTransition {
            from,
            to,
            reset_position,
        };
        if transition.changed() {
            info!("Transport {} -> {} ({:?})", from, to, message);
        }
        transition
    }
}
