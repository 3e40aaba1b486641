//! Connection state machine

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::types::{FabricError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    Uninitialized,
    Authenticating,
    Connecting,
    Connected,
    Reconnecting,
    Draining,
    Closed,
    Failed,
}

impl ConnectionState {
    /// `Closed` and `Failed` accept no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }

    /// Whether the transport may be used in this state
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Connected | Self::Reconnecting)
    }

    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;

        match (*self, next) {
            (from, _) if from.is_terminal() => false,
            (_, Failed) => true,
            (Uninitialized, Authenticating)
            | (Authenticating, Connecting)
            | (Connecting, Connected)
            | (Connected, Reconnecting)
            | (Connected, Draining)
            | (Reconnecting, Connected)
            | (Reconnecting, Draining)
            | (Draining, Closed) => true,
            _ => false,
        }
    }

    /// Exit code recommended to the hosting process once terminal
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Closed => Some(0),
            Self::Failed => Some(1),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Authenticating => "authenticating",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Draining => "draining",
            Self::Closed => "closed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Holder of the current state.
///
/// `transition` is the only mutation path; the check and the write happen
/// under the channel's lock, so two racing callers cannot both win.
#[derive(Debug)]
pub struct StateMachine {
    tx: watch::Sender<ConnectionState>,
}

impl StateMachine {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ConnectionState::Uninitialized);
        Self { tx }
    }

    pub fn current(&self) -> ConnectionState {
        *self.tx.borrow()
    }

    pub fn watch(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }

    /// Move to `to`, returning the state it left
    pub fn transition(&self, to: ConnectionState) -> Result<ConnectionState> {
        let mut outcome = Err(FabricError::InvalidTransition { from: to, to });

        self.tx.send_if_modified(|state| {
            if state.can_transition_to(to) {
                outcome = Ok(*state);
                *state = to;
                true
            } else {
                outcome = Err(FabricError::InvalidTransition { from: *state, to });
                false
            }
        });

        outcome
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}
