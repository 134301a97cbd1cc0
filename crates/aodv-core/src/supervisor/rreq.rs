//! Guard over route request issuance.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::Supervisor;
use crate::event::{Event, EventKind};

/// State of the route request guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RreqState {
    /// No request cycle in flight; a request may be sent.
    Unlocked,
    /// A request cycle is in flight and must be waited out.
    Locked,
}

impl fmt::Display for RreqState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unlocked => write!(f, "Unlocked"),
            Self::Locked => write!(f, "Locked"),
        }
    }
}

/// Allows at most one route request cycle at a time.
///
/// The guard locks on *any* `RequestSend` it observes, including requests
/// issued by other nodes: it tracks "a cycle is in flight", not "I asked".
/// A `DataSend` or `ReplyForward` from anyone closes the cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RreqSupervisor {
    state: RreqState,
}

impl Default for RreqSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl RreqSupervisor {
    /// A fresh, unlocked guard.
    #[must_use]
    pub const fn new() -> Self {
        Self::with_state(RreqState::Unlocked)
    }

    #[must_use]
    pub const fn with_state(state: RreqState) -> Self {
        Self { state }
    }

    /// Whether this node may send a route request now.
    #[must_use]
    pub fn can_send(&self) -> bool {
        self.state == RreqState::Unlocked
    }

    /// Transition function of the guard.
    #[must_use]
    pub const fn next_state(state: RreqState, event: &Event) -> RreqState {
        match (state, event.kind) {
            (RreqState::Unlocked, EventKind::RequestSend) => RreqState::Locked,
            (RreqState::Locked, EventKind::DataSend | EventKind::ReplyForward) => {
                RreqState::Unlocked
            }
            // Not in the table: no transition.
            (state, _) => state,
        }
    }
}

impl Supervisor for RreqSupervisor {
    type State = RreqState;

    fn state(&self) -> RreqState {
        self.state
    }

    fn permits(&self) -> bool {
        self.can_send()
    }

    fn process(&mut self, event: &Event) {
        self.state = Self::next_state(self.state, event);
    }
}
