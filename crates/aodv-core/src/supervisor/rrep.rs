//! Guard over route reply acceptance.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::Supervisor;
use crate::event::{Event, EventKind, NodeId};

/// State of the route reply guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RrepState {
    /// No evidence from elsewhere yet; replies are refused.
    Locked,
    /// Another node forwarded or sent data; one reply may be accepted.
    Unlocked,
}

impl fmt::Display for RrepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Locked => write!(f, "Locked"),
            Self::Unlocked => write!(f, "Unlocked"),
        }
    }
}

/// Allows accepting a route reply only after another node acted.
///
/// Unlocks on a `DataSend` or `ReplyForward` whose source is some other node
/// and locks again once this node accepts a reply (`ReplyReceive` from self).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RrepSupervisor {
    node: NodeId,
    state: RrepState,
}

impl RrepSupervisor {
    /// A fresh, locked guard for `node`.
    #[must_use]
    pub const fn new(node: NodeId) -> Self {
        Self::with_state(node, RrepState::Locked)
    }

    #[must_use]
    pub const fn with_state(node: NodeId, state: RrepState) -> Self {
        Self { node, state }
    }

    /// The node this guard belongs to.
    #[must_use]
    pub const fn node(&self) -> NodeId {
        self.node
    }

    /// Whether this node may accept a route reply now.
    #[must_use]
    pub fn can_accept(&self) -> bool {
        self.state == RrepState::Unlocked
    }

    /// Transition function of the guard owned by `node`.
    #[must_use]
    pub fn next_state(node: NodeId, state: RrepState, event: &Event) -> RrepState {
        let own = event.is_from(node);
        match (state, event.kind) {
            (RrepState::Locked, EventKind::DataSend | EventKind::ReplyForward) if !own => {
                RrepState::Unlocked
            }
            (RrepState::Unlocked, EventKind::ReplyReceive) if own => RrepState::Locked,
            // Not in the table, or the source condition failed: no transition.
            (state, _) => state,
        }
    }
}

impl Supervisor for RrepSupervisor {
    type State = RrepState;

    fn state(&self) -> RrepState {
        self.state
    }

    fn permits(&self) -> bool {
        self.can_accept()
    }

    fn process(&mut self, event: &Event) {
        self.state = Self::next_state(self.node, self.state, event);
    }
}
