//! Supervisory guards over a node's protocol actions.
//!
//! A supervisor is a small state machine that watches every event delivered
//! to its node and answers one question: is the guarded action allowed right
//! now? It never rejects anything itself; the node consults it before
//! committing a transition and then feeds it the event regardless of the
//! outcome.
//!
//! - [`RreqSupervisor`]: at most one route request cycle in flight.
//! - [`RrepSupervisor`]: a reply is accepted only after someone else forwarded
//!   or sent data.
//!
//! Both transition functions are total. Any (state, event) pair missing from
//! a table falls into an explicit "unchanged" arm.

mod rrep;
mod rreq;

use std::fmt::Debug;

use crate::event::Event;

pub use rrep::{RrepState, RrepSupervisor};
pub use rreq::{RreqState, RreqSupervisor};

/// A guard state machine owned by exactly one node.
pub trait Supervisor {
    /// The guard's state.
    type State: Copy + Eq + Debug;

    /// Current state.
    fn state(&self) -> Self::State;

    /// Whether the guarded action may be taken in the current state.
    fn permits(&self) -> bool;

    /// Apply one event. Never fails; unmatched events leave the state unchanged.
    fn process(&mut self, event: &Event);
}
