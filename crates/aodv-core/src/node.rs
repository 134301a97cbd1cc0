//! Node engine: a single-consumer event loop guarded by two supervisors.
//!
//! A [`Node`] owns its [`NodeState`] and both supervisors by value. The only
//! way to mutate them is [`Node::process_event`], which the node's own loop
//! ([`Node::run`]) calls once per dequeued [`Delivery`]. Everyone else reads
//! immutable [`NodeSnapshot`]s through a [`NodeObserver`].
//!
//! # Processing an event
//!
//! 1. Decide whether the event concerns this node (`source == id`).
//! 2. Ask the relevant supervisor *before* committing a transition:
//!    - own `RequestSend` → `Waiting` if the RREQ guard allows, else blocked
//!    - own `ReplyReceive` → `Forwarding` if the RREP guard allows, else blocked
//!    - any `DataSend` → `Idle`
//!    - everything else is observational
//! 3. Feed the event to both supervisors, whatever the decision was.
//! 4. Publish a snapshot and return an [`Observation`].

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::event::{Event, EventKind, NodeId};
use crate::supervisor::{RrepState, RrepSupervisor, RreqState, RreqSupervisor, Supervisor};

/// Protocol state of a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeState {
    #[default]
    Idle,
    /// A route request is out.
    Waiting,
    /// A route reply was accepted.
    Forwarding,
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Waiting => write!(f, "Waiting"),
            Self::Forwarding => write!(f, "Forwarding"),
        }
    }
}

/// A protocol action a node can attempt on its own behalf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    SendRequest,
    AcceptReply,
    SendData,
}

/// The actions a supervisor can refuse. Sending data is never guarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Guarded {
    SendRequest,
    AcceptReply,
}

impl From<Guarded> for Action {
    fn from(action: Guarded) -> Self {
        match action {
            Guarded::SendRequest => Action::SendRequest,
            Guarded::AcceptReply => Action::AcceptReply,
        }
    }
}

/// What the node made of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    /// The event was this node's action and it was allowed.
    Granted(Action),
    /// The event was this node's action and a supervisor refused it.
    Blocked(Guarded),
    /// The event only fed the supervisors (and may still reset the state).
    Observed,
}

/// Immutable view of a node after some number of processed events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub state: NodeState,
    pub rreq: RreqState,
    pub rrep: RrepState,
    /// Events processed so far.
    pub processed: u64,
}

impl NodeSnapshot {
    fn initial(id: NodeId) -> Self {
        Self {
            id,
            state: NodeState::Idle,
            rreq: RreqState::Unlocked,
            rrep: RrepState::Locked,
            processed: 0,
        }
    }

    /// Whether the node's RREQ guard would allow a request.
    pub fn can_send(&self) -> bool {
        self.rreq == RreqState::Unlocked
    }

    /// Whether the node's RREP guard would allow accepting a reply.
    pub fn can_accept(&self) -> bool {
        self.rrep == RrepState::Unlocked
    }
}

impl fmt::Display for NodeSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Node {}: state={} rreq={} rrep={} processed={}",
            self.id, self.state, self.rreq, self.rrep, self.processed
        )
    }
}

/// Result of processing one event on one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub node: NodeId,
    pub event: Event,
    /// Node state before the event.
    pub before: NodeState,
    pub outcome: Outcome,
    /// Node state, both guards and counters after the event.
    pub snapshot: NodeSnapshot,
}

impl Observation {
    /// Whether the node state changed.
    pub fn transitioned(&self) -> bool {
        self.before != self.snapshot.state
    }
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let node = self.node;
        match self.outcome {
            Outcome::Granted(Action::SendRequest) => write!(f, "Node {node} sending RREQ"),
            Outcome::Blocked(Guarded::SendRequest) => {
                write!(f, "Node {node} blocked from sending RREQ by supervisor")
            }
            Outcome::Granted(Action::AcceptReply) => write!(f, "Node {node} accepting RREP"),
            Outcome::Blocked(Guarded::AcceptReply) => {
                write!(f, "Node {node} blocked from accepting RREP by supervisor")
            }
            Outcome::Granted(Action::SendData) => write!(f, "Node {node} sending DATA"),
            Outcome::Observed => match self.event.kind {
                EventKind::DataSend => {
                    write!(f, "Node {node} received DATA from Node {}", self.event.source)
                }
                EventKind::ReplyForward | EventKind::OtherRequest => {
                    write!(f, "Node {node} received {} event", self.event.kind)
                }
                EventKind::RequestSend | EventKind::ReplyReceive => {
                    write!(f, "Node {node} observed {}", self.event)
                }
            },
        }
    }
}

/// One queue item: an event plus an optional acknowledgment channel.
///
/// The node answers on `ack` only after the event has been fully applied and
/// the new snapshot published.
#[derive(Debug)]
pub struct Delivery {
    /// Driver-assigned sequence number, for logs and errors.
    pub seq: u64,
    pub event: Event,
    pub ack: Option<oneshot::Sender<Observation>>,
}

impl Delivery {
    /// A delivery nobody waits on.
    pub fn new(seq: u64, event: Event) -> Self {
        Self {
            seq,
            event,
            ack: None,
        }
    }

    /// A delivery plus the receiver its acknowledgment will arrive on.
    pub fn with_ack(seq: u64, event: Event) -> (Self, oneshot::Receiver<Observation>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                seq,
                event,
                ack: Some(tx),
            },
            rx,
        )
    }
}

/// Thread-safe read access to the snapshots a node publishes.
#[derive(Debug, Clone)]
pub struct NodeObserver {
    rx: watch::Receiver<NodeSnapshot>,
}

impl NodeObserver {
    /// Latest published snapshot.
    pub fn snapshot(&self) -> NodeSnapshot {
        *self.rx.borrow()
    }

    pub fn id(&self) -> NodeId {
        self.rx.borrow().id
    }

    pub fn state(&self) -> NodeState {
        self.rx.borrow().state
    }

    /// Wait until the node has processed at least `count` events.
    ///
    /// Returns the first snapshot satisfying that, or `None` if the node was
    /// dropped before getting there.
    pub async fn wait_processed(&mut self, count: u64) -> Option<NodeSnapshot> {
        self.rx
            .wait_for(|snapshot| snapshot.processed >= count)
            .await
            .ok()
            .map(|snapshot| *snapshot)
    }
}

/// Grant `action` and move to `next` if `guard` permits it.
fn consult<S: Supervisor>(
    guard: &S,
    action: Guarded,
    next: NodeState,
) -> (Outcome, Option<NodeState>) {
    if guard.permits() {
        (Outcome::Granted(action.into()), Some(next))
    } else {
        (Outcome::Blocked(action), None)
    }
}

/// A simulated network node.
#[derive(Debug)]
pub struct Node {
    id: NodeId,
    state: NodeState,
    rreq: RreqSupervisor,
    rrep: RrepSupervisor,
    processed: u64,
    queue: Option<mpsc::Receiver<Delivery>>,
    published: watch::Sender<NodeSnapshot>,
}

impl Node {
    /// A fresh node: `Idle`, RREQ guard unlocked, RREP guard locked, no queue.
    pub fn new(id: NodeId) -> Self {
        let (published, _) = watch::channel(NodeSnapshot::initial(id));
        Self {
            id,
            state: NodeState::Idle,
            rreq: RreqSupervisor::new(),
            rrep: RrepSupervisor::new(id),
            processed: 0,
            queue: None,
            published,
        }
    }

    /// Bind the node's input queue. Must happen before [`Node::run`].
    pub fn attach_queue(&mut self, queue: mpsc::Receiver<Delivery>) {
        self.queue = Some(queue);
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn rreq(&self) -> &RreqSupervisor {
        &self.rreq
    }

    pub fn rrep(&self) -> &RrepSupervisor {
        &self.rrep
    }

    /// Current view of this node.
    pub fn snapshot(&self) -> NodeSnapshot {
        NodeSnapshot {
            id: self.id,
            state: self.state,
            rreq: self.rreq.state(),
            rrep: self.rrep.state(),
            processed: self.processed,
        }
    }

    /// A read handle that keeps working after the node moves into its task.
    pub fn observer(&self) -> NodeObserver {
        NodeObserver {
            rx: self.published.subscribe(),
        }
    }

    /// Pick the outcome and the state to commit, consulting the guards.
    fn decide(&self, event: &Event) -> (Outcome, Option<NodeState>) {
        let own = event.is_from(self.id);
        match event.kind {
            EventKind::RequestSend if own => {
                consult(&self.rreq, Guarded::SendRequest, NodeState::Waiting)
            }
            EventKind::ReplyReceive if own => {
                consult(&self.rrep, Guarded::AcceptReply, NodeState::Forwarding)
            }
            EventKind::DataSend if own => {
                (Outcome::Granted(Action::SendData), Some(NodeState::Idle))
            }
            EventKind::DataSend => (Outcome::Observed, Some(NodeState::Idle)),
            // Someone else's request or reply, any forward, an overheard
            // request: no node state rule applies, the guards still see it.
            EventKind::RequestSend
            | EventKind::ReplyReceive
            | EventKind::ReplyForward
            | EventKind::OtherRequest => (Outcome::Observed, None),
        }
    }

    /// Apply one event. Never fails.
    pub fn process_event(&mut self, event: &Event) -> Observation {
        let before = self.state;
        let (outcome, next) = self.decide(event);
        if let Some(next) = next {
            self.state = next;
        }

        self.rreq.process(event);
        self.rrep.process(event);
        self.processed += 1;

        let snapshot = self.snapshot();
        self.published.send_replace(snapshot);

        match outcome {
            Outcome::Granted(action) => info!(
                node = %self.id,
                ?action,
                from = %before,
                to = %self.state,
                "action granted"
            ),
            Outcome::Blocked(action) => warn!(
                node = %self.id,
                ?action,
                rreq = %snapshot.rreq,
                rrep = %snapshot.rrep,
                "action blocked by supervisor"
            ),
            Outcome::Observed => trace!(
                node = %self.id,
                event = %event,
                state = %self.state,
                "event observed"
            ),
        }

        Observation {
            node: self.id,
            event: *event,
            before,
            outcome,
            snapshot,
        }
    }

    /// Drain the attached queue until it is closed, then hand the node back.
    ///
    /// Events are processed strictly one at a time in queue order.
    pub async fn run(mut self) -> Result<Self> {
        let mut queue = self.queue.take().ok_or(Error::QueueNotAttached(self.id))?;
        debug!(node = %self.id, "node loop started");

        while let Some(delivery) = queue.recv().await {
            let observation = self.process_event(&delivery.event);
            if let Some(ack) = delivery.ack {
                if ack.send(observation).is_err() {
                    warn!(node = %self.id, seq = delivery.seq, "acknowledgment receiver dropped");
                }
            }
        }

        debug!(node = %self.id, processed = self.processed, "queue closed, node loop stopped");
        Ok(self)
    }
}
