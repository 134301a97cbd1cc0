//! Canned scripts and the manual route-discovery cycle.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::driver::{Driver, StepReport};
use crate::error::Result;
use crate::event::{Event, EventKind, NodeId};

/// Two-node script exercising every guard transition on both nodes.
pub fn reference_script() -> Vec<Event> {
    use EventKind::*;

    let (a, b) = (NodeId(1), NodeId(2));
    [
        (a, RequestSend),  // node 1 request goes out
        (a, RequestSend),  // blocked: cycle still in flight
        (a, RequestSend),  // blocked
        (a, RequestSend),  // blocked
        (a, ReplyReceive), // blocked: nobody forwarded yet
        (b, ReplyForward), // closes the cycle, opens node 1 reply guard
        (a, ReplyReceive), // accepted
        (b, RequestSend),  // node 2 request goes out
        (b, RequestSend),  // blocked
        (a, DataSend),     // closes the cycle, opens node 2 reply guard
        (b, RequestSend),  // accepted again
        (a, ReplyForward), // closes the cycle
        (b, RequestSend),  // accepted
        (b, ReplyReceive), // accepted
        (a, ReplyForward), // reopens node 2 reply guard
        (b, ReplyReceive), // accepted
    ]
    .into_iter()
    .map(|(source, kind)| Event::new(source, kind))
    .collect()
}

/// Load a script from a JSON array of `{"source": 1, "kind": "RREQ_SEND"}` objects.
pub fn load_script(path: impl AsRef<Path>) -> Result<Vec<Event>> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// One hop of a discovered route, as reported to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathStep {
    SentRequest { from: NodeId },
    ReceivedRequest { at: NodeId, from: NodeId },
    ForwardedReply { from: NodeId, to: NodeId },
    ReceivedReply { at: NodeId, from: NodeId },
    SentData { from: NodeId, to: NodeId },
}

impl fmt::Display for PathStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SentRequest { from } => write!(f, "Node {from} sent RREQ"),
            Self::ReceivedRequest { at, from } => {
                write!(f, "Node {at} received RREQ from Node {from}")
            }
            Self::ForwardedReply { from, to } => write!(f, "Node {from} forwarded RREP to Node {to}"),
            Self::ReceivedReply { at, from } => write!(f, "Node {at} received RREP from Node {from}"),
            Self::SentData { from, to } => write!(f, "Node {from} sent DATA to Node {to}"),
        }
    }
}

/// A full request/reply/data cycle between two nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteDiscovery {
    pub initiator: NodeId,
    pub responder: NodeId,
}

impl RouteDiscovery {
    pub const fn new(initiator: NodeId, responder: NodeId) -> Self {
        Self {
            initiator,
            responder,
        }
    }

    /// The broadcast events of the cycle, each with the path step it stands for.
    pub fn steps(&self) -> [(Event, PathStep); 5] {
        let (a, b) = (self.initiator, self.responder);
        [
            (
                Event::new(a, EventKind::RequestSend),
                PathStep::SentRequest { from: a },
            ),
            (
                Event::new(a, EventKind::OtherRequest),
                PathStep::ReceivedRequest { at: b, from: a },
            ),
            (
                Event::new(b, EventKind::ReplyForward),
                PathStep::ForwardedReply { from: b, to: a },
            ),
            (
                Event::new(a, EventKind::ReplyReceive),
                PathStep::ReceivedReply { at: a, from: b },
            ),
            (
                Event::new(a, EventKind::DataSend),
                PathStep::SentData { from: a, to: b },
            ),
        ]
    }

    /// Run the cycle on `driver` unless the initiator's request guard is locked.
    ///
    /// The guard is checked on the initiator's published snapshot before any
    /// event is fed; a blocked discovery leaves every node untouched.
    pub async fn run(&self, driver: &mut Driver) -> Result<RouteOutcome> {
        // Both ids must belong to the driver.
        driver.snapshot(self.responder)?;
        if !driver.snapshot(self.initiator)?.can_send() {
            warn!(node = %self.initiator, "route discovery blocked by supervisor");
            return Ok(RouteOutcome::Blocked {
                node: self.initiator,
            });
        }

        let mut path = Vec::new();
        let mut reports = Vec::new();
        for (event, step) in self.steps() {
            let report = driver.feed(event).await?;
            // A hop that missed a node breaks the route.
            report.ensure_complete()?;
            reports.push(report);
            path.push(step);
        }

        info!(
            initiator = %self.initiator,
            responder = %self.responder,
            "route discovery completed"
        );
        Ok(RouteOutcome::Completed { path, reports })
    }
}

/// Result of a route discovery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// The cycle ran; `path` is the user-facing log, `reports` the raw steps.
    Completed {
        path: Vec<PathStep>,
        reports: Vec<StepReport>,
    },
    /// The initiator was not allowed to send a request.
    Blocked { node: NodeId },
}
