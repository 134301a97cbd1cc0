//! Protocol events delivered to node queues.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A unique node identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NodeId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u32>()
            .map(NodeId)
            .map_err(|_| Error::InvalidNodeId(s.to_string()))
    }
}

/// What happened. Closed set; serialized with the protocol names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// A node issues a route request.
    #[serde(rename = "RREQ_SEND")]
    RequestSend,
    /// A node receives a route reply.
    #[serde(rename = "RREP_RECV")]
    ReplyReceive,
    /// A node sends data, closing a request/reply cycle.
    #[serde(rename = "DATA_SEND")]
    DataSend,
    /// A node forwards a route reply.
    #[serde(rename = "RREP_FORWARD")]
    ReplyForward,
    /// A route request from elsewhere was heard.
    #[serde(rename = "OTHER_RREQ")]
    OtherRequest,
}

impl EventKind {
    /// Every kind, in declaration order.
    pub const ALL: [EventKind; 5] = [
        EventKind::RequestSend,
        EventKind::ReplyReceive,
        EventKind::DataSend,
        EventKind::ReplyForward,
        EventKind::OtherRequest,
    ];

    /// Protocol name of this kind.
    pub const fn name(&self) -> &'static str {
        match self {
            EventKind::RequestSend => "RREQ_SEND",
            EventKind::ReplyReceive => "RREP_RECV",
            EventKind::DataSend => "DATA_SEND",
            EventKind::ReplyForward => "RREP_FORWARD",
            EventKind::OtherRequest => "OTHER_RREQ",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EventKind {
    type Err = Error;

    /// Parse a protocol name, ignoring ASCII case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::UnknownEventKind(s.to_string()))
    }
}

/// An occurrence concerning `source`.
///
/// Events are plain values: a broadcast hands every queue its own copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Event {
    /// The node the event is about.
    pub source: NodeId,
    pub kind: EventKind,
}

impl Event {
    pub const fn new(source: NodeId, kind: EventKind) -> Self {
        Self { source, kind }
    }

    /// Whether this event concerns `node` rather than being observational.
    pub fn is_from(&self, node: NodeId) -> bool {
        self.source == node
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from Node {}", self.kind, self.source)
    }
}
