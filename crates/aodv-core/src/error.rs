//! Error types for aodv-core.

use std::time::Duration;

use thiserror::Error;

use crate::event::NodeId;

/// Result type for aodv-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while driving nodes.
///
/// Nothing here is raised by the node engine itself once an event has been
/// accepted into a queue: supervisors and `Node::process_event` are total.
#[derive(Debug, Error)]
pub enum Error {
    /// `Node::run` was called before `Node::attach_queue`.
    #[error("node {0} has no attached queue")]
    QueueNotAttached(NodeId),

    /// The node's queue was closed while the driver was sending.
    #[error("queue of node {0} is closed")]
    QueueClosed(NodeId),

    /// The node processed the event but dropped its acknowledgment.
    #[error("node {0} dropped the acknowledgment for event #{1}")]
    AckDropped(NodeId, u64),

    /// The node did not acknowledge an event in time.
    #[error("node {node} did not acknowledge event #{seq} within {timeout:?}")]
    AckTimeout {
        node: NodeId,
        seq: u64,
        timeout: Duration,
    },

    /// No node with this identifier is owned by the driver.
    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    /// The same identifier was given to two nodes.
    #[error("duplicate node {0}")]
    DuplicateNode(NodeId),

    /// A driver needs at least one node.
    #[error("a simulation needs at least one node")]
    NoNodes,

    /// A node worker task panicked or was cancelled.
    #[error("worker of node {0} terminated abnormally")]
    WorkerPanicked(NodeId),

    /// Configuration value out of range or unparseable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// An event kind name that is not part of the protocol.
    #[error("unknown event kind: {0}")]
    UnknownEventKind(String),

    /// A node identifier that could not be parsed.
    #[error("invalid node id: {0}")]
    InvalidNodeId(String),

    /// Reading an event script failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An event script is not valid JSON or contains invalid events.
    #[error("script error: {0}")]
    Script(#[from] serde_json::Error),
}
