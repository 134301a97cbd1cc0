//! Simulation driver: owns the nodes and feeds them events in lockstep.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, trace, warn};

use crate::config::DriverConfig;
use crate::error::{Error, Result};
use crate::event::{Event, NodeId};
use crate::node::{Delivery, Node, NodeObserver, NodeSnapshot, Observation};

/// Why a node missed a broadcast step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryFailure {
    /// The node's queue is closed: its worker is gone.
    QueueClosed,
    /// The node's worker went away holding the event.
    AckDropped,
    /// The node neither took nor acknowledged the event in time.
    AckTimeout(Duration),
}

/// A node that did not apply a broadcast step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeFailure {
    pub node: NodeId,
    pub failure: DeliveryFailure,
}

impl NodeFailure {
    /// The error this failure stands for on event `seq`.
    pub fn into_error(self, seq: u64) -> Error {
        match self.failure {
            DeliveryFailure::QueueClosed => Error::QueueClosed(self.node),
            DeliveryFailure::AckDropped => Error::AckDropped(self.node, seq),
            DeliveryFailure::AckTimeout(timeout) => Error::AckTimeout {
                node: self.node,
                seq,
                timeout,
            },
        }
    }
}

impl fmt::Display for NodeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.failure {
            DeliveryFailure::QueueClosed => write!(f, "Node {} is down: queue closed", self.node),
            DeliveryFailure::AckDropped => {
                write!(f, "Node {} is down: acknowledgment dropped", self.node)
            }
            DeliveryFailure::AckTimeout(timeout) => {
                write!(f, "Node {} did not acknowledge within {timeout:?}", self.node)
            }
        }
    }
}

/// What every node made of one broadcast event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepReport {
    pub seq: u64,
    pub event: Event,
    /// One observation per node that applied the event, ordered by node id.
    pub observations: Vec<Observation>,
    /// Nodes that missed the event, ordered by node id.
    pub failures: Vec<NodeFailure>,
}

impl StepReport {
    /// The observation made by `node`, if it applied this step.
    pub fn observation(&self, node: NodeId) -> Option<&Observation> {
        self.observations.iter().find(|obs| obs.node == node)
    }

    /// Whether every node applied the event.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Fail with the first node failure, if any.
    pub fn ensure_complete(&self) -> Result<()> {
        match self.failures.first() {
            Some(failure) => Err(failure.into_error(self.seq)),
            None => Ok(()),
        }
    }
}

struct NodeSlot {
    id: NodeId,
    queue: mpsc::Sender<Delivery>,
    observer: NodeObserver,
    worker: JoinHandle<Result<Node>>,
}

impl NodeSlot {
    fn spawn(id: NodeId, capacity: usize) -> Self {
        let mut node = Node::new(id);
        let (queue, rx) = mpsc::channel(capacity);
        node.attach_queue(rx);
        let observer = node.observer();
        let worker = tokio::spawn(node.run());
        Self {
            id,
            queue,
            observer,
            worker,
        }
    }
}

/// Drives a set of nodes, each running on its own task.
///
/// # Lifecycle
///
/// 1. [`start`](Self::start) spawns one worker per node with its own bounded queue.
/// 2. [`feed`](Self::feed) broadcasts an event to every queue, then waits until
///    every node has acknowledged it. Only then does it return, so the next
///    event never overtakes the previous one on any node.
/// 3. [`shutdown`](Self::shutdown) closes every queue and waits for the
///    workers to drain, returning the final nodes.
///
/// A node that dies only fails its own deliveries; the others keep going.
/// Drivers share nothing, so independent runs can coexist in one process.
pub struct Driver {
    config: DriverConfig,
    slots: Vec<NodeSlot>,
    next_seq: u64,
}

impl Driver {
    /// Spawn one node per id. Must be called from within a tokio runtime.
    pub fn start(ids: impl IntoIterator<Item = NodeId>, config: DriverConfig) -> Result<Self> {
        config.validate()?;

        let mut ids: Vec<NodeId> = ids.into_iter().collect();
        if ids.is_empty() {
            return Err(Error::NoNodes);
        }
        ids.sort_unstable();
        if let Some(pair) = ids.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(Error::DuplicateNode(pair[0]));
        }

        let slots: Vec<_> = ids
            .into_iter()
            .map(|id| NodeSlot::spawn(id, config.queue_capacity))
            .collect();

        debug!(
            nodes = slots.len(),
            queue_capacity = config.queue_capacity,
            ack_timeout = ?config.ack_timeout,
            "driver started"
        );

        Ok(Self {
            config,
            slots,
            next_seq: 0,
        })
    }

    /// Ids of the owned nodes, ascending.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.slots.iter().map(|slot| slot.id).collect()
    }

    /// Events broadcast or delivered so far.
    pub fn events_fed(&self) -> u64 {
        self.next_seq
    }

    fn slot(&self, id: NodeId) -> Result<&NodeSlot> {
        self.slots
            .iter()
            .find(|slot| slot.id == id)
            .ok_or(Error::UnknownNode(id))
    }

    /// Read handle on one node's published snapshots.
    pub fn observer(&self, id: NodeId) -> Result<NodeObserver> {
        Ok(self.slot(id)?.observer.clone())
    }

    /// Latest published snapshot of one node.
    pub fn snapshot(&self, id: NodeId) -> Result<NodeSnapshot> {
        Ok(self.slot(id)?.observer.snapshot())
    }

    /// Latest published snapshot of every node, ordered by id.
    pub fn snapshots(&self) -> Vec<NodeSnapshot> {
        self.slots.iter().map(|slot| slot.observer.snapshot()).collect()
    }

    /// Queue one event on `slot`. A full queue is waited on until `deadline`.
    async fn enqueue(
        &self,
        slot: &NodeSlot,
        seq: u64,
        event: Event,
        deadline: Instant,
    ) -> std::result::Result<oneshot::Receiver<Observation>, DeliveryFailure> {
        let (delivery, ack) = Delivery::with_ack(seq, event);
        match timeout_at(deadline, slot.queue.send(delivery)).await {
            Ok(Ok(())) => {
                trace!(node = %slot.id, seq, event = %event, "event enqueued");
                Ok(ack)
            }
            Ok(Err(_)) => {
                warn!(node = %slot.id, seq, "queue closed");
                Err(DeliveryFailure::QueueClosed)
            }
            Err(_) => {
                warn!(node = %slot.id, seq, "queue full until the deadline");
                Err(DeliveryFailure::AckTimeout(self.config.ack_timeout))
            }
        }
    }

    async fn await_ack(
        &self,
        node: NodeId,
        seq: u64,
        ack: oneshot::Receiver<Observation>,
        deadline: Instant,
    ) -> std::result::Result<Observation, DeliveryFailure> {
        match timeout_at(deadline, ack).await {
            Ok(Ok(observation)) => Ok(observation),
            Ok(Err(_)) => {
                warn!(node = %node, seq, "node dropped acknowledgment");
                Err(DeliveryFailure::AckDropped)
            }
            Err(_) => {
                warn!(node = %node, seq, "acknowledgment timed out");
                Err(DeliveryFailure::AckTimeout(self.config.ack_timeout))
            }
        }
    }

    /// Broadcast `event` to every node and wait until all have applied it.
    ///
    /// Nodes that are down or too slow are listed in
    /// [`StepReport::failures`]; the event still reaches every other node.
    /// Fails only when no node applied the event at all.
    pub async fn feed(&mut self, event: Event) -> Result<StepReport> {
        let seq = self.next_seq;
        self.next_seq += 1;
        let deadline = Instant::now() + self.config.ack_timeout;

        // Enqueue everywhere first so nodes work in parallel.
        let mut pending = Vec::with_capacity(self.slots.len());
        let mut failures = Vec::new();
        for slot in &self.slots {
            match self.enqueue(slot, seq, event, deadline).await {
                Ok(ack) => pending.push((slot.id, ack)),
                Err(failure) => failures.push(NodeFailure {
                    node: slot.id,
                    failure,
                }),
            }
        }

        let mut observations = Vec::with_capacity(pending.len());
        for (node, ack) in pending {
            match self.await_ack(node, seq, ack, deadline).await {
                Ok(observation) => observations.push(observation),
                Err(failure) => failures.push(NodeFailure { node, failure }),
            }
        }
        failures.sort_by_key(|failure| failure.node);

        if observations.is_empty() {
            if let Some(failure) = failures.first() {
                return Err(failure.into_error(seq));
            }
        }

        if failures.is_empty() {
            debug!(seq, event = %event, "event acknowledged by all nodes");
        } else {
            warn!(
                seq,
                event = %event,
                applied = observations.len(),
                missed = failures.len(),
                "event missed by some nodes"
            );
        }

        Ok(StepReport {
            seq,
            event,
            observations,
            failures,
        })
    }

    /// Deliver `event` to a single node and wait for its acknowledgment.
    pub async fn deliver(&mut self, target: NodeId, event: Event) -> Result<Observation> {
        let slot = self.slot(target)?;
        let seq = self.next_seq;
        let deadline = Instant::now() + self.config.ack_timeout;
        let fail = |failure| NodeFailure {
            node: target,
            failure,
        }
        .into_error(seq);

        let ack = self
            .enqueue(slot, seq, event, deadline)
            .await
            .map_err(fail)?;
        self.next_seq += 1;

        self.await_ack(target, seq, ack, deadline)
            .await
            .map_err(fail)
    }

    /// Feed a whole script, one acknowledged broadcast at a time.
    pub async fn run_script(&mut self, script: &[Event]) -> Result<Vec<StepReport>> {
        let mut reports = Vec::with_capacity(script.len());
        for event in script {
            reports.push(self.feed(*event).await?);
        }
        Ok(reports)
    }

    /// Close every queue and wait for all nodes to drain and stop.
    ///
    /// Every worker is joined even if some failed; the first failure is returned.
    pub async fn shutdown(self) -> Result<Vec<Node>> {
        let workers: Vec<_> = self
            .slots
            .into_iter()
            .map(|slot| (slot.id, slot.worker))
            .collect();

        let mut nodes = Vec::with_capacity(workers.len());
        let mut first_error = None;
        for (id, worker) in workers {
            let error = match worker.await {
                Ok(Ok(node)) => {
                    nodes.push(node);
                    continue;
                }
                Ok(Err(e)) => e,
                Err(_) => Error::WorkerPanicked(id),
            };
            warn!(node = %id, error = %error, "node worker failed");
            first_error = first_error.or(Some(error));
        }

        if let Some(error) = first_error {
            return Err(error);
        }
        debug!(nodes = nodes.len(), events = self.next_seq, "driver shut down");
        Ok(nodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use crate::node::{Action, NodeState, Outcome};
    use crate::supervisor::{RreqState, Supervisor};

    fn ev(source: u32, kind: EventKind) -> Event {
        Event::new(NodeId(source), kind)
    }

    fn two_nodes() -> Driver {
        Driver::start([NodeId(1), NodeId(2)], DriverConfig::default()).unwrap()
    }

    /// A slot whose worker holds its queue open but never reads it.
    fn stalled_slot(id: NodeId) -> NodeSlot {
        let (queue, rx) = mpsc::channel(1);
        let observer = Node::new(id).observer();
        let worker = tokio::spawn(async move {
            let _held = rx;
            std::future::pending::<Result<Node>>().await
        });
        NodeSlot {
            id,
            queue,
            observer,
            worker,
        }
    }

    /// A slot whose worker takes every delivery and drops its acknowledgment.
    fn forgetful_slot(id: NodeId) -> NodeSlot {
        let (queue, mut rx) = mpsc::channel::<Delivery>(4);
        let observer = Node::new(id).observer();
        let worker = tokio::spawn(async move {
            while let Some(delivery) = rx.recv().await {
                drop(delivery);
            }
            Ok(Node::new(id))
        });
        NodeSlot {
            id,
            queue,
            observer,
            worker,
        }
    }

    fn driver_with(config: DriverConfig, slots: Vec<NodeSlot>) -> Driver {
        Driver {
            config,
            slots,
            next_seq: 0,
        }
    }

    #[tokio::test]
    async fn start_rejects_bad_node_sets() {
        assert!(matches!(
            Driver::start(Vec::<NodeId>::new(), DriverConfig::default()),
            Err(Error::NoNodes)
        ));
        assert!(matches!(
            Driver::start([NodeId(2), NodeId(1), NodeId(2)], DriverConfig::default()),
            Err(Error::DuplicateNode(NodeId(2)))
        ));
        assert!(matches!(
            Driver::start([NodeId(1)], DriverConfig::default().with_queue_capacity(0)),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn node_ids_are_sorted() {
        let driver = Driver::start([NodeId(3), NodeId(1)], DriverConfig::default()).unwrap();
        assert_eq!(driver.node_ids(), vec![NodeId(1), NodeId(3)]);
        driver.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn feed_waits_for_every_node() {
        let mut driver = two_nodes();

        let report = driver.feed(ev(1, EventKind::RequestSend)).await.unwrap();
        assert_eq!(report.seq, 0);
        assert_eq!(report.observations.len(), 2);
        assert!(report.is_complete());
        assert!(report.ensure_complete().is_ok());

        let own = report.observation(NodeId(1)).unwrap();
        assert_eq!(own.outcome, Outcome::Granted(Action::SendRequest));
        let other = report.observation(NodeId(2)).unwrap();
        assert_eq!(other.outcome, Outcome::Observed);

        // Acknowledged means applied: snapshots are already up to date.
        assert_eq!(driver.snapshot(NodeId(1)).unwrap().state, NodeState::Waiting);
        assert!(!driver.snapshot(NodeId(1)).unwrap().can_send());
        assert!(!driver.snapshot(NodeId(2)).unwrap().can_send());

        driver.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn deliver_targets_one_node() {
        let mut driver = two_nodes();

        let obs = driver.deliver(NodeId(2), ev(2, EventKind::RequestSend)).await.unwrap();
        assert_eq!(obs.node, NodeId(2));
        assert_eq!(driver.snapshot(NodeId(1)).unwrap().processed, 0);
        assert_eq!(driver.snapshot(NodeId(2)).unwrap().processed, 1);

        let err = driver.deliver(NodeId(9), ev(9, EventKind::DataSend)).await.unwrap_err();
        assert!(matches!(err, Error::UnknownNode(NodeId(9))));
        assert!(matches!(driver.snapshot(NodeId(9)), Err(Error::UnknownNode(_))));

        driver.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn run_script_sequences_reports() {
        let mut driver = two_nodes();
        let script = [
            ev(1, EventKind::RequestSend),
            ev(2, EventKind::RequestSend),
        ];

        let reports = driver.run_script(&script).await.unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[1].seq, 1);
        assert_eq!(driver.events_fed(), 2);

        let nodes = driver.shutdown().await.unwrap();
        for node in &nodes {
            assert_eq!(node.rreq().state(), RreqState::Locked);
        }
    }

    #[tokio::test]
    async fn shutdown_returns_drained_nodes() {
        let mut driver = two_nodes();
        driver.feed(ev(2, EventKind::ReplyForward)).await.unwrap();
        driver.feed(ev(1, EventKind::ReplyReceive)).await.unwrap();

        let nodes = driver.shutdown().await.unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].id(), NodeId(1));
        assert_eq!(nodes[0].state(), NodeState::Forwarding);
        assert_eq!(nodes[1].state(), NodeState::Idle);
        assert!(nodes.iter().all(|n| n.snapshot().processed == 2));
    }

    #[tokio::test]
    async fn independent_drivers_do_not_interfere() {
        let mut a = two_nodes();
        let b = two_nodes();

        a.feed(ev(1, EventKind::RequestSend)).await.unwrap();
        assert!(!a.snapshot(NodeId(1)).unwrap().can_send());
        assert!(b.snapshot(NodeId(1)).unwrap().can_send());

        a.shutdown().await.unwrap();
        b.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn single_slot_queues_still_make_progress() {
        let mut driver = Driver::start(
            [NodeId(1), NodeId(2), NodeId(3)],
            DriverConfig::default().with_queue_capacity(1),
        )
        .unwrap();

        for _ in 0..10 {
            driver.feed(ev(1, EventKind::OtherRequest)).await.unwrap();
        }
        assert!(driver.snapshots().iter().all(|s| s.processed == 10));

        driver.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn dead_node_does_not_starve_the_others() {
        let mut driver = two_nodes();
        driver.slots[0].worker.abort();

        let report = driver.feed(ev(2, EventKind::RequestSend)).await.unwrap();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].node, NodeId(1));
        assert!(matches!(
            report.failures[0].failure,
            DeliveryFailure::QueueClosed | DeliveryFailure::AckDropped
        ));
        let live = report.observation(NodeId(2)).unwrap();
        assert_eq!(live.outcome, Outcome::Granted(Action::SendRequest));
        assert!(report.observation(NodeId(1)).is_none());
        assert!(!report.is_complete());

        // The dead worker is gone for good; the live one stays in step.
        let report = driver.feed(ev(1, EventKind::OtherRequest)).await.unwrap();
        assert_eq!(
            report.failures,
            vec![NodeFailure {
                node: NodeId(1),
                failure: DeliveryFailure::QueueClosed,
            }]
        );
        assert!(matches!(
            report.ensure_complete(),
            Err(Error::QueueClosed(NodeId(1)))
        ));
        assert_eq!(driver.snapshot(NodeId(2)).unwrap().processed, 2);
        assert_eq!(driver.events_fed(), 2);

        assert!(matches!(
            driver.shutdown().await,
            Err(Error::WorkerPanicked(NodeId(1)))
        ));
    }

    #[tokio::test]
    async fn feed_fails_when_no_node_applies_the_event() {
        let mut driver = Driver::start([NodeId(1)], DriverConfig::default()).unwrap();
        driver.slots[0].worker.abort();

        let err = driver.feed(ev(1, EventKind::DataSend)).await.unwrap_err();
        assert!(matches!(
            err,
            Error::QueueClosed(NodeId(1)) | Error::AckDropped(NodeId(1), 0)
        ));
        assert!(driver.shutdown().await.is_err());
    }

    #[tokio::test]
    async fn slow_node_times_out_alone() {
        let timeout = Duration::from_millis(50);
        let config = DriverConfig::default()
            .with_queue_capacity(1)
            .with_ack_timeout(timeout);
        let mut driver = driver_with(
            config.clone(),
            vec![
                NodeSlot::spawn(NodeId(1), config.queue_capacity),
                stalled_slot(NodeId(2)),
            ],
        );

        // First event sits in the stalled queue unacknowledged.
        let report = driver.feed(ev(1, EventKind::RequestSend)).await.unwrap();
        assert_eq!(
            report.failures,
            vec![NodeFailure {
                node: NodeId(2),
                failure: DeliveryFailure::AckTimeout(timeout),
            }]
        );
        assert!(matches!(
            report.ensure_complete(),
            Err(Error::AckTimeout { node: NodeId(2), seq: 0, .. })
        ));

        // Second event cannot even be queued there.
        let report = driver.feed(ev(1, EventKind::DataSend)).await.unwrap();
        assert_eq!(report.failures[0].node, NodeId(2));
        assert_eq!(report.observations.len(), 1);
        assert_eq!(driver.snapshot(NodeId(1)).unwrap().state, NodeState::Idle);
        assert_eq!(driver.snapshot(NodeId(1)).unwrap().processed, 2);

        driver.slots[1].worker.abort();
        assert!(matches!(
            driver.shutdown().await,
            Err(Error::WorkerPanicked(NodeId(2)))
        ));
    }

    #[tokio::test]
    async fn dropped_ack_is_reported() {
        let config = DriverConfig::default();
        let mut driver = driver_with(
            config.clone(),
            vec![
                NodeSlot::spawn(NodeId(1), config.queue_capacity),
                forgetful_slot(NodeId(2)),
            ],
        );

        let report = driver.feed(ev(2, EventKind::ReplyForward)).await.unwrap();
        assert_eq!(
            report.failures,
            vec![NodeFailure {
                node: NodeId(2),
                failure: DeliveryFailure::AckDropped,
            }]
        );
        assert_eq!(
            report.failures[0].to_string(),
            "Node 2 is down: acknowledgment dropped"
        );

        let err = driver
            .deliver(NodeId(2), ev(2, EventKind::DataSend))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AckDropped(NodeId(2), 1)));

        // Both workers end cleanly once their queues close.
        assert_eq!(driver.shutdown().await.unwrap().len(), 2);
    }
}
